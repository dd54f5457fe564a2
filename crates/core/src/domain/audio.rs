//! Audio device abstractions and domain models
//!
//! This module defines the platform-agnostic view of the host audio
//! subsystem: devices, their identity, and the catalog that lists them.
//! The cpal implementation lives in the `infra` crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),

    /// Device does not support the fixed routing format
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Opaque, value-comparable device handle
///
/// IDs are handed out by the catalog. A device that disappears and comes
/// back is given a new ID, even if its description is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(u64);

impl DeviceId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side of the route a device (or stream) sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// An audio endpoint as reported by the catalog
///
/// Equality is handle identity: two devices with the same description are
/// still different devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub description: String,
    pub direction: Direction,
}

impl Device {
    pub fn new(id: DeviceId, description: impl Into<String>, direction: Direction) -> Self {
        Self {
            id,
            description: description.into(),
            direction,
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Device {}

/// Handle comparison over optional selections
pub fn same_device(a: Option<&Device>, b: Option<&Device>) -> bool {
    a.map(|d| d.id) == b.map(|d| d.id)
}

/// The one stream format everything is routed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
}

impl AudioFormat {
    /// 48 kHz, stereo, signed 16-bit interleaved
    pub const FIXED: AudioFormat = AudioFormat {
        sample_rate: 48000,
        channels: 2,
        bytes_per_sample: 2,
    };

    pub const fn frame_bytes(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    /// Number of interleaved samples in `frames` frames
    pub const fn samples_for_frames(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

/// Trait for enumerating available audio devices
///
/// Enumeration order is preserved: selection takes the first match in the
/// order returned here.
///
/// The listing calls are made from the routing event loop and must not wait
/// on the host. A catalog that has to ask the host does so in
/// [`refresh`](DeviceCatalog::refresh), which callers run off the loop.
pub trait DeviceCatalog: Send + Sync {
    /// Get all capture devices
    fn list_inputs(&self) -> Result<Vec<Device>>;

    /// Get all playback devices
    fn list_outputs(&self) -> Result<Vec<Device>>;

    /// Re-read the host device lists; may block
    ///
    /// On error the previous listing stays in place.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: DeviceCatalog + ?Sized> DeviceCatalog for Arc<T> {
    fn list_inputs(&self) -> Result<Vec<Device>> {
        (**self).list_inputs()
    }

    fn list_outputs(&self) -> Result<Vec<Device>> {
        (**self).list_outputs()
    }

    fn refresh(&self) -> Result<()> {
        (**self).refresh()
    }
}
