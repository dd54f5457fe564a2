//! Control surface message contract
//!
//! Intents flow from a control surface to the engine, snapshots flow back.
//! Both are JSON objects. Intents carry a `command` discriminator:
//!
//! ```json
//! {"command": "filter_changed", "primary_filter": "USB"}
//! {"command": "set_boost", "enabled": true}
//! ```

use crate::domain::audio::Device;
use crate::domain::selector::FilterSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shown for an input or fallback slot that resolved to nothing
pub const NO_DEVICE: &str = "None";

/// Picker entry meaning "no primary device"; never applied as a filter
pub const PRIMARY_NOT_CONNECTED: &str = "Device not connected";

/// Frames larger than this are refused by the transport
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Errors raised while encoding or decoding control messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message of {0} bytes exceeds the {MAX_MESSAGE_LEN} byte limit")]
    TooLarge(usize),

    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Intent sent by a control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlIntent {
    /// All three pickers at once; `primary` equal to
    /// [`PRIMARY_NOT_CONNECTED`] leaves the primary filter untouched
    UiChange {
        input: String,
        primary: String,
        fallback: String,
    },
    FilterChanged {
        primary_filter: String,
    },
    SetBoost {
        enabled: bool,
    },
    GetDeviceInfo,
    Shutdown,
}

impl ControlIntent {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Whether handling this intent re-resolves the route
    pub fn triggers_reevaluation(&self) -> bool {
        matches!(
            self,
            ControlIntent::UiChange { .. } | ControlIntent::FilterChanged { .. }
        )
    }
}

/// Read-only view of the routing state for a control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub inputs: Vec<String>,
    pub input: String,
    pub outputs: Vec<String>,
    pub fallback: String,
    /// Empty when no primary device is connected
    pub primary: String,
    pub primary_filter: String,
    #[serde(default)]
    pub boost: bool,
}

impl StatusSnapshot {
    pub fn new(
        inputs: &[Device],
        outputs: &[Device],
        input: Option<&Device>,
        primary: Option<&Device>,
        fallback: Option<&Device>,
        filters: &FilterSet,
        boost: bool,
    ) -> Self {
        let describe = |d: Option<&Device>| {
            d.map(|d| d.description.clone())
                .unwrap_or_else(|| NO_DEVICE.to_string())
        };

        Self {
            inputs: inputs.iter().map(|d| d.description.clone()).collect(),
            input: describe(input),
            outputs: outputs.iter().map(|d| d.description.clone()).collect(),
            fallback: describe(fallback),
            primary: primary.map(|d| d.description.clone()).unwrap_or_default(),
            primary_filter: filters.primary_filter.clone(),
            boost,
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn primary_connected(&self) -> bool {
        !self.primary.is_empty()
    }
}
