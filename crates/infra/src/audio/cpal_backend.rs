//! CPAL-based device catalog
//!
//! Enumerates capture and playback endpoints of the default host. Host
//! enumeration only happens in [`DeviceCatalog::refresh`], which the watcher
//! runs on a blocking worker; listings are then served from the registry.
//! A fresh host handle is taken for every enumeration so the catalog stays
//! `Send + Sync`.

use crate::audio::registry::{DeviceRegistry, HostDevice};
use crate::audio::stream::CpalBackend;
use autoaudio_core::domain::audio::{
    AudioError, Device, DeviceCatalog, DeviceId, Direction, Result,
};
use cpal::traits::{DeviceTrait, HostTrait};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, trace};

pub(crate) type SharedRegistry = Arc<Mutex<DeviceRegistry<cpal::Device>>>;

pub(crate) fn lock_registry(
    registry: &SharedRegistry,
) -> MutexGuard<'_, DeviceRegistry<cpal::Device>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Display name, also what the filters match against
fn device_label(device: &cpal::Device) -> String {
    match device.description() {
        // WASAPI keeps the endpoint's friendly name, e.g.
        // "Speakers (Realtek High Definition Audio)", in the extended lines.
        Ok(desc) => desc
            .extended()
            .first()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| desc.name().trim())
            .to_string(),
        Err(_) => "Unknown Device".to_string(),
    }
}

/// The host's own device ID, or the label when the host has none
fn host_key(device: &cpal::Device, label: &str) -> String {
    match device.id() {
        Ok(id) => id.to_string(),
        Err(e) => {
            trace!(device = label, error = %e, "No host device ID, keying by label");
            format!("label:{label}")
        }
    }
}

/// Host devices for one direction, in host order
fn host_devices(direction: Direction) -> Result<Vec<HostDevice<cpal::Device>>> {
    let host = cpal::default_host();
    trace!(host = ?host.id(), %direction, "Listing host devices");

    let devices: Vec<cpal::Device> = match direction {
        Direction::Input => host
            .input_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?
            .collect(),
        Direction::Output => host
            .output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?
            .collect(),
    };

    Ok(devices
        .into_iter()
        .map(|handle| {
            let description = device_label(&handle);
            HostDevice {
                key: host_key(&handle, &description),
                description,
                handle,
            }
        })
        .collect())
}

/// Host handle of a device from the last listing
pub(crate) fn find_host_device(registry: &SharedRegistry, id: DeviceId) -> Result<cpal::Device> {
    lock_registry(registry)
        .handle(id)
        .cloned()
        .ok_or_else(|| AudioError::DeviceNotFound(format!("unknown device {id}")))
}

/// Device catalog over the default cpal host
///
/// Empty until the first [`refresh`](DeviceCatalog::refresh).
#[derive(Debug, Clone, Default)]
pub struct CpalCatalog {
    registry: SharedRegistry,
}

impl CpalCatalog {
    pub fn new() -> Self {
        info!(host = ?cpal::default_host().id(), "Initializing CPAL catalog");
        Self::default()
    }

    /// A stream backend resolving device IDs through this catalog
    pub fn backend(&self, output_queue_blocks: usize) -> CpalBackend {
        CpalBackend::new(Arc::clone(&self.registry), output_queue_blocks)
    }
}

impl DeviceCatalog for CpalCatalog {
    fn list_inputs(&self) -> Result<Vec<Device>> {
        Ok(lock_registry(&self.registry).devices(Direction::Input))
    }

    fn list_outputs(&self) -> Result<Vec<Device>> {
        Ok(lock_registry(&self.registry).devices(Direction::Output))
    }

    fn refresh(&self) -> Result<()> {
        // Both lists are read before either is applied, so a failure leaves
        // the previous listing whole.
        let inputs = host_devices(Direction::Input)?;
        let outputs = host_devices(Direction::Output)?;

        let mut registry = lock_registry(&self.registry);
        let inputs = registry.refresh(Direction::Input, inputs);
        let outputs = registry.refresh(Direction::Output, outputs);
        debug!(inputs = inputs.len(), outputs = outputs.len(), "Enumerated devices");
        Ok(())
    }
}
