//! Device handle registry
//!
//! Every enumerated device arrives with a host key: the host audio API's own
//! device ID, or its label when the host cannot give one. The registry turns
//! host keys into [`DeviceId`]s and remembers the host handle behind each:
//!
//! - a key present in consecutive listings keeps its ID
//! - a key that disappears is forgotten, so a device that comes back later
//!   gets a fresh ID and is treated as a different device
//!
//! The last listing per direction is kept, so the catalog can answer from
//! memory while enumeration itself runs elsewhere.

use autoaudio_core::domain::audio::{Device, DeviceId, Direction};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// One device as the host listed it
#[derive(Debug, Clone)]
pub struct HostDevice<H> {
    pub key: String,
    pub description: String,
    pub handle: H,
}

struct Entry<H> {
    key: String,
    device: Device,
    handle: H,
}

pub struct DeviceRegistry<H> {
    inputs: Vec<Entry<H>>,
    outputs: Vec<Entry<H>>,
    next_id: u64,
}

// Host handles (`cpal::Device`) are not `Debug`; show the listing only.
impl<H> fmt::Debug for DeviceRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("inputs", &self.devices(Direction::Input))
            .field("outputs", &self.devices(Direction::Output))
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<H> Default for DeviceRegistry<H> {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            next_id: 0,
        }
    }
}

impl<H> DeviceRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing for `direction`, in host order
    ///
    /// A key repeated within one listing gets an occurrence suffix, so each
    /// entry still maps to exactly one ID.
    pub fn refresh(&mut self, direction: Direction, listing: Vec<HostDevice<H>>) -> Vec<Device> {
        let mut previous: HashMap<String, DeviceId> = self
            .table(direction)
            .iter()
            .map(|e| (e.key.clone(), e.device.id))
            .collect();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut current = Vec::with_capacity(listing.len());

        for host in listing {
            let occurrence = seen.entry(host.key.clone()).or_insert(0);
            let key = match *occurrence {
                0 => host.key,
                n => format!("{}#{n}", host.key),
            };
            *occurrence += 1;

            let id = match previous.remove(&key) {
                Some(id) => id,
                None => {
                    self.next_id += 1;
                    let id = DeviceId::new(self.next_id);
                    debug!(%direction, device = %host.description, %id, key, "New device registered");
                    id
                }
            };
            current.push(Entry {
                key,
                device: Device::new(id, host.description, direction),
                handle: host.handle,
            });
        }

        let devices = current.iter().map(|e| e.device.clone()).collect();
        *self.table_mut(direction) = current;
        devices
    }

    /// Devices from the last listing, in host order
    pub fn devices(&self, direction: Direction) -> Vec<Device> {
        self.table(direction).iter().map(|e| e.device.clone()).collect()
    }

    /// Host handle of a device in the last listing
    pub fn handle(&self, id: DeviceId) -> Option<&H> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .find(|e| e.device.id == id)
            .map(|e| &e.handle)
    }

    fn table(&self, direction: Direction) -> &[Entry<H>] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    fn table_mut(&mut self, direction: Direction) -> &mut Vec<Entry<H>> {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Listing where the handle is the host key itself
    fn listing(devices: &[(&str, &str)]) -> Vec<HostDevice<String>> {
        devices
            .iter()
            .map(|(key, description)| HostDevice {
                key: key.to_string(),
                description: description.to_string(),
                handle: key.to_string(),
            })
            .collect()
    }

    fn ids(devices: &[Device]) -> Vec<DeviceId> {
        devices.iter().map(|d| d.id).collect()
    }

    #[test]
    fn test_ids_stable_across_listings() {
        let mut registry = DeviceRegistry::new();
        let first = registry.refresh(
            Direction::Output,
            listing(&[("wasapi:1", "Speakers"), ("wasapi:2", "USB Headset")]),
        );
        let second = registry.refresh(
            Direction::Output,
            listing(&[("wasapi:2", "USB Headset"), ("wasapi:1", "Speakers")]),
        );

        assert_eq!(first[0].id, second[1].id);
        assert_eq!(first[1].id, second[0].id);
        assert_eq!(second[0].description, "USB Headset");
    }

    #[test]
    fn test_survivor_of_same_named_pair_keeps_its_id() {
        let mut registry = DeviceRegistry::new();
        let both = registry.refresh(
            Direction::Output,
            listing(&[("alsa:hdmi-a", "HDMI"), ("alsa:hdmi-b", "HDMI")]),
        );
        assert_ne!(both[0].id, both[1].id);

        // The first one is unplugged; the second must not take its handle.
        let left = registry.refresh(Direction::Output, listing(&[("alsa:hdmi-b", "HDMI")]));

        assert_eq!(ids(&left), vec![both[1].id]);
        assert!(registry.handle(both[0].id).is_none());
        assert_eq!(registry.handle(both[1].id).map(String::as_str), Some("alsa:hdmi-b"));
    }

    #[test]
    fn test_repeated_key_gets_distinct_ids() {
        let mut registry = DeviceRegistry::new();
        let devices = registry.refresh(
            Direction::Output,
            listing(&[("label:HDMI", "HDMI"), ("label:HDMI", "HDMI")]),
        );

        assert_ne!(devices[0].id, devices[1].id);
        let again = registry.refresh(
            Direction::Output,
            listing(&[("label:HDMI", "HDMI"), ("label:HDMI", "HDMI")]),
        );
        assert_eq!(ids(&devices), ids(&again));
    }

    #[test]
    fn test_returning_device_gets_fresh_id() {
        let mut registry = DeviceRegistry::new();
        let plugged = [("coreaudio:42", "Speakers"), ("coreaudio:77", "USB Headset")];
        let before = registry.refresh(Direction::Output, listing(&plugged));
        registry.refresh(Direction::Output, listing(&plugged[..1]));
        let after = registry.refresh(Direction::Output, listing(&plugged));

        assert_eq!(before[0].id, after[0].id);
        assert_ne!(before[1].id, after[1].id);
        assert!(registry.handle(before[1].id).is_none());
    }

    #[test]
    fn test_directions_are_independent() {
        let mut registry = DeviceRegistry::new();
        let input = registry.refresh(Direction::Input, listing(&[("hw:0,0", "Realtek")]));
        let output = registry.refresh(Direction::Output, listing(&[("hw:0,0", "Realtek")]));

        assert_ne!(input[0].id, output[0].id);
        assert_eq!(input[0].direction, Direction::Input);
        assert_eq!(registry.devices(Direction::Output), output);
        assert_eq!(registry.devices(Direction::Input), input);
    }

    #[test]
    fn test_empty_before_first_listing() {
        let registry: DeviceRegistry<String> = DeviceRegistry::new();
        assert!(registry.devices(Direction::Output).is_empty());
        assert!(registry.handle(DeviceId::new(1)).is_none());
    }
}
