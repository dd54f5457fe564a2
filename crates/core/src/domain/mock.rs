//! In-memory catalog and stream backend for testing without hardware
//!
//! Both types are cheap handles over shared state: clone one, hand the clone
//! to the engine, and keep the other to script device changes and inspect
//! what the engine did.
//!
//! ```
//! use autoaudio_core::domain::mock::MockCatalog;
//! use autoaudio_core::domain::audio::DeviceCatalog;
//!
//! let catalog = MockCatalog::new();
//! catalog.add_output("Speakers (Realtek)");
//! let headset = catalog.add_output("USB Headset");
//!
//! assert_eq!(catalog.list_outputs().unwrap().len(), 2);
//! catalog.remove(headset.id);
//! assert_eq!(catalog.list_outputs().unwrap().len(), 1);
//! ```

use crate::domain::audio::{
    AudioError, Device, DeviceCatalog, DeviceId, Direction, Result,
};
use crate::domain::events::EventSender;
use crate::domain::stream::{CaptureStream, PlaybackStream, StreamBackend, StreamTag};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Default)]
struct CatalogState {
    inputs: Vec<Device>,
    outputs: Vec<Device>,
    next_id: u64,
    failing: bool,
    refreshes: usize,
}

/// Scriptable device catalog
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, description: &str, direction: Direction) -> Device {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let device = Device::new(DeviceId::new(state.next_id), description, direction);
        match direction {
            Direction::Input => state.inputs.push(device.clone()),
            Direction::Output => state.outputs.push(device.clone()),
        }
        device
    }

    /// Plug in a capture device; it gets a fresh handle
    pub fn add_input(&self, description: &str) -> Device {
        self.add(description, Direction::Input)
    }

    /// Plug in a playback device; it gets a fresh handle
    pub fn add_output(&self, description: &str) -> Device {
        self.add(description, Direction::Output)
    }

    /// Unplug a device
    pub fn remove(&self, id: DeviceId) {
        let mut state = lock(&self.state);
        state.inputs.retain(|d| d.id != id);
        state.outputs.retain(|d| d.id != id);
    }

    /// Make enumeration fail until reset
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// How many times the host would have been re-enumerated
    pub fn refresh_count(&self) -> usize {
        lock(&self.state).refreshes
    }
}

impl DeviceCatalog for MockCatalog {
    fn list_inputs(&self) -> Result<Vec<Device>> {
        let state = lock(&self.state);
        if state.failing {
            return Err(AudioError::OsError("mock enumeration failure".to_string()));
        }
        Ok(state.inputs.clone())
    }

    fn list_outputs(&self) -> Result<Vec<Device>> {
        let state = lock(&self.state);
        if state.failing {
            return Err(AudioError::OsError("mock enumeration failure".to_string()));
        }
        Ok(state.outputs.clone())
    }

    fn refresh(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.refreshes += 1;
        if state.failing {
            return Err(AudioError::OsError("mock enumeration failure".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// STREAMS
// ============================================================================

/// Record of one stream the backend opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedStream {
    pub device: DeviceId,
    pub tag: StreamTag,
}

#[derive(Debug, Default)]
struct BackendState {
    failing: HashSet<DeviceId>,
    opened: Vec<OpenedStream>,
    live_inputs: usize,
    live_outputs: usize,
    max_live_outputs: usize,
    close_order: Vec<Direction>,
    input_feed: VecDeque<i16>,
    played: Vec<i16>,
    queued_blocks: usize,
    output_capacity: Option<usize>,
    events: Option<EventSender>,
}

/// Stream backend that records every open/close and plays into a buffer
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening a stream on `id` fails from now on
    pub fn fail_device(&self, id: DeviceId) {
        lock(&self.state).failing.insert(id);
    }

    pub fn heal_device(&self, id: DeviceId) {
        lock(&self.state).failing.remove(&id);
    }

    /// Limit the playback queue to `blocks` unconsumed blocks
    pub fn set_output_capacity(&self, blocks: usize) {
        lock(&self.state).output_capacity = Some(blocks);
    }

    /// Pretend the device played everything queued so far
    pub fn consume_output(&self) {
        lock(&self.state).queued_blocks = 0;
    }

    /// Samples the next capture read will return
    pub fn feed_input(&self, samples: &[i16]) {
        lock(&self.state).input_feed.extend(samples.iter().copied());
    }

    /// Everything written to any playback stream, in order
    pub fn played(&self) -> Vec<i16> {
        lock(&self.state).played.clone()
    }

    /// Drain the played buffer and empty the playback queue
    pub fn take_played(&self) -> Vec<i16> {
        let mut state = lock(&self.state);
        state.queued_blocks = 0;
        std::mem::take(&mut state.played)
    }

    pub fn opened(&self) -> Vec<OpenedStream> {
        lock(&self.state).opened.clone()
    }

    /// Device of the most recently opened stream in `direction`
    pub fn last_opened(&self, direction: Direction) -> Option<OpenedStream> {
        lock(&self.state)
            .opened
            .iter()
            .rev()
            .find(|o| o.tag.direction == direction)
            .cloned()
    }

    pub fn open_count(&self, direction: Direction) -> usize {
        lock(&self.state)
            .opened
            .iter()
            .filter(|o| o.tag.direction == direction)
            .count()
    }

    pub fn live_inputs(&self) -> usize {
        lock(&self.state).live_inputs
    }

    pub fn live_outputs(&self) -> usize {
        lock(&self.state).live_outputs
    }

    /// Highest number of simultaneously open playback streams seen
    pub fn max_live_outputs(&self) -> usize {
        lock(&self.state).max_live_outputs
    }

    pub fn close_order(&self) -> Vec<Direction> {
        lock(&self.state).close_order.clone()
    }

    /// Report a fault for the most recently opened stream in `direction`
    pub fn fault_latest(&self, direction: Direction, reason: &str) -> bool {
        let (events, opened) = {
            let state = lock(&self.state);
            (state.events.clone(), state.opened.clone())
        };
        let tag = opened
            .iter()
            .rev()
            .find(|o| o.tag.direction == direction)
            .map(|o| o.tag);
        match (events, tag) {
            (Some(events), Some(tag)) => events.stream_fault(tag, reason),
            _ => false,
        }
    }

    /// Signal readiness for the most recently opened capture stream
    pub fn signal_input_ready(&self) -> bool {
        let (events, tag) = {
            let state = lock(&self.state);
            let tag = state
                .opened
                .iter()
                .rev()
                .find(|o| o.tag.direction == Direction::Input)
                .map(|o| o.tag);
            (state.events.clone(), tag)
        };
        match (events, tag) {
            (Some(events), Some(tag)) => events.input_ready(tag),
            _ => false,
        }
    }

    fn open(&self, device: &Device, tag: StreamTag, events: EventSender) -> Result<()> {
        let mut state = lock(&self.state);
        state.events = Some(events);
        if state.failing.contains(&device.id) {
            return Err(AudioError::DeviceNotFound(device.description.clone()));
        }
        state.opened.push(OpenedStream {
            device: device.id,
            tag,
        });
        match tag.direction {
            Direction::Input => state.live_inputs += 1,
            Direction::Output => {
                state.live_outputs += 1;
                state.max_live_outputs = state.max_live_outputs.max(state.live_outputs);
            }
        }
        Ok(())
    }
}

/// Capture stream reading from the backend's input feed
#[derive(Debug)]
pub struct MockCapture {
    state: Arc<Mutex<BackendState>>,
}

impl CaptureStream for MockCapture {
    fn drain_into(&mut self, out: &mut Vec<i16>) {
        out.extend(lock(&self.state).input_feed.drain(..));
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.live_inputs -= 1;
        state.close_order.push(Direction::Input);
    }
}

/// Playback stream appending to the backend's played buffer
#[derive(Debug)]
pub struct MockPlayback {
    state: Arc<Mutex<BackendState>>,
}

impl PlaybackStream for MockPlayback {
    fn try_write(&mut self, block: &[i16]) -> bool {
        let mut state = lock(&self.state);
        if let Some(capacity) = state.output_capacity {
            if state.queued_blocks >= capacity {
                return false;
            }
        }
        state.queued_blocks += 1;
        state.played.extend_from_slice(block);
        true
    }
}

impl Drop for MockPlayback {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.live_outputs -= 1;
        state.close_order.push(Direction::Output);
    }
}

impl StreamBackend for MockBackend {
    type Capture = MockCapture;
    type Playback = MockPlayback;

    fn open_capture(
        &mut self,
        device: &Device,
        tag: StreamTag,
        events: EventSender,
    ) -> Result<MockCapture> {
        self.open(device, tag, events)?;
        Ok(MockCapture {
            state: Arc::clone(&self.state),
        })
    }

    fn open_playback(
        &mut self,
        device: &Device,
        tag: StreamTag,
        events: EventSender,
    ) -> Result<MockPlayback> {
        self.open(device, tag, events)?;
        Ok(MockPlayback {
            state: Arc::clone(&self.state),
        })
    }
}
