//! Shared fixtures for the cross-crate scenarios
//!
//! [`Rig`] wires a [`RoutingEngine`] to the in-memory catalog and backend and
//! lets a test play the role of the host: plug devices, feed audio, fire
//! faults, then drain the event bus into the engine.

use autoaudio_core::domain::audio::DeviceCatalog;
use autoaudio_core::domain::events::{event_channel, EngineEvent, EventReceiver, EventSender};
use autoaudio_core::domain::mock::{MockBackend, MockCatalog};
use autoaudio_core::domain::protocol::{ControlIntent, StatusSnapshot};
use autoaudio_core::domain::routing::{EngineOptions, RoutingEngine};
use autoaudio_core::domain::selector::FilterSet;
use tokio::sync::broadcast;

pub const CABLE: &str = "CABLE Output (VB-Audio Virtual Audio Cable)";
pub const MICROPHONE: &str = "Microphone (Realtek High Definition Audio)";
pub const SPEAKERS: &str = "Speakers (Realtek High Definition Audio)";
pub const HEADPHONES: &str = "Headphones (Logitech G Pro)";
pub const USB_HEADSET: &str = "USB Headset";

/// Desk with a virtual cable, a microphone, speakers and wired headphones
pub fn desk_catalog() -> MockCatalog {
    let catalog = MockCatalog::new();
    catalog.add_input(MICROPHONE);
    catalog.add_input(CABLE);
    catalog.add_output(SPEAKERS);
    catalog.add_output(HEADPHONES);
    catalog
}

/// Unplug every device whose description is exactly `description`
///
/// Returns how many devices went away.
pub fn unplug(catalog: &MockCatalog, description: &str) -> usize {
    let inputs = catalog.list_inputs().unwrap_or_default();
    let outputs = catalog.list_outputs().unwrap_or_default();
    let gone: Vec<_> = inputs
        .into_iter()
        .chain(outputs)
        .filter(|d| d.description == description)
        .map(|d| d.id)
        .collect();
    for id in &gone {
        catalog.remove(*id);
    }
    gone.len()
}

/// Interleaved stereo block holding a square wave of `amplitude`
pub fn square_block(frames: usize, amplitude: i16) -> Vec<i16> {
    (0..frames * 2)
        .map(|i| if (i / 2) % 2 == 0 { amplitude } else { -amplitude })
        .collect()
}

pub struct Rig {
    pub engine: RoutingEngine<MockCatalog, MockBackend>,
    pub catalog: MockCatalog,
    pub backend: MockBackend,
    pub events: EventSender,
    pub rx: EventReceiver,
    pub snapshots: broadcast::Receiver<StatusSnapshot>,
}

impl Rig {
    pub fn new(catalog: MockCatalog) -> Self {
        Self::with_options(catalog, FilterSet::default(), EngineOptions::default())
    }

    pub fn with_options(catalog: MockCatalog, filters: FilterSet, options: EngineOptions) -> Self {
        let backend = MockBackend::new();
        let (events, rx) = event_channel();
        let engine = RoutingEngine::new(
            catalog.clone(),
            backend.clone(),
            events.clone(),
            filters,
            options,
        );
        let snapshots = engine.subscribe();
        Self {
            engine,
            catalog,
            backend,
            events,
            rx,
            snapshots,
        }
    }

    /// Start the engine and return the first snapshot
    pub fn start(&mut self) -> StatusSnapshot {
        self.engine.start();
        self.settle();
        self.latest()
    }

    /// Hand every queued event to the engine, in order
    pub fn settle(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.engine.handle_event(event);
        }
    }

    /// Queue an intent and process it
    pub fn control(&mut self, intent: ControlIntent) -> StatusSnapshot {
        self.events.control(intent);
        self.settle();
        self.latest()
    }

    /// Announce a catalog change and process it
    pub fn catalog_changed(&mut self) -> StatusSnapshot {
        self.engine.handle_event(EngineEvent::CatalogChanged);
        self.settle();
        self.latest()
    }

    /// Feed captured samples and let the pump run
    pub fn capture(&mut self, samples: &[i16]) {
        self.backend.feed_input(samples);
        self.backend.signal_input_ready();
        self.settle();
    }

    /// Most recent snapshot; panics when nothing was published
    pub fn latest(&mut self) -> StatusSnapshot {
        let mut latest = None;
        while let Ok(snapshot) = self.snapshots.try_recv() {
            latest = Some(snapshot);
        }
        latest
            .or_else(|| self.engine.last_snapshot().cloned())
            .expect("engine published no snapshot")
    }

    /// Description of the device playback currently targets
    pub fn playing_on(&self) -> Option<String> {
        self.engine
            .streams()
            .output_device()
            .map(|d| d.description.clone())
    }

    pub fn capturing_from(&self) -> Option<String> {
        self.engine
            .streams()
            .input_device()
            .map(|d| d.description.clone())
    }
}
