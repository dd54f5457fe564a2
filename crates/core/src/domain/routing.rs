//! Routing engine: device selection, hot-swap and failover
//!
//! The engine owns all routing state and is driven by one ordered stream of
//! [`EngineEvent`]s. Each catalog change or filter change triggers a
//! re-evaluation:
//!
//! 1. resolve the input filter; swap the capture stream if the device handle
//!    changed
//! 2. resolve the fallback and primary filters against the outputs
//! 3. on a fallback change, move playback to it unless a primary resolved
//! 4. on a primary change, move playback to the primary, or to the fallback
//!    when the primary is gone
//! 5. publish a [`StatusSnapshot`], whether or not anything changed
//!
//! Stream faults bypass re-evaluation: the faulted stream is rebuilt against
//! the current selection straight away.
//!
//! Only output hot-plug produces catalog events. A new capture device is
//! picked up on the next re-evaluation, whatever triggers it.

use crate::domain::audio::{same_device, Device, DeviceCatalog, Direction};
use crate::domain::config::RouterConfig;
use crate::domain::events::{EngineEvent, EventReceiver, EventSender};
use crate::domain::protocol::{ControlIntent, StatusSnapshot, PRIMARY_NOT_CONNECTED};
use crate::domain::selector::{select, FilterSet};
use crate::domain::stream::{StreamBackend, StreamManager, StreamTag, DEFAULT_BLOCK_FRAMES};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Window in which repeated faults on one stream count against the limit
pub const FAULT_WINDOW: Duration = Duration::from_secs(10);

const SNAPSHOT_CAPACITY: usize = 16;

/// Lifecycle of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Unconfigured,
    Running,
    /// Terminal
    Stopped,
}

/// Whether the event loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Resolved devices and the boost switch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingState {
    pub input_device: Option<Device>,
    /// `None` means "not connected"
    pub primary_device: Option<Device>,
    pub fallback_device: Option<Device>,
    pub boost_enabled: bool,
}

impl RoutingState {
    /// Device playback should target: primary when present
    pub fn output_target(&self) -> Option<&Device> {
        self.primary_device.as_ref().or(self.fallback_device.as_ref())
    }
}

/// Tunables for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub block_frames: usize,
    pub fault_rebuild_limit: u32,
    pub boost: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            block_frames: DEFAULT_BLOCK_FRAMES,
            fault_rebuild_limit: 5,
            boost: false,
        }
    }
}

impl From<&RouterConfig> for EngineOptions {
    fn from(config: &RouterConfig) -> Self {
        Self {
            block_frames: config.audio.block_frames,
            fault_rebuild_limit: config.engine.fault_rebuild_limit,
            boost: config.engine.boost,
        }
    }
}

/// Rebuilds allowed per stream direction within [`FAULT_WINDOW`]
#[derive(Debug, Clone, Copy)]
struct FaultBudget {
    count: u32,
    window_start: Option<Instant>,
}

impl FaultBudget {
    const fn new() -> Self {
        Self {
            count: 0,
            window_start: None,
        }
    }

    /// Record a fault; returns the number of faults in the current window
    fn record(&mut self, now: Instant) -> u32 {
        match self.window_start {
            Some(start) if now.duration_since(start) <= FAULT_WINDOW => self.count += 1,
            _ => {
                self.window_start = Some(now);
                self.count = 1;
            }
        }
        self.count
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[derive(Debug, Default)]
struct CatalogView {
    inputs: Vec<Device>,
    outputs: Vec<Device>,
}

/// The routing context: one per session, owned by the event loop
pub struct RoutingEngine<C: DeviceCatalog, B: StreamBackend> {
    catalog: C,
    streams: StreamManager<B>,
    filters: FilterSet,
    state: RoutingState,
    phase: EnginePhase,
    view: CatalogView,
    snapshots: broadcast::Sender<StatusSnapshot>,
    last_snapshot: Option<StatusSnapshot>,
    input_faults: FaultBudget,
    output_faults: FaultBudget,
    fault_rebuild_limit: u32,
}

impl<C: DeviceCatalog, B: StreamBackend> RoutingEngine<C, B> {
    /// Create an engine; `events` must be the sender half of the bus the
    /// engine will later be run on.
    pub fn new(
        catalog: C,
        backend: B,
        events: EventSender,
        filters: FilterSet,
        options: EngineOptions,
    ) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CAPACITY);
        Self {
            catalog,
            streams: StreamManager::new(backend, events, options.block_frames),
            filters,
            state: RoutingState {
                boost_enabled: options.boost,
                ..RoutingState::default()
            },
            phase: EnginePhase::Unconfigured,
            view: CatalogView::default(),
            snapshots,
            last_snapshot: None,
            input_faults: FaultBudget::new(),
            output_faults: FaultBudget::new(),
            fault_rebuild_limit: options.fault_rebuild_limit,
        }
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.snapshots.subscribe()
    }

    /// Sender side of the snapshot feed, for transports that subscribe later
    pub fn snapshot_feed(&self) -> broadcast::Sender<StatusSnapshot> {
        self.snapshots.clone()
    }

    /// Enter `Running` and resolve the route for the first time
    pub fn start(&mut self) {
        if self.phase != EnginePhase::Unconfigured {
            warn!(phase = ?self.phase, "Engine already started");
            return;
        }
        info!(filters = ?self.filters, boost = self.state.boost_enabled, "Routing engine starting");
        self.phase = EnginePhase::Running;
        self.reevaluate();
    }

    /// Drive the engine until a shutdown intent arrives
    pub async fn run(mut self, mut events: EventReceiver) {
        self.start();
        while let Some(event) = events.recv().await {
            if self.handle_event(event) == Flow::Stop {
                break;
            }
        }
        self.shutdown();
    }

    /// Handle one event
    pub fn handle_event(&mut self, event: EngineEvent) -> Flow {
        match self.phase {
            EnginePhase::Stopped => return Flow::Stop,
            EnginePhase::Unconfigured => self.start(),
            EnginePhase::Running => {}
        }

        match event {
            EngineEvent::CatalogChanged => {
                debug!("Output devices changed");
                self.reevaluate();
            }
            EngineEvent::Control(intent) => return self.handle_control(intent),
            EngineEvent::StreamFault { tag, reason } => self.handle_fault(tag, &reason),
            EngineEvent::InputReady { tag } => {
                if self.streams.pump(tag, self.state.boost_enabled) > 0 {
                    self.input_faults.reset();
                }
            }
        }
        Flow::Continue
    }

    fn handle_control(&mut self, intent: ControlIntent) -> Flow {
        debug!(?intent, "Control intent");
        match intent {
            ControlIntent::UiChange {
                input,
                primary,
                fallback,
            } => {
                self.filters.set_input(input);
                self.filters.set_fallback(fallback);
                if primary != PRIMARY_NOT_CONNECTED {
                    self.filters.set_primary(primary);
                }
                self.reevaluate();
            }
            ControlIntent::FilterChanged { primary_filter } => {
                self.filters.set_primary(primary_filter);
                self.reevaluate();
            }
            ControlIntent::SetBoost { enabled } => {
                info!(enabled, "Boost toggled");
                self.state.boost_enabled = enabled;
                self.publish();
            }
            ControlIntent::GetDeviceInfo => {
                self.refresh_view();
                self.publish();
            }
            ControlIntent::Shutdown => {
                self.shutdown();
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Re-resolve all three filters against the catalog and swap streams
    /// whose device handle changed.
    #[instrument(skip(self))]
    pub fn reevaluate(&mut self) {
        self.input_faults.reset();
        self.output_faults.reset();
        self.refresh_view();

        let new_input = select(&self.view.inputs, &self.filters.input_filter).cloned();
        if !same_device(new_input.as_ref(), self.state.input_device.as_ref()) {
            info!(
                device = new_input.as_ref().map(|d| d.description.as_str()),
                "Input device changed"
            );
            self.state.input_device = new_input;
            self.rebuild_input();
        }

        let new_fallback = select(&self.view.outputs, &self.filters.fallback_filter).cloned();
        let new_primary = select(&self.view.outputs, &self.filters.primary_filter).cloned();

        if !same_device(new_fallback.as_ref(), self.state.fallback_device.as_ref()) {
            info!(
                device = new_fallback.as_ref().map(|d| d.description.as_str()),
                "Fallback device changed"
            );
            self.state.fallback_device = new_fallback;
            if new_primary.is_none() {
                self.route_to_fallback();
            }
        }

        if !same_device(new_primary.as_ref(), self.state.primary_device.as_ref()) {
            info!(
                device = new_primary.as_ref().map(|d| d.description.as_str()),
                "Primary device changed"
            );
            self.state.primary_device = new_primary;
            self.rebuild_output();
        }

        self.publish();
    }

    /// Take the catalog's current listing; host enumeration happens off the
    /// loop, see [`DeviceCatalog::refresh`]
    fn refresh_view(&mut self) {
        match (self.catalog.list_inputs(), self.catalog.list_outputs()) {
            (Ok(inputs), Ok(outputs)) => self.view = CatalogView { inputs, outputs },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Device enumeration failed, keeping last known devices");
            }
        }
    }

    fn rebuild_input(&mut self) {
        let Some(device) = self.state.input_device.clone() else {
            self.streams.close_input();
            return;
        };
        if let Err(e) = self.streams.open_input(&device) {
            warn!(device = %device.description, error = %e, "Failed to open input stream");
            self.state.input_device = None;
        }
    }

    /// Point playback at the primary device, or the fallback without one
    fn rebuild_output(&mut self) {
        if let Some(primary) = self.state.primary_device.clone() {
            info!(device = %primary.description, "Playing with primary device");
            match self.streams.open_output(&primary) {
                Ok(()) => return,
                Err(e) => {
                    warn!(device = %primary.description, error = %e, "Failed to open primary output");
                    self.state.primary_device = None;
                }
            }
        }
        self.route_to_fallback();
    }

    fn route_to_fallback(&mut self) {
        let Some(fallback) = self.state.fallback_device.clone() else {
            debug!("No output device resolved");
            self.streams.close_output();
            return;
        };
        info!(device = %fallback.description, "Playing with fallback device");
        if let Err(e) = self.streams.open_output(&fallback) {
            warn!(device = %fallback.description, error = %e, "Failed to open fallback output");
            self.state.fallback_device = None;
        }
    }

    fn handle_fault(&mut self, tag: StreamTag, reason: &str) {
        if !self.streams.is_current(tag) {
            debug!(%tag, reason, "Ignoring fault from retired stream");
            return;
        }

        let budget = match tag.direction {
            Direction::Input => &mut self.input_faults,
            Direction::Output => &mut self.output_faults,
        };
        let faults = budget.record(Instant::now());

        if faults > self.fault_rebuild_limit {
            error!(%tag, reason, faults, "Stream keeps failing, giving up until the next re-evaluation");
            self.abandon(tag.direction);
        } else {
            warn!(%tag, reason, "Stream left the active state, rebuilding");
            match tag.direction {
                Direction::Input => self.rebuild_input(),
                Direction::Output => self.rebuild_output(),
            }
        }
        self.publish();
    }

    /// Close a stream that will not stay up and forget its device, so the
    /// next re-evaluation tries again
    fn abandon(&mut self, direction: Direction) {
        match direction {
            Direction::Input => {
                self.streams.close_input();
                self.state.input_device = None;
            }
            Direction::Output => {
                let failed = self.streams.output_device().map(|d| d.id);
                self.streams.close_output();
                if self.state.primary_device.as_ref().map(|d| d.id) == failed {
                    self.state.primary_device = None;
                } else if self.state.fallback_device.as_ref().map(|d| d.id) == failed {
                    self.state.fallback_device = None;
                }
            }
        }
    }

    fn publish(&mut self) {
        let snapshot = StatusSnapshot::new(
            &self.view.inputs,
            &self.view.outputs,
            self.state.input_device.as_ref(),
            self.state.primary_device.as_ref(),
            self.state.fallback_device.as_ref(),
            &self.filters,
            self.state.boost_enabled,
        );
        // No subscriber yet is fine; the snapshot is also kept as the latest.
        let _ = self.snapshots.send(snapshot.clone());
        self.last_snapshot = Some(snapshot);
    }

    /// Close input then output and enter `Stopped`
    pub fn shutdown(&mut self) {
        if self.phase == EnginePhase::Stopped {
            return;
        }
        info!("Routing engine stopping");
        self.phase = EnginePhase::Stopped;
        self.streams.shutdown();
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn state(&self) -> &RoutingState {
        &self.state
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn streams(&self) -> &StreamManager<B> {
        &self.streams
    }

    pub fn last_snapshot(&self) -> Option<&StatusSnapshot> {
        self.last_snapshot.as_ref()
    }
}
