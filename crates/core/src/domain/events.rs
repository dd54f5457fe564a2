//! Engine event bus
//!
//! Everything that can change routing state reaches the engine as an
//! [`EngineEvent`] on one ordered channel: catalog changes from the device
//! watcher, control intents from the control surface, and readiness/fault
//! notifications from host audio threads. The engine is the only consumer,
//! so events are handled strictly in arrival order.

use crate::domain::protocol::ControlIntent;
use crate::domain::stream::StreamTag;
use tokio::sync::mpsc;
use tracing::trace;

/// Something the routing engine must react to
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The set of output devices changed
    CatalogChanged,

    /// Intent from a control surface
    Control(ControlIntent),

    /// A stream left the active state
    StreamFault { tag: StreamTag, reason: String },

    /// The input stream has samples to read
    InputReady { tag: StreamTag },
}

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Cloneable producer side of the event bus
///
/// Sending never blocks, so it is safe to call from audio callbacks. Sends
/// after the engine has stopped are silently discarded.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

/// Create the engine event bus
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

impl EventSender {
    /// Send an event; returns `false` once the engine is gone
    pub fn send(&self, event: EngineEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                trace!(event = ?e.0, "Engine event dropped, receiver closed");
                false
            }
        }
    }

    pub fn catalog_changed(&self) -> bool {
        self.send(EngineEvent::CatalogChanged)
    }

    pub fn control(&self, intent: ControlIntent) -> bool {
        self.send(EngineEvent::Control(intent))
    }

    pub fn stream_fault(&self, tag: StreamTag, reason: impl Into<String>) -> bool {
        self.send(EngineEvent::StreamFault {
            tag,
            reason: reason.into(),
        })
    }

    pub fn input_ready(&self, tag: StreamTag) -> bool {
        self.send(EngineEvent::InputReady { tag })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
