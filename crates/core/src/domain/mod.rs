//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod events;
pub mod gain;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod protocol;
pub mod routing;
pub mod selector;
pub mod stream;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioError, AudioFormat, Device, DeviceCatalog, DeviceId, Direction};
pub use config::{ConfigError, RouterConfig};
pub use events::{event_channel, EngineEvent, EventReceiver, EventSender};
pub use gain::GainProcessor;
pub use protocol::{ControlIntent, ProtocolError, StatusSnapshot};
pub use routing::{EngineOptions, EnginePhase, Flow, RoutingEngine, RoutingState};
pub use selector::{select, FilterSet};
pub use stream::{CaptureStream, PlaybackStream, StreamBackend, StreamManager, StreamTag};
