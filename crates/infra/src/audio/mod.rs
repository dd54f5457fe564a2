//! Host audio through CPAL
//!
//! CPAL abstracts the platform APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod registry;
pub mod stream;
pub mod watcher;

pub use cpal_backend::CpalCatalog;
pub use registry::{DeviceRegistry, HostDevice};
pub use stream::{CpalBackend, CpalCapture, CpalPlayback};
pub use watcher::{watch_outputs, OutputWatcher};
