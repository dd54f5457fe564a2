//! AutoAudio core: device selection, stream lifecycle and the gain stage
//!
//! Nothing in this crate talks to the host audio subsystem directly. The
//! `infra` crate plugs cpal in behind the [`domain::audio::DeviceCatalog`]
//! and [`domain::stream::StreamBackend`] traits.

pub mod domain;
