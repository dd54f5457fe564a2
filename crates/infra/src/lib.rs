//! Platform plumbing for AutoAudio: host audio devices and the local
//! control transport.

pub mod audio;
pub mod ipc;
