//! Local control transport
//!
//! A control surface in another process talks to the engine over a local
//! socket (a Unix domain socket, or a named pipe on Windows). Each message is
//! one JSON object in a length-prefixed frame; see [`framing`].

pub mod client;
pub mod endpoint;
pub mod framing;
pub mod server;

pub use client::IpcClient;
pub use endpoint::ControlListener;
pub use framing::{read_frame, read_message, write_frame, write_message};
pub use server::{serve, serve_connection, SessionEnd};
