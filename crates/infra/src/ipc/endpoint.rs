//! Well-known local endpoint
//!
//! The endpoint name maps to `<temp dir>/<name>.sock` on Unix and to the
//! named pipe `\\.\pipe\<name>` on Windows.

use std::io;
use tracing::{debug, info};

#[cfg(unix)]
pub type ServerStream = tokio::net::UnixStream;
#[cfg(unix)]
pub type ClientStream = tokio::net::UnixStream;

#[cfg(windows)]
pub type ServerStream = tokio::net::windows::named_pipe::NamedPipeServer;
#[cfg(windows)]
pub type ClientStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// Filesystem path of the control socket
#[cfg(unix)]
pub fn socket_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("{name}.sock"))
}

/// Full name of the control pipe
#[cfg(windows)]
pub fn pipe_name(name: &str) -> String {
    format!(r"\\.\pipe\{name}")
}

/// Accepts control connections on the well-known endpoint
#[derive(Debug)]
pub struct ControlListener {
    #[cfg(unix)]
    listener: tokio::net::UnixListener,
    #[cfg(unix)]
    path: std::path::PathBuf,

    #[cfg(windows)]
    next: tokio::net::windows::named_pipe::NamedPipeServer,
    #[cfg(windows)]
    pipe: String,
}

#[cfg(unix)]
impl ControlListener {
    /// Start listening; a stale socket file left by a crashed engine is removed
    pub fn bind(name: &str) -> io::Result<Self> {
        let path = socket_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale control socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = tokio::net::UnixListener::bind(&path)?;
        info!(path = %path.display(), "Control endpoint listening");
        Ok(Self { listener, path })
    }

    pub async fn accept(&mut self) -> io::Result<ServerStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }
}

#[cfg(unix)]
impl Drop for ControlListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(windows)]
impl ControlListener {
    pub fn bind(name: &str) -> io::Result<Self> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let pipe = pipe_name(name);
        let next = ServerOptions::new().first_pipe_instance(true).create(&pipe)?;
        info!(pipe = %pipe, "Control endpoint listening");
        Ok(Self { next, pipe })
    }

    pub async fn accept(&mut self) -> io::Result<ServerStream> {
        use tokio::net::windows::named_pipe::ServerOptions;

        self.next.connect().await?;
        let fresh = ServerOptions::new().create(&self.pipe)?;
        Ok(std::mem::replace(&mut self.next, fresh))
    }
}

/// Connect to a running engine
#[cfg(unix)]
pub async fn connect(name: &str) -> io::Result<ClientStream> {
    tokio::net::UnixStream::connect(socket_path(name)).await
}

/// Connect to a running engine
#[cfg(windows)]
pub async fn connect(name: &str) -> io::Result<ClientStream> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(pipe_name(name))
}
