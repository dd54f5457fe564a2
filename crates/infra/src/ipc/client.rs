//! Control-surface side of the transport

use crate::ipc::endpoint::{self, ClientStream};
use crate::ipc::framing::{read_message, write_message};
use autoaudio_core::domain::protocol::{ControlIntent, Result, StatusSnapshot};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tracing::debug;

/// Connection to a running engine
pub struct IpcClient<S = ClientStream> {
    stream: S,
}

impl IpcClient<ClientStream> {
    /// Connect to the engine listening on `name`
    pub async fn connect(name: &str) -> Result<Self> {
        let stream = endpoint::connect(name).await?;
        debug!(endpoint = name, "Connected to engine");
        Ok(Self::new(stream))
    }
}

impl<S> IpcClient<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S: AsyncWrite + Unpin> IpcClient<S> {
    pub async fn send(&mut self, intent: &ControlIntent) -> Result<()> {
        write_message(&mut self.stream, intent).await
    }
}

impl<S: AsyncRead + Unpin> IpcClient<S> {
    /// Next snapshot from the engine; `None` once it has gone away
    pub async fn recv(&mut self) -> Result<Option<StatusSnapshot>> {
        read_message(&mut self.stream).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> IpcClient<S> {
    /// Ask for the current state and wait for it
    pub async fn device_info(&mut self) -> Result<Option<StatusSnapshot>> {
        self.send(&ControlIntent::GetDeviceInfo).await?;
        self.recv().await
    }

    /// Separate snapshot and intent halves, usable from different tasks
    pub fn into_split(self) -> (IpcClient<ReadHalf<S>>, IpcClient<WriteHalf<S>>) {
        let (reader, writer) = tokio::io::split(self.stream);
        (IpcClient::new(reader), IpcClient::new(writer))
    }
}
