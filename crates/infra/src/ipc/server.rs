//! Engine side of the control transport
//!
//! One session at a time. Intents read from the connection go onto the
//! engine event bus; every published snapshot is written back as one frame.
//! Malformed intents are logged and skipped. When the peer goes away the
//! engine is asked to shut down.

use crate::ipc::endpoint::ControlListener;
use crate::ipc::framing::{read_frame, write_message};
use autoaudio_core::domain::events::EventSender;
use autoaudio_core::domain::protocol::{ControlIntent, ProtocolError, StatusSnapshot};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, instrument, warn};

/// Why a control session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent `shutdown`
    Shutdown,
    /// The peer closed the connection or it broke
    Disconnected,
    /// The engine stopped first
    EngineGone,
}

async fn forward_intents<R>(reader: &mut R, events: &EventSender) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return SessionEnd::Disconnected,
            Err(ProtocolError::TooLarge(len)) => {
                warn!(len, "Rejected oversized control message");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Control connection failed");
                return SessionEnd::Disconnected;
            }
        };

        let intent = match ControlIntent::from_json(&frame) {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "Rejected control message");
                continue;
            }
        };

        debug!(?intent, "Control message received");
        let shutdown = intent == ControlIntent::Shutdown;
        if !events.control(intent) {
            return SessionEnd::EngineGone;
        }
        if shutdown {
            return SessionEnd::Shutdown;
        }
    }
}

async fn forward_snapshots<W>(
    writer: &mut W,
    snapshots: &mut broadcast::Receiver<StatusSnapshot>,
) -> SessionEnd
where
    W: AsyncWrite + Unpin,
{
    loop {
        match snapshots.recv().await {
            Ok(snapshot) => {
                if let Err(e) = write_message(writer, &snapshot).await {
                    warn!(error = %e, "Failed to send snapshot");
                    return SessionEnd::Disconnected;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Control surface fell behind, snapshots skipped");
            }
            Err(RecvError::Closed) => return SessionEnd::EngineGone,
        }
    }
}

/// Serve one control connection until either side ends it
#[instrument(skip_all)]
pub async fn serve_connection<S>(
    stream: S,
    events: &EventSender,
    mut snapshots: broadcast::Receiver<StatusSnapshot>,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite,
{
    info!("Control surface connected");
    let (mut reader, mut writer) = tokio::io::split(stream);

    let end = tokio::select! {
        end = forward_intents(&mut reader, events) => end,
        end = forward_snapshots(&mut writer, &mut snapshots) => end,
    };

    if end == SessionEnd::Disconnected {
        info!("Control surface disconnected, shutting down");
        events.control(ControlIntent::Shutdown);
    } else {
        info!(?end, "Control session ended");
    }
    end
}

/// Accept and serve control connections while the engine runs
pub async fn serve(
    mut listener: ControlListener,
    events: EventSender,
    snapshots: broadcast::Sender<StatusSnapshot>,
) -> std::io::Result<()> {
    while !events.is_closed() {
        let stream = listener.accept().await?;
        if serve_connection(stream, &events, snapshots.subscribe()).await == SessionEnd::EngineGone {
            break;
        }
    }
    Ok(())
}
