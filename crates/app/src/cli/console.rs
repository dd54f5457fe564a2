//! Line-oriented control surface
//!
//! One JSON intent per input line, one JSON snapshot per output line:
//!
//! ```text
//! > {"command":"filter_changed","primary_filter":"USB"}
//! < {"inputs":[...],"input":"CABLE Output","outputs":[...],"fallback":"Speakers","primary":"USB Headset","primary_filter":"USB","boost":false}
//! ```

use autoaudio_core::domain::events::EventSender;
use autoaudio_core::domain::protocol::{ControlIntent, StatusSnapshot};
use std::io::{self, BufRead};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lines typed on stdin
///
/// Read on a plain thread: a read still pending when the engine stops must
/// not hold up process exit. The channel closes at end of input.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Stopped reading stdin");
                    return;
                }
            }
        }
    });
    rx
}

/// Parse one console line; blank and malformed lines yield `None`
pub fn parse_line(line: &str) -> Option<ControlIntent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match ControlIntent::from_json(line.as_bytes()) {
        Ok(intent) => Some(intent),
        Err(e) => {
            warn!(error = %e, line, "Rejected control message");
            None
        }
    }
}

pub async fn write_snapshot<W>(out: &mut W, snapshot: &StatusSnapshot) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(snapshot)?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await
}

/// Forward intents to the engine until `shutdown` or end of input
///
/// End of input counts as a shutdown request.
pub async fn forward_lines(mut lines: mpsc::UnboundedReceiver<String>, events: &EventSender) {
    while let Some(line) = lines.recv().await {
        let Some(intent) = parse_line(&line) else {
            continue;
        };
        let shutdown = intent == ControlIntent::Shutdown;
        if !events.control(intent) || shutdown {
            return;
        }
    }

    info!("Console input closed, shutting down");
    events.control(ControlIntent::Shutdown);
}

/// Write every published snapshot to `out` until the engine stops
pub async fn print_snapshots<W>(
    mut snapshots: broadcast::Receiver<StatusSnapshot>,
    mut out: W,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        match snapshots.recv().await {
            Ok(snapshot) => write_snapshot(&mut out, &snapshot).await?,
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Console fell behind"),
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}
