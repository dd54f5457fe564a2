//! Remote control session against a running engine
//!
//! Attaches the console to the engine's control endpoint. The engine serves
//! a single control surface and stops when it leaves, so ending this session
//! stops the engine too.

use crate::console::{parse_line, stdin_lines, write_snapshot};
use anyhow::Context;
use autoaudio_core::domain::protocol::ControlIntent;
use autoaudio_infra::ipc::IpcClient;
use tracing::{debug, info};

pub async fn attach(endpoint: &str) -> anyhow::Result<()> {
    let client = IpcClient::connect(endpoint)
        .await
        .with_context(|| format!("Failed to connect to engine at '{endpoint}'"))?;
    info!(endpoint, "Attached to engine");

    let (mut snapshots, mut intents) = client.into_split();
    intents
        .send(&ControlIntent::GetDeviceInfo)
        .await
        .context("Failed to request device info")?;

    let printer = async {
        let mut stdout = tokio::io::stdout();
        while let Some(snapshot) = snapshots.recv().await? {
            write_snapshot(&mut stdout, &snapshot).await?;
        }
        debug!("Engine closed the connection");
        anyhow::Ok(())
    };

    let sender = async {
        let mut lines = stdin_lines();
        while let Some(line) = lines.recv().await {
            if let Some(intent) = parse_line(&line) {
                let shutdown = intent == ControlIntent::Shutdown;
                intents.send(&intent).await?;
                if shutdown {
                    break;
                }
            }
        }
        anyhow::Ok(())
    };

    tokio::select! {
        result = printer => result,
        result = sender => result,
    }
}
