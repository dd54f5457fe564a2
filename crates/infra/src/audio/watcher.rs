//! Output device hot-plug detection
//!
//! cpal has no device-change notifications, so the host is re-enumerated on
//! a blocking worker and the output list compared by handle. Any difference,
//! including a reorder, is reported as one
//! [`EngineEvent::CatalogChanged`](autoaudio_core::domain::EngineEvent).
//!
//! Each poll refreshes the capture list as well, so the engine never has to
//! enumerate, but capture changes alone do not raise an event.

use autoaudio_core::domain::audio::{DeviceCatalog, DeviceId};
use autoaudio_core::domain::events::EventSender;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Remembers the last output listing
#[derive(Debug)]
pub struct OutputWatcher<C> {
    catalog: C,
    last: Option<Vec<DeviceId>>,
    failing: bool,
}

impl<C: DeviceCatalog> OutputWatcher<C> {
    /// Start from the outputs the catalog already holds, which is what the
    /// engine last saw
    pub fn new(catalog: C) -> Self {
        let last = catalog
            .list_outputs()
            .ok()
            .map(|devices| devices.into_iter().map(|d| d.id).collect());
        Self {
            catalog,
            last,
            failing: false,
        }
    }

    /// Re-enumerate once; returns whether the outputs changed since the last
    /// poll. Blocks on the host.
    ///
    /// Without a baseline, the first successful poll only records one.
    pub fn poll(&mut self) -> bool {
        let listed = self
            .catalog
            .refresh()
            .and_then(|()| self.catalog.list_outputs());
        let ids: Vec<DeviceId> = match listed {
            Ok(devices) => devices.into_iter().map(|d| d.id).collect(),
            Err(e) => {
                if !self.failing {
                    warn!(error = %e, "Output enumeration failed, will keep polling");
                    self.failing = true;
                }
                return false;
            }
        };
        self.failing = false;

        match self.last.replace(ids) {
            None => false,
            Some(previous) => self.last.as_ref() != Some(&previous),
        }
    }
}

/// Poll outputs every `period` and report changes until the engine is gone
pub async fn watch_outputs<C>(catalog: C, period: Duration, events: EventSender)
where
    C: DeviceCatalog + 'static,
{
    info!(period_ms = period.as_millis() as u64, "Output watcher started");
    let mut watcher = OutputWatcher::new(catalog);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let polled = tokio::task::spawn_blocking(move || {
            let changed = watcher.poll();
            (watcher, changed)
        })
        .await;

        let changed = match polled {
            Ok((w, changed)) => {
                watcher = w;
                changed
            }
            Err(e) => {
                error!(error = %e, "Output poll task failed, watcher stopping");
                return;
            }
        };

        if changed {
            debug!("Output devices changed");
            if !events.catalog_changed() {
                break;
            }
        } else if events.is_closed() {
            break;
        }
    }
    debug!("Output watcher stopped");
}
