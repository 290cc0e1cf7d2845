//! Heartbeat and liveness loop owned by the hub.
//!
//! The task holds only a `Weak<EventHub>`, so a dropped hub ends it on the
//! next tick even if nobody called `shutdown`.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::hub::EventHub;

/// Handle to the running loop; stopping it is explicit so tests never leak timers.
pub(crate) struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Maintenance {
    pub(crate) async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

pub(crate) fn spawn(hub: Weak<EventHub>, period: Duration) -> Maintenance {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run(hub, period.max(Duration::from_millis(1)), shutdown_rx));
    Maintenance {
        shutdown_tx,
        handle,
    }
}

async fn run(hub: Weak<EventHub>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    // first tick one full period after start, not immediately
    let mut tick = tokio::time::interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let Some(hub) = hub.upgrade() else {
                    debug!("event hub dropped, maintenance loop exiting");
                    break;
                };
                let reclaimed = hub.sweep_dead_connections();
                let reached = hub.send_heartbeat();
                debug!(reclaimed, reached, "maintenance tick");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("event hub maintenance loop shutting down");
                    break;
                }
            }
        }
    }
}
