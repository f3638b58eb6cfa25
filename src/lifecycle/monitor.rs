// src/lifecycle/monitor.rs

//! Background monitor: refreshes resource snapshots of running records and
//! reaps terminal records past the retention window.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::lifecycle::manager::{Shared, TaskManager};

pub(crate) struct MonitorHandle {
    stop: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.join.await {
            debug!(error = %e, "task monitor ended abnormally");
        }
    }
}

/// Spawn the monitor loop. It holds only a weak reference, so it also ends
/// once every manager clone is dropped.
pub(crate) fn spawn(manager: &TaskManager, interval: Duration) -> MonitorHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let weak = manager.downgrade();
    let interval = interval.max(Duration::from_millis(1));
    let join = tokio::spawn(run(weak, interval, stop_rx));
    info!(interval_ms = interval.as_millis() as u64, "task monitor started");
    MonitorHandle {
        stop: stop_tx,
        join,
    }
}

async fn run(shared: Weak<Shared>, interval: Duration, mut stop: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                let manager = TaskManager::from_shared(shared);
                manager.refresh_resources();
                let reaped = manager.reap_older_than(manager.config().retention);
                if reaped > 0 {
                    debug!(reaped, "reaped finished task records");
                }
            }
        }
    }

    debug!("task monitor stopped");
}
