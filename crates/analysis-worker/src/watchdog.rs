//! Requeues jobs whose worker died or stopped making progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, warn};

use crate::error::StoreError;
use crate::queue::JobQueue;
use crate::worker::sleep_unless;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Games whose lease expired.
    pub expired: Vec<String>,
    /// Games that held a lease but made no progress.
    pub stalled: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.stalled.is_empty()
    }
}

pub struct Watchdog {
    queue: Arc<dyn JobQueue>,
}

impl Watchdog {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// One pass: expired leases first, then stalled jobs.
    pub fn sweep(&self) -> Result<SweepReport, StoreError> {
        let expired = self.queue.expire_leases()?;
        let stalled = self.queue.requeue_stalled()?;
        for game_id in &expired {
            warn!(game_id = %game_id, "lease expired, job requeued");
        }
        for game_id in &stalled {
            warn!(game_id = %game_id, "no progress within stall window, job requeued");
        }
        Ok(SweepReport { expired, stalled })
    }

    pub fn spawn(self, interval: Duration, shutdown: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("analysis-watchdog".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    if let Err(e) = self.sweep() {
                        error!(error = %e, "watchdog sweep failed");
                    }
                    sleep_unless(&shutdown, interval);
                }
            })
    }
}
