//! Periodic snapshot probe.
//!
//! Some markets only publish on change. Asking for a snapshot of every
//! subscribed topic at a fixed interval keeps prices flowing for quiet
//! markets.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::feed::{FeedError, FeedManager, ShutdownSignal};

pub struct ProbeLoop {
    manager: FeedManager,
    interval: Duration,
}

impl ProbeLoop {
    pub fn new(manager: FeedManager, interval: Duration) -> Self {
        Self {
            manager,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!("[probe] Requesting snapshots every {}s", self.interval.as_secs());
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.manager.probe().await {
                Ok(()) => debug!("[probe] Snapshot requested"),
                Err(FeedError::Closed) => break,
                Err(e) => debug!("[probe] Probe not sent: {}", e),
            }
        }

        info!("[probe] Loop stopped");
    }
}
