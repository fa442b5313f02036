//! Liveness monitor for the market data stream.
//!
//! A connection can stay healthy at the transport level (keepalives keep
//! flowing) while the server has silently stopped sending market data. The
//! manager records each qualifying event in a [`LivenessTracker`]; the
//! [`LivenessMonitor`] polls it and warns while the feed has been silent for
//! longer than the configured window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::events::{EventSender, FeedEvent};
use crate::feed::ShutdownSignal;

/// Last time a qualifying event was received.
#[derive(Clone)]
pub struct LivenessTracker {
    tx: Arc<watch::Sender<Option<Instant>>>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn observe(&self, at: Instant) {
        self.tx.send_replace(Some(at));
    }

    pub fn last_observed(&self) -> Option<Instant> {
        *self.tx.borrow()
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LivenessTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessTracker")
            .field("last_observed", &self.last_observed())
            .finish()
    }
}

/// Configuration for the liveness monitor.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Silence longer than this is reported.
    pub warn_after: Duration,
    /// How often the tracker is checked.
    pub poll_interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            warn_after: Duration::from_secs(300),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Result of one liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Fresh,
    Stale {
        silent_for: Duration,
        /// Nothing qualifying has arrived since monitoring began.
        never_observed: bool,
    },
}

pub struct LivenessMonitor {
    tracker: LivenessTracker,
    config: LivenessConfig,
    events: EventSender,
    started: Instant,
}

impl LivenessMonitor {
    pub fn new(tracker: LivenessTracker, events: EventSender) -> Self {
        Self::with_config(tracker, LivenessConfig::default(), events)
    }

    pub fn with_config(tracker: LivenessTracker, config: LivenessConfig, events: EventSender) -> Self {
        Self {
            tracker,
            config,
            events,
            started: Instant::now(),
        }
    }

    pub fn check(&self, now: Instant) -> Liveness {
        let (since, never_observed) = match self.tracker.last_observed() {
            Some(at) => (at, false),
            None => (self.started, true),
        };
        let silent_for = now.saturating_duration_since(since);
        if silent_for > self.config.warn_after {
            Liveness::Stale {
                silent_for,
                never_observed,
            }
        } else {
            Liveness::Fresh
        }
    }

    /// Polls until shutdown, warning on every tick while stale.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!(
            "[liveness] Monitoring market data (warn after {}s, poll every {}s)",
            self.config.warn_after.as_secs(),
            self.config.poll_interval.as_secs()
        );

        let poll = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.check(Instant::now()) {
                Liveness::Fresh => debug!("[liveness] Market data is fresh"),
                Liveness::Stale {
                    silent_for,
                    never_observed,
                } => {
                    if never_observed {
                        warn!(
                            "[liveness] No market data observed yet ({}s since monitoring began)",
                            silent_for.as_secs()
                        );
                    } else {
                        warn!("[liveness] {}s without market data", silent_for.as_secs());
                    }
                    self.events.publish(FeedEvent::Stale {
                        silent_for,
                        never_observed,
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        info!("[liveness] Monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Shutdown;

    fn config(warn_after: u64, poll: u64) -> LivenessConfig {
        LivenessConfig {
            warn_after: Duration::from_secs(warn_after),
            poll_interval: Duration::from_secs(poll),
        }
    }

    #[test]
    fn test_default_config() {
        let config = LivenessConfig::default();
        assert_eq!(config.warn_after, Duration::from_secs(300));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_against_last_observed() {
        let tracker = LivenessTracker::new();
        let monitor = LivenessMonitor::with_config(tracker.clone(), config(300, 30), EventSender::new(8));

        let observed = Instant::now();
        tracker.observe(observed);
        assert_eq!(monitor.check(observed + Duration::from_secs(290)), Liveness::Fresh);
        assert_eq!(
            monitor.check(observed + Duration::from_secs(301)),
            Liveness::Stale {
                silent_for: Duration::from_secs(301),
                never_observed: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_before_any_event_uses_start_time() {
        let monitor = LivenessMonitor::with_config(LivenessTracker::new(), config(60, 10), EventSender::new(8));
        let start = Instant::now();
        assert_eq!(monitor.check(start + Duration::from_secs(30)), Liveness::Fresh);
        assert!(matches!(
            monitor.check(start + Duration::from_secs(61)),
            Liveness::Stale { never_observed: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_emits_stale_until_data_arrives() {
        let tracker = LivenessTracker::new();
        let events = EventSender::new(16);
        let mut stream = events.subscribe();
        let shutdown = Shutdown::new();

        let monitor = LivenessMonitor::with_config(tracker.clone(), config(60, 30), events);
        let task = tokio::spawn(monitor.run(shutdown.signal()));

        // Ticks at 30s and 60s are within the window; 90s is not.
        tokio::time::sleep(Duration::from_secs(91)).await;
        match stream.try_recv() {
            Some(FeedEvent::Stale { never_observed, silent_for, .. }) => {
                assert!(never_observed);
                assert_eq!(silent_for, Duration::from_secs(90));
            }
            other => panic!("expected stale event, got {:?}", other),
        }
        assert!(stream.try_recv().is_none());

        tracker.observe(Instant::now());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(stream.try_recv().is_none());

        shutdown.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_silence_is_reported_after_data_stops() {
        let tracker = LivenessTracker::new();
        let events = EventSender::new(16);
        let mut stream = events.subscribe();
        let shutdown = Shutdown::new();

        tracker.observe(Instant::now());
        let monitor = LivenessMonitor::with_config(tracker, config(60, 30), events);
        let task = tokio::spawn(monitor.run(shutdown.signal()));

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(matches!(
            stream.try_recv(),
            Some(FeedEvent::Stale { never_observed: false, .. })
        ));

        shutdown.trigger();
        task.await.unwrap();
    }
}
