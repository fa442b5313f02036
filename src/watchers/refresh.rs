//! Periodic refresh of the subscribed topics from a desired-topic source.
//!
//! Each tick reads the source, merges titles, and reconciles the manager's
//! subscribed snapshot against the desired list: additions are subscribed
//! first, then removals are unsubscribed.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::feed::{FeedError, FeedManager, ShutdownSignal};
use crate::subscriptions::{reconcile, Delta, SourceError, TopicSource};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Source read failed: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Configuration for the refresh loop.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

pub struct RefreshLoop {
    source: Arc<dyn TopicSource>,
    manager: FeedManager,
    config: RefreshConfig,
    consecutive_failures: u32,
}

impl RefreshLoop {
    pub fn new(source: Arc<dyn TopicSource>, manager: FeedManager) -> Self {
        Self::with_config(source, manager, RefreshConfig::default())
    }

    pub fn with_config(source: Arc<dyn TopicSource>, manager: FeedManager, config: RefreshConfig) -> Self {
        Self {
            source,
            manager,
            config,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Runs one refresh cycle and returns the applied delta.
    ///
    /// No subscribe/unsubscribe is issued once `shutdown` is cancelled.
    pub async fn tick(&mut self, shutdown: &ShutdownSignal) -> Result<Delta, RefreshError> {
        let desired = self.source.read().await?;
        self.manager.labels().merge(desired.labels);

        let current = self.manager.subscribed();
        let delta = reconcile(&current, &desired.topics);
        if delta.is_empty() {
            debug!("[refresh] Subscriptions up to date ({} topic(s))", current.len());
            return Ok(delta);
        }

        info!(
            "[refresh] {} to add, {} to remove",
            delta.to_add.len(),
            delta.to_remove.len()
        );

        if !delta.to_add.is_empty() {
            if shutdown.is_cancelled() {
                return Err(FeedError::Closed.into());
            }
            self.manager.subscribe(delta.to_add.clone()).await?;
        }
        if !delta.to_remove.is_empty() {
            if shutdown.is_cancelled() {
                return Err(FeedError::Closed.into());
            }
            self.manager.unsubscribe(delta.to_remove.clone()).await?;
        }

        Ok(delta)
    }

    /// Ticks immediately, then every interval, until shutdown.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        info!(
            "[refresh] Refreshing from {} every {}s",
            self.source.describe(),
            self.config.interval.as_secs()
        );

        let guard = shutdown.clone();
        let mut ticker = interval(self.config.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                outcome = self.tick(&guard) => outcome,
            };

            match outcome {
                Ok(_) => self.consecutive_failures = 0,
                Err(RefreshError::Feed(FeedError::Closed)) => break,
                Err(e) => {
                    self.consecutive_failures += 1;
                    warn!(
                        "[refresh] Tick skipped ({} consecutive failure(s)): {}",
                        self.consecutive_failures, e
                    );
                }
            }
        }

        info!("[refresh] Loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::mock::MockConnector;
    use crate::feed::{ManagerConfig, Shutdown};
    use crate::subscriptions::DesiredTopics;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Returns the scripted results in order, then keeps failing.
    struct ScriptedSource {
        reads: Mutex<VecDeque<Result<DesiredTopics, SourceError>>>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<Result<DesiredTopics, SourceError>>) -> Arc<Self> {
            Arc::new(Self {
                reads: Mutex::new(reads.into()),
            })
        }
    }

    #[async_trait]
    impl TopicSource for ScriptedSource {
        async fn read(&self) -> Result<DesiredTopics, SourceError> {
            self.reads
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::Shape("exhausted".to_string())))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn desired(topics: &[&str]) -> DesiredTopics {
        DesiredTopics::from_topics(topics.iter().copied())
    }

    async fn connected_manager() -> (MockConnector, FeedManager) {
        let connector = MockConnector::new();
        let manager = FeedManager::spawn(connector.clone(), ManagerConfig::default(), None);
        manager.connect().await.unwrap();
        (connector, manager)
    }

    #[test]
    fn test_default_config() {
        assert_eq!(RefreshConfig::default().interval, Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_adds_before_removing_and_merges_labels() {
        let (connector, manager) = connected_manager().await;
        manager.subscribe(vec!["a".to_string(), "b".to_string()]).await.unwrap();

        let mut next = desired(&["b", "c", "c"]);
        next.labels.push(("c".to_string(), "ETH above 5k?".to_string()));
        let mut refresh = RefreshLoop::new(ScriptedSource::new(vec![Ok(next)]), manager.clone());

        let shutdown = Shutdown::new();
        let delta = refresh.tick(&shutdown.signal()).await.unwrap();

        assert_eq!(delta.to_add, vec!["c".to_string()]);
        assert_eq!(delta.to_remove, vec!["a".to_string()]);
        assert_eq!(
            connector.sent_names(0),
            vec![
                "subscribe_market_prices",
                "subscribe_market_prices",
                "unsubscribe_market_prices",
            ]
        );
        assert_eq!(manager.subscribed(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(manager.labels().get("c").as_deref(), Some("ETH above 5k?"));

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_source_sends_nothing() {
        let (connector, manager) = connected_manager().await;
        manager.subscribe(vec!["a".to_string()]).await.unwrap();

        let mut refresh = RefreshLoop::new(ScriptedSource::new(vec![Ok(desired(&["a"]))]), manager.clone());
        let delta = refresh.tick(&Shutdown::new().signal()).await.unwrap();

        assert!(delta.is_empty());
        assert_eq!(connector.sent(0).len(), 1);

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_commands_after_cancellation() {
        let (connector, manager) = connected_manager().await;
        let mut refresh = RefreshLoop::new(ScriptedSource::new(vec![Ok(desired(&["a"]))]), manager.clone());

        let shutdown = Shutdown::new();
        shutdown.trigger();
        let result = refresh.tick(&shutdown.signal()).await;

        assert!(matches!(result, Err(RefreshError::Feed(FeedError::Closed))));
        assert!(connector.sent(0).is_empty());
        assert!(manager.subscribed().is_empty());

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_source_skips_tick_and_loop_continues() {
        let (_connector, manager) = connected_manager().await;
        let source = ScriptedSource::new(vec![
            Err(SourceError::Shape("unexpected document".to_string())),
            Ok(desired(&["x", "y"])),
        ]);
        let refresh = RefreshLoop::with_config(
            source,
            manager.clone(),
            RefreshConfig {
                interval: Duration::from_secs(60),
            },
        );

        let shutdown = Shutdown::new();
        let task = tokio::spawn(refresh.run(shutdown.signal()));

        // First tick (t=0) fails, second (t=60s) succeeds.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(manager.subscribed().is_empty());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(manager.subscribed(), vec!["x".to_string(), "y".to_string()]);

        shutdown.trigger();
        task.await.unwrap();
        manager.close().await;
    }
}
