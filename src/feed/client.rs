//! Feed client that orchestrates the manager and its background loops.
//!
//! Started components:
//! - the manager actor (connection, subscriptions, inbound dispatch)
//! - the refresh loop reconciling subscriptions against the topic source
//! - the liveness monitor
//! - the snapshot probe, when enabled
//!
//! All of them share the manager's shutdown signal, so `close()` stops
//! everything together.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::FeedConfig;
use crate::connectors::{Connector, SessionCredential};
use crate::events::EventStream;
use crate::subscriptions::{TopicLabels, TopicSource};
use crate::watchers::{LivenessConfig, LivenessMonitor, ProbeLoop, RefreshConfig, RefreshLoop};

use super::{FeedError, FeedManager, ManagerConfig};

pub struct FeedClient {
    manager: FeedManager,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl FeedClient {
    /// Connects and starts the background loops.
    ///
    /// Fails if the initial connect exhausts its attempts; nothing is left
    /// running in that case.
    pub async fn start<C: Connector>(
        connector: C,
        config: &FeedConfig,
        source: Arc<dyn TopicSource>,
        credential: Option<SessionCredential>,
    ) -> Result<Self, FeedError> {
        info!(
            "[client] Starting feed ({}, {})",
            connector.endpoint(),
            if credential.is_some() { "authenticated" } else { "public" }
        );
        let manager = FeedManager::spawn(connector, ManagerConfig::from(config), credential);

        if let Err(e) = manager.connect().await {
            manager.close().await;
            return Err(e);
        }

        let mut tasks = Vec::new();

        let refresh = RefreshLoop::with_config(
            source,
            manager.clone(),
            RefreshConfig {
                interval: config.refresh_interval,
            },
        );
        tasks.push(("refresh", tokio::spawn(refresh.run(manager.shutdown_signal()))));

        let liveness = LivenessMonitor::with_config(
            manager.liveness(),
            LivenessConfig {
                warn_after: config.warn_after,
                poll_interval: config.liveness_poll,
            },
            manager.event_sender(),
        );
        tasks.push(("liveness", tokio::spawn(liveness.run(manager.shutdown_signal()))));

        if let Some(interval) = config.probe_interval {
            let probe = ProbeLoop::new(manager.clone(), interval);
            tasks.push(("probe", tokio::spawn(probe.run(manager.shutdown_signal()))));
        }

        info!("[client] Feed running with {} background task(s)", tasks.len());
        Ok(Self {
            manager,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn manager(&self) -> &FeedManager {
        &self.manager
    }

    pub fn events(&self) -> EventStream {
        self.manager.events()
    }

    pub fn labels(&self) -> TopicLabels {
        self.manager.labels()
    }

    /// Stops every task and releases the transport. Safe to call repeatedly.
    pub async fn close(&self) {
        self.manager.close().await;

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for (name, task) in tasks {
            if let Err(e) = task.await {
                error!("[client] {} task failed: {}", name, e);
            }
        }
        info!("[client] Feed closed");
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("manager", &self.manager)
            .field("tasks", &self.tasks.lock().len())
            .finish()
    }
}
