//! Limitless feed - main entry point.
//!
//! Connects to the market feed, keeps subscriptions in line with the topic
//! file (or REST discovery), and logs every event until Ctrl+C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use limitless_feed::config::{FeedConfig, SourceConfig};
use limitless_feed::connectors::{DiscoveryTopicSource, SessionCredential, SocketIoConnector};
use limitless_feed::events::FeedEvent;
use limitless_feed::feed::FeedClient;
use limitless_feed::subscriptions::{FileTopicSource, TopicLabels, TopicSource};
use limitless_feed::utils::init_from_env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: No .env file found or error loading it: {}", e);
    }

    init_from_env();

    info!("╔════════════════════════════════════════════════════════╗");
    info!("║   Limitless Market Feed                                ║");
    info!("╚════════════════════════════════════════════════════════╝");

    let config = FeedConfig::from_env().context("Invalid configuration")?;

    let credential = SessionCredential::from_env();
    if credential.is_none() {
        warn!("No session found in environment");
        warn!("Set LIMITLESS_SESSION for authenticated access (position updates)");
        warn!("Continuing with public market data only");
    } else {
        info!("Session credential loaded");
    }

    let source: Arc<dyn TopicSource> = match &config.source {
        SourceConfig::File(path) => Arc::new(FileTopicSource::new(path.clone())),
        SourceConfig::Discovery { api_url, category } => Arc::new(
            DiscoveryTopicSource::new(api_url.clone(), category.clone())
                .context("Failed to build discovery client")?,
        ),
    };
    info!("Topic source: {}", source.describe());

    let connector = SocketIoConnector::new(&config.ws_url, &config.namespace).with_origin(&config.origin);
    let client = FeedClient::start(connector, &config, source, credential)
        .await
        .context("Initial connection failed")?;

    let labels = client.labels();
    let mut events = client.events();

    info!("Feed running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event, &labels),
                None => {
                    warn!("Event stream ended");
                    break;
                }
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    client.close().await;
    info!("Shut down cleanly.");
    Ok(())
}

fn log_event(event: &FeedEvent, labels: &TopicLabels) {
    match event {
        FeedEvent::Price {
            event_name,
            label,
            update,
            received_at,
        } => {
            let name = label.clone().unwrap_or_else(|| labels.display(&update.topic));
            info!(
                "[{}] {} @ {} - YES: {:?} NO: {:?} VOL: {:?} ({})",
                event_name,
                name,
                received_at.format("%H:%M:%S"),
                update.yes_price,
                update.no_price,
                update.volume,
                update.source_path
            );
            if let Some(raw) = &update.unparsed_price {
                debug!("[{}] Unparsed price for {}: {}", event_name, name, raw);
            }
        }
        FeedEvent::Unrecognized {
            event_name, payload, ..
        } => debug!("[{}] Unrecognized payload: {}", event_name, payload),
        FeedEvent::Connected { timestamp } => info!("Connected at {}", timestamp.format("%H:%M:%S")),
        FeedEvent::Disconnected {
            reason, will_retry, ..
        } => warn!("Disconnected: {} (retrying: {})", reason, will_retry),
        FeedEvent::Reconnected { resubscribed, .. } => {
            info!("Reconnected, {} topic(s) resubscribed", resubscribed)
        }
        FeedEvent::TransmitFailed {
            operation,
            topics,
            error,
            ..
        } => warn!("{} of {} topic(s) failed: {}", operation, topics, error),
        FeedEvent::Stale {
            silent_for,
            never_observed,
            ..
        } => {
            if *never_observed {
                warn!("No market data observed yet ({}s)", silent_for.as_secs());
            } else {
                warn!("No market data for {}s", silent_for.as_secs());
            }
        }
    }
}
