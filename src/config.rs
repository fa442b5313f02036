//! Feed configuration.
//!
//! Every setting has a default and can be overridden through a `LIMITLESS_*`
//! environment variable (a `.env` file is loaded by the binary first).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::connectors::discovery::DEFAULT_API_URL;
use crate::connectors::websocket::{DEFAULT_NAMESPACE, DEFAULT_WS_URL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Event names and payload key used on the wire.
///
/// The remote protocol is undocumented; the names are configuration rather
/// than constants so they can follow the server without a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSchema {
    pub subscribe_event: String,
    pub unsubscribe_event: String,
    /// Extra event names the subscribe payload is also sent under.
    pub fallback_subscribe_events: Vec<String>,
    /// Key of the topic list inside subscribe/unsubscribe payloads.
    pub topic_key: String,
    pub positions_subscribe_event: String,
    pub positions_unsubscribe_event: String,
    pub authenticate_event: String,
    pub probe_events: Vec<String>,
}

impl Default for WireSchema {
    fn default() -> Self {
        Self {
            subscribe_event: "subscribe_market_prices".to_string(),
            unsubscribe_event: "unsubscribe_market_prices".to_string(),
            fallback_subscribe_events: Vec::new(),
            topic_key: "marketAddresses".to_string(),
            positions_subscribe_event: "subscribe_positions".to_string(),
            positions_unsubscribe_event: "unsubscribe_positions".to_string(),
            authenticate_event: "authenticate".to_string(),
            probe_events: vec!["request_market_snapshot".to_string()],
        }
    }
}

/// Connect/reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPolicy {
    /// How long to wait for the connection acknowledgement per attempt.
    pub timeout: Duration,
    /// Attempts per `connect()` call.
    pub max_retries: u32,
    /// First backoff delay; doubles after each failed attempt.
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Reconnect automatically after the connection drops.
    pub auto_reconnect: bool,
    /// Attempts per automatic reconnect cycle. `None` retries forever.
    pub reconnect_attempts: Option<u32>,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            auto_reconnect: true,
            reconnect_attempts: None,
        }
    }
}

/// Where the desired topic list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    File(PathBuf),
    Discovery {
        api_url: String,
        category: Option<String>,
    },
}

/// Complete feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub ws_url: String,
    pub namespace: String,
    pub origin: String,
    pub connect: ConnectPolicy,
    pub wire: WireSchema,
    pub source: SourceConfig,
    pub refresh_interval: Duration,
    pub warn_after: Duration,
    pub liveness_poll: Duration,
    /// `None` disables the snapshot probe.
    pub probe_interval: Option<Duration>,
    /// Events buffered per consumer before the oldest are dropped.
    pub event_buffer: usize,
    pub command_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            origin: "https://limitless.exchange".to_string(),
            connect: ConnectPolicy::default(),
            wire: WireSchema::default(),
            source: SourceConfig::Discovery {
                api_url: DEFAULT_API_URL.to_string(),
                category: Some("Hourly".to_string()),
            },
            refresh_interval: Duration::from_secs(300),
            warn_after: Duration::from_secs(300),
            liveness_poll: Duration::from_secs(30),
            probe_interval: Some(Duration::from_secs(60)),
            event_buffer: 1024,
            command_buffer: 256,
        }
    }
}

impl FeedConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Self::default();

        let connect = ConnectPolicy {
            timeout: env.secs("LIMITLESS_CONNECT_TIMEOUT_SECS", defaults.connect.timeout)?,
            max_retries: env.number("LIMITLESS_CONNECT_RETRIES", defaults.connect.max_retries)?.max(1),
            backoff_base: env.nonzero(
                "LIMITLESS_BACKOFF_BASE_MS",
                env.millis("LIMITLESS_BACKOFF_BASE_MS", defaults.connect.backoff_base)?,
            )?,
            backoff_max: env.nonzero(
                "LIMITLESS_BACKOFF_MAX_SECS",
                env.secs("LIMITLESS_BACKOFF_MAX_SECS", defaults.connect.backoff_max)?,
            )?,
            auto_reconnect: env.flag("LIMITLESS_AUTO_RECONNECT", defaults.connect.auto_reconnect)?,
            reconnect_attempts: match env.number("LIMITLESS_RECONNECT_ATTEMPTS", 0u32)? {
                0 => None,
                n => Some(n),
            },
        };

        let wire = WireSchema {
            subscribe_event: env.string("LIMITLESS_SUBSCRIBE_EVENT", &defaults.wire.subscribe_event),
            unsubscribe_event: env.string("LIMITLESS_UNSUBSCRIBE_EVENT", &defaults.wire.unsubscribe_event),
            fallback_subscribe_events: env
                .list("LIMITLESS_SUBSCRIBE_FALLBACKS")
                .unwrap_or(defaults.wire.fallback_subscribe_events),
            topic_key: env.string("LIMITLESS_TOPIC_KEY", &defaults.wire.topic_key),
            probe_events: env
                .list("LIMITLESS_PROBE_EVENTS")
                .unwrap_or(defaults.wire.probe_events),
            ..defaults.wire
        };

        let source = match env.get("LIMITLESS_TOPIC_FILE") {
            Some(path) => SourceConfig::File(PathBuf::from(path)),
            None => SourceConfig::Discovery {
                api_url: env.string("LIMITLESS_API_URL", DEFAULT_API_URL),
                category: match env.get("LIMITLESS_CATEGORY") {
                    Some(c) if c.eq_ignore_ascii_case("all") => None,
                    Some(c) => Some(c),
                    None => Some("Hourly".to_string()),
                },
            },
        };

        let probe_secs = env.number(
            "LIMITLESS_PROBE_SECS",
            defaults.probe_interval.map(|d| d.as_secs()).unwrap_or(0),
        )?;

        Ok(Self {
            ws_url: env.string("LIMITLESS_WS_URL", &defaults.ws_url),
            namespace: env.string("LIMITLESS_NAMESPACE", &defaults.namespace),
            origin: env.string("LIMITLESS_ORIGIN", &defaults.origin),
            connect,
            wire,
            source,
            refresh_interval: env.secs("LIMITLESS_REFRESH_SECS", defaults.refresh_interval)?,
            warn_after: env.secs("LIMITLESS_WARN_AFTER_SECS", defaults.warn_after)?,
            liveness_poll: env.secs("LIMITLESS_LIVENESS_POLL_SECS", defaults.liveness_poll)?,
            probe_interval: (probe_secs > 0).then(|| Duration::from_secs(probe_secs)),
            event_buffer: env.number("LIMITLESS_EVENT_BUFFER", defaults.event_buffer)?.max(1),
            command_buffer: defaults.command_buffer,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn list(&self, var: &str) -> Option<Vec<String>> {
        self.get(var).map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }

    fn number<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn secs(&self, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.number(var, default.as_secs()).map(Duration::from_secs)
    }

    fn millis(&self, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.number(var, default.as_millis() as u64).map(Duration::from_millis)
    }

    /// A zero backoff would turn reconnecting into a busy loop.
    fn nonzero(&self, var: &'static str, duration: Duration) -> Result<Duration, ConfigError> {
        if !duration.is_zero() {
            return Ok(duration);
        }
        Err(ConfigError::Invalid {
            var,
            value: self.get(var).unwrap_or_default(),
            reason: "must be greater than zero".to_string(),
        })
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(var).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(value) => Err(ConfigError::Invalid {
                var,
                value,
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}
