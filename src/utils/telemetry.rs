//! Telemetry and structured logging setup.
//!
//! Log lines carry a `[component]` prefix (`[feed]`, `[refresh]`,
//! `[liveness]`, ...) for filtering. Verbosity comes from `RUST_LOG`.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter used when `RUST_LOG` is unset: INFO for everything, DEBUG for this crate.
pub const DEFAULT_FILTER: &str = "info,limitless_feed=debug";

/// Set to `1` or `true` to log JSON lines instead of compact text.
pub const JSON_ENV: &str = "LIMITLESS_LOG_JSON";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initializes compact human-readable logging.
///
/// Example RUST_LOG values:
/// - `info` - All info and above
/// - `limitless_feed=trace,tokio_tungstenite=warn` - keepalives and wire frames
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initializes telemetry with JSON output (for log aggregation).
pub fn init_telemetry_json() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
        .init();
}

/// Picks the output format from `LIMITLESS_LOG_JSON`.
pub fn init_from_env() {
    if json_requested(std::env::var(JSON_ENV).ok().as_deref()) {
        init_telemetry_json();
    } else {
        init_telemetry();
    }
}

fn json_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber can only be installed once per process, so the
    // init functions themselves are not exercised here.

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_json_flag() {
        assert!(json_requested(Some("1")));
        assert!(json_requested(Some(" TRUE ")));
        assert!(!json_requested(Some("0")));
        assert!(!json_requested(None));
    }
}
