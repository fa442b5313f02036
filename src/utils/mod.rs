//! Shared utilities.

mod telemetry;

pub use telemetry::{init_from_env, init_telemetry, init_telemetry_json, DEFAULT_FILTER, JSON_ENV};
