//! Background loops around the feed manager.
//!
//! Each loop runs as its own task and stops on the shared shutdown signal.

mod liveness;
mod probe;
mod refresh;

pub use liveness::{Liveness, LivenessConfig, LivenessMonitor, LivenessTracker};
pub use probe::ProbeLoop;
pub use refresh::{RefreshConfig, RefreshError, RefreshLoop};
