//! Event layer of the feed.
//!
//! Raw inbound payloads are turned into [`NormalizedEvent`]s by the
//! normalizer and published to consumers as [`FeedEvent`]s through a bounded,
//! drop-oldest channel.

mod feed_events;
pub mod normalizer;
mod stream;

pub use feed_events::{ConnectionState, FeedEvent, NormalizedEvent, Operation};
pub use normalizer::normalize;
pub use stream::{EventSender, EventStream};
