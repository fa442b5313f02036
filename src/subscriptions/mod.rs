//! Subscription bookkeeping: topics, titles, desired-state sources and
//! reconciliation.

mod labels;
mod reconciler;
mod source;

pub use labels::TopicLabels;
pub use reconciler::{dedup, reconcile, Delta};
pub use source::{DesiredTopics, FileTopicSource, SourceError, TopicSource};

pub(crate) use source::market_topic;

/// Opaque identifier of a subscribable market. Compared by exact string match.
pub type Topic = String;
