//! Human-readable titles for topics.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Topic;

/// Shared Topic -> title map.
///
/// Entries are inserted or overwritten, never removed, so events that arrive
/// for a topic after it was unsubscribed still resolve to a title.
#[derive(Clone, Default)]
pub struct TopicLabels {
    inner: Arc<RwLock<HashMap<Topic, String>>>,
}

impl TopicLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the given labels, overwriting existing titles.
    pub fn merge<I>(&self, labels: I)
    where
        I: IntoIterator<Item = (Topic, String)>,
    {
        let mut map = self.inner.write();
        for (topic, label) in labels {
            map.insert(topic, label);
        }
    }

    pub fn get(&self, topic: &str) -> Option<String> {
        self.inner.read().get(topic).cloned()
    }

    /// Returns the title if known, otherwise a shortened topic id.
    pub fn display(&self, topic: &str) -> String {
        self.get(topic).unwrap_or_else(|| short_topic(topic))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

fn short_topic(topic: &str) -> String {
    match topic.char_indices().nth(6) {
        Some((idx, _)) => format!("{}…", &topic[..idx]),
        None => topic.to_string(),
    }
}

impl std::fmt::Debug for TopicLabels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicLabels")
            .field("len", &self.len())
            .finish()
    }
}
