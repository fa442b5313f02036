//! Desired-topic sources.
//!
//! A source returns the full list of topics the feed should be subscribed to,
//! optionally with titles. Accepted document shapes:
//! - `["0x1", "0x2"]`
//! - `{"0x1": "Title", "0x2": "Title"}`
//! - `[{"id": "0x1", "title": "Title"}, ...]`
//! - `{"data": <any of the array forms>}`

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::Topic;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read topic source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse topic source: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Discovery request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Discovery API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Unsupported topic document shape: {0}")]
    Shape(String),
}

/// One read of a desired-topic source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredTopics {
    /// Topics in source order. May contain duplicates.
    pub topics: Vec<Topic>,
    /// Titles supplied alongside the topics.
    pub labels: Vec<(Topic, String)>,
}

impl DesiredTopics {
    pub fn from_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Topic>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            labels: Vec::new(),
        }
    }

    /// Interprets a JSON document in any of the accepted shapes.
    pub fn from_document(doc: Value) -> Result<Self, SourceError> {
        match doc {
            Value::Array(items) => Self::from_array(items),
            Value::Object(map) => {
                if let Some(Value::Array(items)) = map.get("data") {
                    return Self::from_array(items.clone());
                }
                let mut desired = Self::default();
                for (topic, label) in map {
                    if let Some(title) = label.as_str().filter(|s| !s.is_empty()) {
                        desired.labels.push((topic.clone(), title.to_string()));
                    }
                    desired.topics.push(topic);
                }
                Ok(desired)
            }
            other => Err(SourceError::Shape(type_name(&other).to_string())),
        }
    }

    fn from_array(items: Vec<Value>) -> Result<Self, SourceError> {
        let mut desired = Self::default();
        for item in items {
            match item {
                Value::String(topic) => desired.topics.push(topic),
                Value::Object(market) => {
                    let Some(topic) = market_topic(&market) else {
                        debug!("Skipping market entry without an identifier");
                        continue;
                    };
                    if let Some(title) = market.get("title").and_then(Value::as_str) {
                        desired.labels.push((topic.clone(), title.to_string()));
                    }
                    desired.topics.push(topic);
                }
                other => return Err(SourceError::Shape(format!("array of {}", type_name(&other)))),
            }
        }
        Ok(desired)
    }
}

/// Picks the subscribable identifier of a market object.
pub(crate) fn market_topic(market: &serde_json::Map<String, Value>) -> Option<Topic> {
    ["address", "marketAddress", "conditionId", "id"]
        .iter()
        .filter_map(|key| market.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Provider of the desired topic list.
#[async_trait]
pub trait TopicSource: Send + Sync {
    async fn read(&self) -> Result<DesiredTopics, SourceError>;

    /// Short description for log lines.
    fn describe(&self) -> String;
}

/// Reads the desired topics from a JSON file written by a scanner.
#[derive(Debug, Clone)]
pub struct FileTopicSource {
    path: PathBuf,
}

impl FileTopicSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TopicSource for FileTopicSource {
    async fn read(&self) -> Result<DesiredTopics, SourceError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| SourceError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let doc: Value = serde_json::from_slice(&bytes)?;
        DesiredTopics::from_document(doc)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_topic_list() {
        let desired = DesiredTopics::from_document(json!(["0x1", "0x2", "0x1"])).unwrap();
        assert_eq!(desired.topics, vec!["0x1", "0x2", "0x1"]);
        assert!(desired.labels.is_empty());
    }

    #[test]
    fn test_topic_to_label_mapping() {
        let desired = DesiredTopics::from_document(json!({
            "0xb": "SOL above 200?",
            "0xa": "BTC above 100k?",
            "0xc": null
        }))
        .unwrap();
        assert_eq!(desired.topics, vec!["0xb", "0xa", "0xc"]);
        assert_eq!(desired.labels.len(), 2);
        assert_eq!(desired.labels[1], ("0xa".to_string(), "BTC above 100k?".to_string()));
    }

    #[test]
    fn test_market_objects_and_data_wrapper() {
        let desired = DesiredTopics::from_document(json!({
            "data": [
                {"id": 42, "title": "Hourly BTC"},
                {"address": "0xdef", "id": 7, "title": "Hourly ETH"},
                {"slug": "no-identifier"}
            ]
        }))
        .unwrap();
        assert_eq!(desired.topics, vec!["42", "0xdef"]);
        assert_eq!(desired.labels[1].1, "Hourly ETH");
    }

    #[test]
    fn test_scalar_document_is_rejected() {
        assert!(matches!(
            DesiredTopics::from_document(json!(3)),
            Err(SourceError::Shape(_))
        ));
        assert!(matches!(
            DesiredTopics::from_document(json!([1, 2])),
            Err(SourceError::Shape(_))
        ));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileTopicSource::new("/nonexistent/hourly_markets.json");
        assert!(matches!(source.read().await, Err(SourceError::Io { .. })));
    }

    #[tokio::test]
    async fn test_file_source_reads_mapping() {
        let path = std::env::temp_dir().join(format!("limitless-feed-{}.json", std::process::id()));
        tokio::fs::write(&path, br#"{"0x1": "Hourly BTC"}"#).await.unwrap();

        let desired = FileTopicSource::new(&path).read().await.unwrap();
        assert_eq!(desired.topics, vec!["0x1"]);
        assert_eq!(desired.labels, vec![("0x1".to_string(), "Hourly BTC".to_string())]);

        let _ = tokio::fs::remove_file(&path).await;
    }
}
