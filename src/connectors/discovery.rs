//! REST market discovery used as a desired-topic source.
//!
//! Pages through the active markets endpoint, optionally keeps only markets
//! tagged with a category (e.g. `Hourly`), and returns their addresses with
//! titles as labels.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::subscriptions::{market_topic, DesiredTopics, SourceError, TopicSource};

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.limitless.exchange";

const PAGE_LIMIT: usize = 25;
const MAX_PAGES: usize = 4;

/// Desired topics discovered from the active markets listing.
#[derive(Clone)]
pub struct DiscoveryTopicSource {
    client: Client,
    api_url: String,
    category: Option<String>,
}

impl DiscoveryTopicSource {
    pub fn new(api_url: impl Into<String>, category: Option<String>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            category,
        })
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<Map<String, Value>>, SourceError> {
        let url = format!("{}/markets/active", self.api_url);
        debug!("Fetching active markets page {}", page);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("page", page.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("sortBy", "newest".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Api { status, message });
        }

        let body: ActiveMarketsPage = response.json().await?;
        Ok(body.data)
    }
}

#[derive(Debug, Deserialize)]
struct ActiveMarketsPage {
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

/// True if the market lists `category` under `categories` or `tags`.
fn has_category(market: &Map<String, Value>, category: &str) -> bool {
    ["categories", "tags"]
        .iter()
        .filter_map(|key| market.get(*key).and_then(Value::as_array))
        .flatten()
        .any(|v| v.as_str().is_some_and(|s| s.eq_ignore_ascii_case(category)))
}

/// Converts one page of markets into topics, applying the category filter.
fn collect_markets(desired: &mut DesiredTopics, markets: &[Map<String, Value>], category: Option<&str>) {
    for market in markets {
        if let Some(category) = category {
            if !has_category(market, category) {
                continue;
            }
        }
        let Some(topic) = market_topic(market) else {
            continue;
        };
        if let Some(title) = market.get("title").and_then(Value::as_str) {
            desired.labels.push((topic.clone(), title.to_string()));
        }
        desired.topics.push(topic);
    }
}

#[async_trait]
impl TopicSource for DiscoveryTopicSource {
    async fn read(&self) -> Result<DesiredTopics, SourceError> {
        let mut desired = DesiredTopics::default();

        for page in 1..=MAX_PAGES {
            let markets = self.fetch_page(page).await?;
            let count = markets.len();
            collect_markets(&mut desired, &markets, self.category.as_deref());
            if count < PAGE_LIMIT {
                break;
            }
        }

        if desired.topics.is_empty() {
            warn!(
                "Discovery returned no markets{}",
                self.category
                    .as_deref()
                    .map(|c| format!(" in category {}", c))
                    .unwrap_or_default()
            );
        }
        Ok(desired)
    }

    fn describe(&self) -> String {
        match &self.category {
            Some(category) => format!("discovery {} [{}]", self.api_url, category),
            None => format!("discovery {}", self.api_url),
        }
    }
}

impl std::fmt::Debug for DiscoveryTopicSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryTopicSource")
            .field("api_url", &self.api_url)
            .field("category", &self.category)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn markets(value: Value) -> Vec<Map<String, Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_category_filter_and_labels() {
        let page = markets(json!([
            {"id": 1, "address": "0xa", "title": "BTC hourly", "categories": ["Hourly", "Crypto"]},
            {"id": 2, "address": "0xb", "title": "Election", "categories": ["Politics"]},
            {"id": 3, "title": "ETH hourly", "tags": ["hourly"]}
        ]));

        let mut desired = DesiredTopics::default();
        collect_markets(&mut desired, &page, Some("Hourly"));
        assert_eq!(desired.topics, vec!["0xa", "3"]);
        assert_eq!(desired.labels[1], ("3".to_string(), "ETH hourly".to_string()));
    }

    #[test]
    fn test_no_category_keeps_everything() {
        let page = markets(json!([{"address": "0xa"}, {"conditionId": "0xc"}, {"slug": "x"}]));
        let mut desired = DesiredTopics::default();
        collect_markets(&mut desired, &page, None);
        assert_eq!(desired.topics, vec!["0xa", "0xc"]);
        assert!(desired.labels.is_empty());
    }

    #[test]
    fn test_page_deserializes_without_data() {
        let page: ActiveMarketsPage = serde_json::from_value(json!({"totalMarketsCount": 0})).unwrap();
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_api_url_is_trimmed() {
        let source = DiscoveryTopicSource::new("https://api.example.com/", None).unwrap();
        assert_eq!(source.describe(), "discovery https://api.example.com");
    }
}
