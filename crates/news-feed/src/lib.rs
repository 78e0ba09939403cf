//! Crypto news source backed by a CryptoCompare-compatible news endpoint.

use analysis_core::{base_coin_of, AnalysisError, NewsItem, NewsSource};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_NEWS_URL: &str = "https://min-api.cryptocompare.com";

/// Longest article body kept for scoring
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NewsResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    url: String,
    /// Unix seconds
    #[serde(default)]
    published_on: Option<i64>,
    #[serde(default)]
    source: String,
}

impl RawArticle {
    fn into_item(self, symbol: &str) -> NewsItem {
        NewsItem {
            title: self.title.trim().to_string(),
            content: self.body.trim().chars().take(MAX_CONTENT_CHARS).collect(),
            url: self.url,
            published_at: self.published_on.and_then(|s| Utc.timestamp_opt(s, 0).single()),
            source: self.source,
            symbol: symbol.to_string(),
        }
    }
}

/// Parse a news response body into at most `limit` items for `symbol`.
pub fn parse_news(body: &str, symbol: &str, limit: usize) -> Result<Vec<NewsItem>, AnalysisError> {
    let response: NewsResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::InvalidData(format!("news response: {}", e)))?;
    if response.data.is_empty() && !response.message.is_empty() {
        debug!("News endpoint returned no articles for {}: {}", symbol, response.message);
    }
    Ok(response
        .data
        .into_iter()
        .filter(|a| !a.title.trim().is_empty())
        .take(limit)
        .map(|a| a.into_item(symbol))
        .collect())
}

#[derive(Clone)]
pub struct NewsFeedClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl NewsFeedClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }

    /// Latest articles tagged with the symbol's base coin.
    pub async fn fetch_symbol_news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsItem>, AnalysisError> {
        let url = format!("{}/data/v2/news/", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("categories", base_coin_of(symbol)), ("lang", "EN")]);
        if let Some(key) = &self.api_key {
            request = request.header("authorization", format!("Apikey {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AnalysisError::UpstreamUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AnalysisError::UpstreamUnavailable(format!(
                "News API HTTP {} for {}",
                response.status(),
                symbol
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::UpstreamUnavailable(e.to_string()))?;
        parse_news(&body, symbol, limit)
    }
}

#[async_trait]
impl NewsSource for NewsFeedClient {
    async fn fetch_news(
        &self,
        symbols: &[String],
        limit_per_symbol: usize,
    ) -> Result<BTreeMap<String, Vec<NewsItem>>, AnalysisError> {
        let results = join_all(symbols.iter().map(|s| self.fetch_symbol_news(s, limit_per_symbol))).await;
        collect_results(symbols, results)
    }
}

/// Failed symbols map to an empty list; all failing is an upstream error.
fn collect_results(
    symbols: &[String],
    results: Vec<Result<Vec<NewsItem>, AnalysisError>>,
) -> Result<BTreeMap<String, Vec<NewsItem>>, AnalysisError> {
    let mut news = BTreeMap::new();
    let mut last_error = None;
    let mut failures = 0;

    for (symbol, result) in symbols.iter().zip(results) {
        match result {
            Ok(items) => {
                news.insert(symbol.clone(), items);
            }
            Err(e) => {
                warn!("Failed to fetch news for {}: {}", symbol, e);
                failures += 1;
                last_error = Some(e);
                news.insert(symbol.clone(), Vec::new());
            }
        }
    }

    if !symbols.is_empty() && failures == symbols.len() {
        return Err(last_error
            .unwrap_or_else(|| AnalysisError::UpstreamUnavailable("news source unavailable".to_string())));
    }
    Ok(news)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "Type": 100,
        "Message": "News list successfully returned",
        "Data": [
            {"id": "1", "published_on": 1717200000, "title": "Bitcoin ETF sees record inflows", "url": "https://news.example/1", "body": "Spot ETFs took in $1bn.", "source": "coindesk", "categories": "BTC|ETF"},
            {"id": "2", "published_on": 1717100000, "title": "  ", "url": "https://news.example/2", "body": "untitled", "source": "x"},
            {"id": "3", "published_on": 1717000000, "title": "Miners upgrade rigs", "url": "https://news.example/3", "body": "Hashrate climbs.", "source": "theblock"},
            {"id": "4", "title": "Third story", "url": "https://news.example/4", "body": "", "source": "decrypt"}
        ]
    }"#;

    #[test]
    fn test_parse_news_fixture() {
        let items = parse_news(FIXTURE, "BTCUSDT", 3).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Bitcoin ETF sees record inflows");
        assert_eq!(items[0].symbol, "BTCUSDT");
        assert_eq!(items[0].published_at.map(|t| t.timestamp()), Some(1717200000));
        assert_eq!(items[1].title, "Miners upgrade rigs");
        assert!(items[2].published_at.is_none());

        assert_eq!(parse_news(FIXTURE, "BTCUSDT", 1).unwrap().len(), 1);
        assert!(parse_news("<html>", "BTCUSDT", 3).is_err());
    }

    #[test]
    fn test_empty_data_is_not_an_error() {
        let items = parse_news(r#"{"Type": 100, "Message": "No news", "Data": []}"#, "XYZUSDT", 3).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_collect_results_isolates_failures() {
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let news = collect_results(
            &symbols,
            vec![
                Ok(parse_news(FIXTURE, "BTCUSDT", 2).unwrap()),
                Err(AnalysisError::UpstreamUnavailable("timeout".to_string())),
            ],
        )
        .unwrap();
        assert_eq!(news["BTCUSDT"].len(), 2);
        assert!(news["ETHUSDT"].is_empty());

        let err = collect_results(
            &symbols,
            vec![
                Err(AnalysisError::UpstreamUnavailable("a".to_string())),
                Err(AnalysisError::UpstreamUnavailable("b".to_string())),
            ],
        )
        .unwrap_err();
        assert!(err.is_upstream());
    }

    #[test]
    fn test_fetch_news_against_unreachable_host() {
        let client = NewsFeedClient::new("http://127.0.0.1:9", None);
        let result = tokio_test::block_on(client.fetch_news(&["BTCUSDT".to_string()], 3));
        assert!(result.unwrap_err().is_upstream());
    }
}
