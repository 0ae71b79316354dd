//! Finnhub news source for company, industry and peer coverage

use super::{DataSource, FetchQuery, NewsArticle, NewsTopic, encode};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, warn};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";
const SOURCE: &str = "finnhub";

/// Peers whose coverage is pulled for a peer query
const MAX_PEERS: usize = 4;

/// Articles kept per query
const MAX_ARTICLES: usize = 20;

/// Finnhub news article
#[derive(Debug, Clone, Deserialize)]
struct FinnhubNewsArticle {
    /// Publish time (UNIX timestamp)
    datetime: i64,
    headline: String,
    /// Related symbols
    #[serde(default)]
    related: String,
    source: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

impl FinnhubNewsArticle {
    fn into_article(self) -> NewsArticle {
        let published = DateTime::from_timestamp(self.datetime, 0)
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        NewsArticle {
            headline: self.headline,
            summary: self.summary,
            source: self.source,
            published,
            url: (!self.url.is_empty()).then_some(self.url),
            related: (!self.related.is_empty()).then_some(self.related),
        }
    }
}

/// News from the Finnhub API
pub struct FinnhubNewsSource {
    client: Client,
    api_key: String,
    rate_limiter: SharedRateLimiter,
}

impl FinnhubNewsSource {
    /// Create a new Finnhub source with rate limiting
    ///
    /// # Arguments
    /// * `api_key` - Finnhub API key
    /// * `rate_limit` - Requests per minute (free tier: 60, premium: 300+)
    pub fn new(api_key: impl Into<String>, rate_limit: u32) -> Self {
        let per_minute = NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN.saturating_add(59));

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    /// Create from the FINNHUB_API_KEY environment variable
    pub fn from_env() -> Option<Self> {
        std::env::var("FINNHUB_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|key| Self::new(key, 60))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T, CollaboratorError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(format!("{FINNHUB_BASE_URL}/{path}"))
            .query(params)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| CollaboratorError::Unreachable {
                source_name: SOURCE.to_string(),
                message: format!("request failed: {e}"),
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(CollaboratorError::RateLimited {
                    source_name: SOURCE.to_string(),
                });
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(CollaboratorError::Unreachable {
                    source_name: SOURCE.to_string(),
                    message: format!("API error {status}: {body}"),
                });
            }
        }

        response.json::<T>().await.map_err(|e| CollaboratorError::Malformed {
            source_name: SOURCE.to_string(),
            message: e.to_string(),
        })
    }

    /// Company news for `symbol` over the last `days` days
    pub async fn company_news(&self, symbol: &str, days: u32) -> Result<Vec<NewsArticle>, CollaboratorError> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(i64::from(days));
        let (from, to) = (from.format("%Y-%m-%d").to_string(), to.format("%Y-%m-%d").to_string());

        let articles: Vec<FinnhubNewsArticle> = self
            .get("company-news", &[("symbol", symbol), ("from", &from), ("to", &to)])
            .await?;

        Ok(articles
            .into_iter()
            .take(MAX_ARTICLES)
            .map(FinnhubNewsArticle::into_article)
            .collect())
    }

    /// General market news published within the last `days` days
    pub async fn market_news(&self, days: u32) -> Result<Vec<NewsArticle>, CollaboratorError> {
        let cutoff = (Utc::now() - ChronoDuration::days(i64::from(days))).timestamp();
        let articles: Vec<FinnhubNewsArticle> = self.get("news", &[("category", "general")]).await?;

        Ok(articles
            .into_iter()
            .filter(|article| article.datetime >= cutoff)
            .take(MAX_ARTICLES)
            .map(FinnhubNewsArticle::into_article)
            .collect())
    }

    /// Symbols Finnhub lists as peers, excluding `symbol` itself
    pub async fn peers(&self, symbol: &str) -> Result<Vec<String>, CollaboratorError> {
        let peers: Vec<String> = self.get("stock/peers", &[("symbol", symbol)]).await?;
        Ok(peers
            .into_iter()
            .filter(|peer| !peer.eq_ignore_ascii_case(symbol))
            .take(MAX_PEERS)
            .collect())
    }

    async fn peer_news(&self, symbol: &str, days: u32) -> Result<Vec<NewsArticle>, CollaboratorError> {
        let peers = self.peers(symbol).await?;
        debug!(symbol, ?peers, "Fetching peer coverage");

        let per_peer = (MAX_ARTICLES / peers.len().max(1)).max(1);
        let mut articles = Vec::new();
        for peer in &peers {
            match self.company_news(peer, days).await {
                Ok(news) => articles.extend(news.into_iter().take(per_peer).map(|mut article| {
                    article.related = Some(peer.clone());
                    article
                })),
                Err(e) => warn!(peer, error = %e, "Skipping peer news"),
            }
        }
        Ok(articles)
    }
}

#[async_trait]
impl DataSource for FinnhubNewsSource {
    async fn fetch(&self, query: &FetchQuery) -> Result<serde_json::Value, CollaboratorError> {
        let FetchQuery::News { symbol, topic, days } = query else {
            return Err(CollaboratorError::Unsupported {
                source_name: SOURCE.to_string(),
                query: query.to_string(),
            });
        };

        let articles = match topic {
            NewsTopic::Company => self.company_news(symbol, *days).await?,
            NewsTopic::Industry => self.market_news(*days).await?,
            NewsTopic::Peers => self.peer_news(symbol, *days).await?,
        };

        if articles.is_empty() {
            return Err(CollaboratorError::NoData {
                source_name: SOURCE.to_string(),
                query: query.to_string(),
            });
        }
        encode(SOURCE, &articles)
    }

    fn name(&self) -> &str {
        SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finnhub_source_creation() {
        let source = FinnhubNewsSource::new("test_key", 60);
        assert_eq!(source.api_key, "test_key");
        assert_eq!(source.name(), "finnhub");
    }

    #[test]
    fn test_article_conversion() {
        let raw: FinnhubNewsArticle = serde_json::from_value(serde_json::json!({
            "category": "company",
            "datetime": 1_760_745_600,
            "headline": "Apple unveils new chips",
            "id": 1,
            "image": "",
            "related": "AAPL",
            "source": "Reuters",
            "summary": "Summary",
            "url": ""
        }))
        .unwrap();

        let article = raw.into_article();
        assert_eq!(article.published, "2025-10-18");
        assert_eq!(article.related.as_deref(), Some("AAPL"));
        assert_eq!(article.url, None);
    }

    #[tokio::test]
    async fn test_rejects_non_news_queries() {
        let source = FinnhubNewsSource::new("test_key", 60);
        let result = source.fetch(&FetchQuery::MacroIndicators).await;
        assert!(matches!(result, Err(CollaboratorError::Unsupported { .. })));
    }
}
