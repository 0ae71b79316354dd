//! External collaborators used by node bodies
//!
//! Nodes see only the narrow capabilities defined here. Concrete adapters
//! wrap market data (Yahoo Finance), macro series (FRED), news (Finnhub) and
//! SEC filings (EDGAR).

pub mod documents;
pub mod edgar;
pub mod finnhub;
pub mod fred;
pub mod unconfigured;
pub mod yahoo;

use crate::error::CollaboratorError;
use crate::nodes::output::{IngestionSummary, SubjectProfile};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use documents::InMemoryDocumentStore;
pub use edgar::{EdgarDocumentStore, SecEdgarClient};
pub use finnhub::FinnhubNewsSource;
pub use fred::FredMacroSource;
pub use unconfigured::UnconfiguredSource;
pub use yahoo::{YahooMarketSource, YahooSubjectValidator};

/// Which news a query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsTopic {
    /// Headlines about the company itself
    Company,
    /// Sector and industry coverage
    Industry,
    /// Coverage of competitors
    Peers,
}

/// Structured data request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchQuery {
    /// Daily bars over the last `days` calendar days
    PriceHistory { symbol: String, days: u32 },
    /// Valuation context for the symbol
    Fundamentals { symbol: String },
    /// Latest macroeconomic indicators
    MacroIndicators,
    /// Articles published in the last `days` calendar days
    News { symbol: String, topic: NewsTopic, days: u32 },
}

impl fmt::Display for FetchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriceHistory { symbol, days } => write!(f, "price history of {symbol} ({days}d)"),
            Self::Fundamentals { symbol } => write!(f, "fundamentals of {symbol}"),
            Self::MacroIndicators => f.write_str("macro indicators"),
            Self::News { symbol, topic, days } => write!(f, "{topic:?} news for {symbol} ({days}d)"),
        }
    }
}

/// One daily price bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Valuation context derived from market data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub last_price: f64,
    pub high_52w: f64,
    pub low_52w: f64,
    /// Percent change over the trailing year
    pub change_52w_pct: f64,
    /// Percent change over the trailing quarter
    pub change_90d_pct: Option<f64>,
    pub avg_volume_30d: f64,
    /// Annualised standard deviation of daily returns over 30 sessions, in percent
    pub volatility_30d_pct: Option<f64>,
}

/// Latest value of one macro series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroIndicator {
    pub series_id: String,
    pub label: String,
    pub value: f64,
    pub date: String,
}

/// Set of macro indicators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroSnapshot {
    pub indicators: Vec<MacroIndicator>,
}

impl MacroSnapshot {
    pub fn get(&self, series_id: &str) -> Option<&MacroIndicator> {
        self.indicators.iter().find(|indicator| indicator.series_id == series_id)
    }
}

/// One news article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub headline: String,
    pub summary: String,
    pub source: String,
    /// Publication date, `YYYY-MM-DD`
    pub published: String,
    pub url: Option<String>,
    /// Symbol the article was retrieved for
    pub related: Option<String>,
}

/// Filing passage returned by a document search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentExcerpt {
    pub text: String,
    pub filing_type: String,
    pub section: Option<String>,
    pub filing_date: String,
    /// Higher is more relevant
    pub relevance: f64,
}

/// Decide whether a subject exists and describe it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubjectValidator: Send + Sync {
    /// Whether the identifier names a tradable subject
    async fn is_valid_subject(&self, symbol: &str) -> Result<bool, CollaboratorError>;

    /// Name, industry and calendar details; only called for valid subjects
    async fn describe(&self, symbol: &str) -> Result<SubjectProfile, CollaboratorError>;
}

/// Structured data fetch
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, query: &FetchQuery) -> Result<serde_json::Value, CollaboratorError>;

    /// Source name for logs and errors
    fn name(&self) -> &str;
}

/// Filing ingestion and retrieval
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the subject's filings if not already indexed
    async fn ensure_ingested(&self, symbol: &str) -> Result<IngestionSummary, CollaboratorError>;

    /// Best matching excerpts for `query`, at most `top_k`
    async fn search(&self, symbol: &str, query: &str, top_k: usize)
    -> Result<Vec<DocumentExcerpt>, CollaboratorError>;
}

/// Decode a fetched payload into its typed form
pub fn decode<T: DeserializeOwned>(source_name: &str, value: serde_json::Value) -> Result<T, CollaboratorError> {
    serde_json::from_value(value).map_err(|e| CollaboratorError::Malformed {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })
}

/// Encode a typed payload for the `fetch` boundary
pub fn encode<T: Serialize>(source_name: &str, payload: &T) -> Result<serde_json::Value, CollaboratorError> {
    serde_json::to_value(payload).map_err(|e| CollaboratorError::Malformed {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })
}

/// [`DataSource`] decorator that retries transient failures
pub struct RetryingSource {
    inner: Arc<dyn DataSource>,
    policy: RetryPolicy,
}

impl RetryingSource {
    pub fn new(inner: Arc<dyn DataSource>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl DataSource for RetryingSource {
    async fn fetch(&self, query: &FetchQuery) -> Result<serde_json::Value, CollaboratorError> {
        let operation = format!("{} fetch", self.inner.name());
        self.policy.execute(&operation, || self.inner.fetch(query)).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
