//! Federal Reserve Economic Data (FRED) macro source
//!
//! FRED is a database maintained by the Federal Reserve Bank of St. Louis
//! containing over 800,000 economic time series from numerous sources.
//!
//! API Key: Free registration at https://fred.stlouisfed.org/docs/api/api_key.html
//! Rate Limit: 120 requests per minute

use super::{DataSource, FetchQuery, MacroIndicator, MacroSnapshot, encode};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use futures::future::join_all;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred";
const SOURCE: &str = "fred";

/// FRED series IDs read for the macro snapshot
pub mod series {
    /// Federal Funds Effective Rate
    pub const FED_FUNDS_RATE: &str = "FEDFUNDS";
    /// 10-Year Treasury Constant Maturity Rate
    pub const TREASURY_10Y: &str = "DGS10";
    /// 2-Year Treasury Constant Maturity Rate
    pub const TREASURY_2Y: &str = "DGS2";
    /// 10Y-2Y Treasury Spread (Yield Curve)
    pub const YIELD_SPREAD_10Y_2Y: &str = "T10Y2Y";
    /// Unemployment Rate
    pub const UNEMPLOYMENT_RATE: &str = "UNRATE";
    /// Consumer Price Index (All Urban)
    pub const CPI: &str = "CPIAUCSL";
    /// Core PCE (Fed's preferred inflation measure)
    pub const CORE_PCE: &str = "PCEPILFE";
    /// Real GDP
    pub const GDP: &str = "GDPC1";
    /// Consumer Sentiment (U of Michigan)
    pub const CONSUMER_SENTIMENT: &str = "UMCSENT";
    /// VIX Volatility Index
    pub const VIX: &str = "VIXCLS";

    /// Series in the snapshot with their display labels
    pub const SNAPSHOT: [(&str, &str); 10] = [
        (FED_FUNDS_RATE, "Fed funds rate (%)"),
        (TREASURY_10Y, "10Y Treasury yield (%)"),
        (TREASURY_2Y, "2Y Treasury yield (%)"),
        (YIELD_SPREAD_10Y_2Y, "10Y-2Y spread (pp)"),
        (UNEMPLOYMENT_RATE, "Unemployment rate (%)"),
        (CPI, "CPI index"),
        (CORE_PCE, "Core PCE index"),
        (GDP, "Real GDP (bn chained USD)"),
        (CONSUMER_SENTIMENT, "Consumer sentiment"),
        (VIX, "VIX"),
    ];
}

/// Observation data from FRED series
#[derive(Debug, Clone, Deserialize)]
struct Observation {
    /// Date of observation (YYYY-MM-DD)
    date: String,
    /// Value (can be "." for missing data)
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

/// Macro indicators from FRED
pub struct FredMacroSource {
    client: Client,
    api_key: String,
    rate_limiter: SharedRateLimiter,
}

impl FredMacroSource {
    /// Create a new FRED source
    ///
    /// # Arguments
    /// * `api_key` - FRED API key
    /// * `rate_limit` - Requests per minute (default 120)
    pub fn new(api_key: impl Into<String>, rate_limit: Option<u32>) -> Self {
        let per_minute = rate_limit.and_then(NonZeroU32::new).unwrap_or(NonZeroU32::MIN.saturating_add(119));

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    /// Latest numeric observation of a series, skipping missing values
    pub async fn latest(&self, series_id: &str) -> Result<(String, f64), CollaboratorError> {
        self.rate_limiter.until_ready().await;

        let params = [
            ("series_id", series_id),
            ("api_key", self.api_key.as_str()),
            ("file_type", "json"),
            ("sort_order", "desc"),
            ("limit", "5"),
        ];

        let response = self
            .client
            .get(format!("{FRED_BASE_URL}/series/observations"))
            .query(&params)
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
                return Err(CollaboratorError::Unreachable {
                    source_name: SOURCE.to_string(),
                    message: format!("API error: {status}"),
                });
            }
        }

        let data: ObservationsResponse = response.json().await.map_err(|e| CollaboratorError::Malformed {
            source_name: SOURCE.to_string(),
            message: e.to_string(),
        })?;

        latest_value(&data.observations).ok_or_else(|| CollaboratorError::NoData {
            source_name: SOURCE.to_string(),
            query: series_id.to_string(),
        })
    }

    /// Snapshot of all tracked series; fails only when none could be read
    pub async fn snapshot(&self) -> Result<MacroSnapshot, CollaboratorError> {
        let results = join_all(series::SNAPSHOT.iter().map(|(id, label)| async move {
            (id, label, self.latest(id).await)
        }))
        .await;

        let mut indicators = Vec::with_capacity(results.len());
        let mut last_error = None;
        for (id, label, result) in results {
            match result {
                Ok((date, value)) => indicators.push(MacroIndicator {
                    series_id: (*id).to_string(),
                    label: (*label).to_string(),
                    value,
                    date,
                }),
                Err(e) => {
                    warn!(series = id, error = %e, "Failed to get series from FRED");
                    last_error = Some(e);
                }
            }
        }

        match (indicators.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(MacroSnapshot { indicators }),
        }
    }
}

fn latest_value(observations: &[Observation]) -> Option<(String, f64)> {
    observations
        .iter()
        .find_map(|obs| obs.value.parse::<f64>().ok().map(|value| (obs.date.clone(), value)))
}

#[async_trait]
impl DataSource for FredMacroSource {
    async fn fetch(&self, query: &FetchQuery) -> Result<serde_json::Value, CollaboratorError> {
        match query {
            FetchQuery::MacroIndicators => encode(SOURCE, &self.snapshot().await?),
            other => Err(CollaboratorError::Unsupported {
                source_name: SOURCE.to_string(),
                query: other.to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        SOURCE
    }
}
