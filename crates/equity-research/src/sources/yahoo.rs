//! Yahoo Finance market data and subject validation

use super::{DataSource, FetchQuery, MarketSnapshot, PriceBar, SubjectValidator, encode};
use crate::error::CollaboratorError;
use crate::nodes::output::SubjectProfile;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use time::OffsetDateTime;
use tracing::debug;
use yahoo_finance_api as yahoo;

const SOURCE: &str = "yahoo";

/// Trading sessions per year, for annualising volatility
const SESSIONS_PER_YEAR: f64 = 252.0;

fn connector() -> Result<yahoo::YahooConnector, CollaboratorError> {
    yahoo::YahooConnector::new().map_err(yahoo_error)
}

fn yahoo_error(e: yahoo::YahooError) -> CollaboratorError {
    CollaboratorError::Unreachable {
        source_name: SOURCE.to_string(),
        message: e.to_string(),
    }
}

/// Latest close of `symbol`
async fn latest_close(symbol: &str) -> Result<f64, CollaboratorError> {
    let response = connector()?.get_latest_quotes(symbol, "1d").await.map_err(yahoo_error)?;
    let quote = response.last_quote().map_err(yahoo_error)?;
    Ok(quote.close)
}

/// Daily bars between now and `days` calendar days ago
pub async fn price_history(symbol: &str, days: u32) -> Result<Vec<PriceBar>, CollaboratorError> {
    let end = Utc::now();
    let start = end - ChronoDuration::days(i64::from(days));

    // Convert chrono DateTime to time OffsetDateTime
    let to_odt = |ts: DateTime<Utc>| {
        OffsetDateTime::from_unix_timestamp(ts.timestamp()).map_err(|e| CollaboratorError::Malformed {
            source_name: SOURCE.to_string(),
            message: format!("invalid timestamp: {e}"),
        })
    };

    let response = connector()?
        .get_quote_history(symbol, to_odt(start)?, to_odt(end)?)
        .await
        .map_err(yahoo_error)?;
    let quotes = response.quotes().map_err(yahoo_error)?;

    let bars: Vec<PriceBar> = quotes
        .iter()
        .filter_map(|q| {
            Some(PriceBar {
                timestamp: DateTime::from_timestamp(q.timestamp as i64, 0)?,
                open: q.open,
                high: q.high,
                low: q.low,
                close: q.close,
                volume: q.volume,
            })
        })
        .collect();

    if bars.is_empty() {
        return Err(CollaboratorError::NoData {
            source_name: SOURCE.to_string(),
            query: format!("price history of {symbol}"),
        });
    }
    Ok(bars)
}

/// Valuation context from one year of daily bars
pub fn market_snapshot(symbol: &str, bars: &[PriceBar]) -> Option<MarketSnapshot> {
    let first = bars.first()?;
    let last = bars.last()?;

    let high_52w = bars.iter().map(|bar| bar.high).fold(f64::MIN, f64::max);
    let low_52w = bars.iter().map(|bar| bar.low).fold(f64::MAX, f64::min);

    let change_90d_pct = bars
        .len()
        .checked_sub(64)
        .and_then(|i| bars.get(i))
        .map(|bar| pct_change(bar.close, last.close));

    let recent = &bars[bars.len().saturating_sub(30)..];
    let avg_volume_30d = recent.iter().map(|bar| bar.volume as f64).sum::<f64>() / recent.len() as f64;

    let returns: Vec<f64> = recent
        .windows(2)
        .filter(|pair| pair[0].close > 0.0)
        .map(|pair| (pair[1].close / pair[0].close).ln())
        .collect();
    let volatility_30d_pct = (returns.len() >= 2).then(|| {
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
        variance.sqrt() * SESSIONS_PER_YEAR.sqrt() * 100.0
    });

    Some(MarketSnapshot {
        symbol: symbol.to_string(),
        last_price: last.close,
        high_52w,
        low_52w,
        change_52w_pct: pct_change(first.close, last.close),
        change_90d_pct,
        avg_volume_30d,
        volatility_30d_pct,
    })
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from == 0.0 { 0.0 } else { (to / from - 1.0) * 100.0 }
}

/// Price history and market-derived fundamentals from Yahoo Finance
#[derive(Debug, Clone, Copy, Default)]
pub struct YahooMarketSource;

impl YahooMarketSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for YahooMarketSource {
    async fn fetch(&self, query: &FetchQuery) -> Result<serde_json::Value, CollaboratorError> {
        match query {
            FetchQuery::PriceHistory { symbol, days } => encode(SOURCE, &price_history(symbol, *days).await?),
            FetchQuery::Fundamentals { symbol } => {
                let bars = price_history(symbol, 365).await?;
                let snapshot = market_snapshot(symbol, &bars).ok_or_else(|| CollaboratorError::NoData {
                    source_name: SOURCE.to_string(),
                    query: query.to_string(),
                })?;
                encode(SOURCE, &snapshot)
            }
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

/// Validates symbols by fetching a quote
#[derive(Debug, Clone, Copy, Default)]
pub struct YahooSubjectValidator;

impl YahooSubjectValidator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SubjectValidator for YahooSubjectValidator {
    async fn is_valid_subject(&self, symbol: &str) -> Result<bool, CollaboratorError> {
        // Unknown symbols surface as fetch errors
        match latest_close(symbol).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!(symbol, error = %e, "Quote lookup failed");
                Ok(false)
            }
        }
    }

    async fn describe(&self, symbol: &str) -> Result<SubjectProfile, CollaboratorError> {
        let mut profile = SubjectProfile::new(symbol);
        profile.last_price = Some(latest_close(symbol).await?);
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| PriceBar {
                timestamp: DateTime::from_timestamp(1_760_000_000 + i as i64 * 86_400, 0).unwrap(),
                open: *close,
                high: close + 1.0,
                low: close - 1.0,
                close: *close,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn test_market_snapshot() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + f64::from(i)).collect();
        let snapshot = market_snapshot("TEST", &bars(&closes)).unwrap();

        assert_eq!(snapshot.last_price, 199.0);
        assert_eq!(snapshot.high_52w, 200.0);
        assert_eq!(snapshot.low_52w, 99.0);
        assert!((snapshot.change_52w_pct - 99.0).abs() < 1e-9);
        assert!(snapshot.change_90d_pct.is_some());
        assert_eq!(snapshot.avg_volume_30d, 1_000.0);
        assert!(snapshot.volatility_30d_pct.unwrap() > 0.0);
    }

    #[test]
    fn test_market_snapshot_short_history() {
        let snapshot = market_snapshot("TEST", &bars(&[10.0])).unwrap();
        assert_eq!(snapshot.change_90d_pct, None);
        assert_eq!(snapshot.volatility_30d_pct, None);
        assert!(market_snapshot("TEST", &[]).is_none());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_validate_symbol() {
        let validator = YahooSubjectValidator::new();
        assert!(validator.is_valid_subject("AAPL").await.unwrap());
        assert!(!validator.is_valid_subject("ZZZZINVALID").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_price_history() {
        let bars = price_history("AAPL", 30).await.unwrap();
        assert!(!bars.is_empty());
    }
}
