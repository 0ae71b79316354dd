//! Shared cache of node results with per-node key and TTL policies

use crate::engine::context::{Subject, TradeParameters};
use crate::engine::graph::NodeId;
use crate::nodes::output::{NodeOutput, SubjectProfile};
use cached::{Cached, SizedCache};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Cache key: node namespace plus a node-specific discriminator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub node: NodeId,
    pub discriminator: String,
}

impl CacheKey {
    pub fn new(node: NodeId, discriminator: impl Into<String>) -> Self {
        Self {
            node,
            discriminator: discriminator.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.discriminator)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: NodeOutput,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe, bounded store of node outputs
///
/// Expiry is checked on read: an expired entry is removed and reported as
/// absent. Concurrent writers to one key are last-write-wins.
pub struct ResultCache {
    cache: Arc<RwLock<SizedCache<CacheKey, CacheEntry>>>,
    writes: Arc<AtomicU64>,
}

impl ResultCache {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(RwLock::new(SizedCache::with_size(capacity.max(1)))),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a live value from the cache
    pub async fn get(&self, key: &CacheKey) -> Option<NodeOutput> {
        let mut cache = self.cache.write().await;
        let now = Instant::now();
        let (expired, value) = cache
            .cache_get(key)
            .map(|entry| (entry.is_expired_at(now), entry.value.clone()))?;

        if expired {
            let _ = cache.cache_remove(key);
            tracing::debug!(key = %key, "Evicted expired cache entry");
            return None;
        }

        Some(value)
    }

    /// Insert a value that expires after `ttl`
    pub async fn put(&self, key: CacheKey, value: NodeOutput, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Invalidate a specific cache entry
    pub async fn invalidate(&self, key: &CacheKey) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(key);
    }

    /// Clear all cached entries
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    /// Number of stored entries, expired ones included until read
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of `put` calls since creation
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Clone for ResultCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            writes: Arc::clone(&self.writes),
        }
    }
}

/// Everything a key function may look at
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyInput<'a> {
    pub subject: &'a Subject,
    pub parameters: &'a TradeParameters,
    pub profile: Option<&'a SubjectProfile>,
    pub now: DateTime<Utc>,
}

/// Computes the discriminator part of a [`CacheKey`]
pub type KeyFn = fn(&CacheKeyInput<'_>) -> String;

/// Key function and TTL for one node
#[derive(Clone, Copy)]
pub struct CachePolicy {
    pub key_fn: KeyFn,
    pub ttl: Duration,
}

impl CachePolicy {
    pub fn new(key_fn: KeyFn, ttl: Duration) -> Self {
        Self { key_fn, ttl }
    }
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

/// Stock key functions
///
/// A key must cover every input the node's prompt reads: the subject when the
/// prompt names the company, the trade parameters, and the calendar day the
/// prompt is dated with.
pub mod keys {
    use super::CacheKeyInput;

    /// Days before earnings during which fundamentals are keyed separately
    pub const EARNINGS_WINDOW_DAYS: i64 = 7;

    fn trade(input: &CacheKeyInput<'_>) -> String {
        format!(
            "{}:{}",
            input.parameters.direction.as_str(),
            input.parameters.duration.as_str()
        )
    }

    /// One entry per subject, independent of the trade
    pub fn subject(input: &CacheKeyInput<'_>) -> String {
        input.subject.to_string()
    }

    /// One entry per subject, trade and calendar day
    pub fn subject_trade_daily(input: &CacheKeyInput<'_>) -> String {
        format!("{}:{}:{}", input.subject, trade(input), input.now.format("%Y-%m-%d"))
    }

    /// One entry per subject, trade and clock hour
    pub fn subject_trade_hourly(input: &CacheKeyInput<'_>) -> String {
        format!("{}:{}:{}", input.subject, trade(input), input.now.format("%Y-%m-%d-%H"))
    }

    /// One entry per trade and calendar day, shared by all subjects
    pub fn trade_daily(input: &CacheKeyInput<'_>) -> String {
        format!("{}:{}", trade(input), input.now.format("%Y-%m-%d"))
    }

    /// Like [`subject_trade_daily`], with separate entries while earnings are imminent
    pub fn subject_trade_earnings_window(input: &CacheKeyInput<'_>) -> String {
        let imminent = input
            .profile
            .is_some_and(|profile| profile.earnings_within(input.now.date_naive(), EARNINGS_WINDOW_DAYS));
        let window = if imminent { "earnings_imminent" } else { "normal" };
        format!("{}:{window}", subject_trade_daily(input))
    }
}

/// Per-node cache policies; nodes without an entry are never cached
#[derive(Debug, Clone)]
pub struct CachePolicyTable {
    policies: HashMap<NodeId, CachePolicy>,
}

impl CachePolicyTable {
    /// Table without any cached node
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Default policies
    pub fn standard() -> Self {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;

        Self::empty()
            .with(NodeId::Fundamental, keys::subject_trade_earnings_window, Duration::from_secs(HOUR))
            .with(NodeId::Technical, keys::subject_trade_hourly, Duration::from_secs(30 * MINUTE))
            .with(NodeId::Macro, keys::trade_daily, Duration::from_secs(2 * HOUR))
            .with(NodeId::Industry, keys::subject_trade_daily, Duration::from_secs(HOUR))
            .with(NodeId::Peer, keys::subject_trade_daily, Duration::from_secs(HOUR))
            .with(NodeId::Headline, keys::subject_trade_hourly, Duration::from_secs(5 * MINUTE))
            .with(NodeId::Filings, keys::subject_trade_daily, Duration::from_secs(24 * HOUR))
            .with(NodeId::Ingestion, keys::subject, Duration::from_secs(24 * HOUR))
    }

    /// Set the policy for `node`
    pub fn with(mut self, node: NodeId, key_fn: KeyFn, ttl: Duration) -> Self {
        self.policies.insert(node, CachePolicy::new(key_fn, ttl));
        self
    }

    /// Stop caching `node`
    pub fn without(mut self, node: NodeId) -> Self {
        self.policies.remove(&node);
        self
    }

    pub fn get(&self, node: NodeId) -> Option<&CachePolicy> {
        self.policies.get(&node)
    }

    /// Key and TTL for `node`, `None` when the node is not cached
    pub fn key_for(&self, node: NodeId, input: &CacheKeyInput<'_>) -> Option<(CacheKey, Duration)> {
        self.policies
            .get(&node)
            .map(|policy| (CacheKey::new(node, (policy.key_fn)(input)), policy.ttl))
    }
}

impl Default for CachePolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{TradeDirection, TradeDuration};
    use crate::nodes::output::IngestionSummary;
    use chrono::{NaiveDate, TimeZone};

    fn value(documents: usize) -> NodeOutput {
        NodeOutput::Ingestion(IngestionSummary {
            documents,
            chunks: documents * 10,
            newly_ingested: false,
        })
    }

    fn key(subject: &str) -> CacheKey {
        CacheKey::new(NodeId::Ingestion, subject)
    }

    #[tokio::test]
    async fn test_cache_insert_and_get() {
        let cache = ResultCache::new(16);
        cache.put(key("AAPL"), value(3), Duration::from_secs(60)).await;

        assert_eq!(cache.get(&key("AAPL")).await, Some(value(3)));
        assert_eq!(cache.get(&key("MSFT")).await, None);
        assert_eq!(cache.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_immediately_absent() {
        let cache = ResultCache::new(16);
        cache.put(key("AAPL"), value(1), Duration::ZERO).await;

        assert_eq!(cache.get(&key("AAPL")).await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = ResultCache::new(16);
        cache.put(key("AAPL"), value(1), Duration::from_secs(30)).await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get(&key("AAPL")).await, Some(value(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key("AAPL")).await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_overwritten_on_put() {
        let cache = ResultCache::new(16);
        cache.put(key("AAPL"), value(1), Duration::from_secs(1)).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        cache.put(key("AAPL"), value(2), Duration::from_secs(60)).await;
        assert_eq!(cache.get(&key("AAPL")).await, Some(value(2)));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = ResultCache::new(16);
        let writers = (1..=4).map(|n| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.put(key("AAPL"), value(n), Duration::from_secs(60)).await })
        });
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.writes(), 4);
        assert!(matches!(cache.get(&key("AAPL")).await, Some(NodeOutput::Ingestion(_))));
    }

    #[tokio::test]
    async fn test_capacity_bounds_entries() {
        let cache = ResultCache::new(2);
        for subject in ["AAPL", "MSFT", "NVDA"] {
            cache.put(key(subject), value(1), Duration::from_secs(60)).await;
        }
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&key("AAPL")).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = ResultCache::new(16);
        cache.put(key("AAPL"), value(1), Duration::from_secs(60)).await;
        cache.put(key("MSFT"), value(1), Duration::from_secs(60)).await;

        cache.invalidate(&key("AAPL")).await;
        assert_eq!(cache.get(&key("AAPL")).await, None);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_key_functions() {
        let subject = Subject::new("AAPL");
        let parameters = TradeParameters::new(TradeDirection::Short, TradeDuration::Day);
        let mut profile = SubjectProfile::new("AAPL");
        profile.next_earnings = NaiveDate::from_ymd_opt(2026, 10, 20);
        let input = CacheKeyInput {
            subject: &subject,
            parameters: &parameters,
            profile: Some(&profile),
            now: Utc.with_ymd_and_hms(2026, 10, 18, 14, 5, 0).unwrap(),
        };

        assert_eq!(keys::subject(&input), "AAPL");
        assert_eq!(keys::subject_trade_daily(&input), "AAPL:short:day:2026-10-18");
        assert_eq!(keys::subject_trade_hourly(&input), "AAPL:short:day:2026-10-18-14");
        assert_eq!(keys::trade_daily(&input), "short:day:2026-10-18");
        assert_eq!(
            keys::subject_trade_earnings_window(&input),
            "AAPL:short:day:2026-10-18:earnings_imminent"
        );

        let no_profile = CacheKeyInput { profile: None, ..input };
        assert_eq!(keys::subject_trade_earnings_window(&no_profile), "AAPL:short:day:2026-10-18:normal");
    }

    #[test]
    fn test_policy_table() {
        let table = CachePolicyTable::standard();
        let subject = Subject::new("MSFT");
        let parameters = TradeParameters::default();
        let input = CacheKeyInput {
            subject: &subject,
            parameters: &parameters,
            profile: None,
            now: Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap(),
        };

        let (key, ttl) = table.key_for(NodeId::Peer, &input).unwrap();
        assert_eq!(key.to_string(), "peer:MSFT:long:swing:2026-10-18");
        assert_eq!(ttl, Duration::from_secs(3600));

        let (key, _) = table.key_for(NodeId::Macro, &input).unwrap();
        assert_eq!(key.to_string(), "macro:long:swing:2026-10-18");
        let (key, _) = table.key_for(NodeId::Ingestion, &input).unwrap();
        assert_eq!(key.to_string(), "ingestion:MSFT");

        for uncached in [NodeId::Validation, NodeId::Synthesis, NodeId::Critique] {
            assert!(table.key_for(uncached, &input).is_none());
        }
        assert!(table.without(NodeId::Peer).get(NodeId::Peer).is_none());
    }
}
