//! Per-node execution metrics and their order-independent reduction
//!
//! A [`MetricsSummary`] is a join-semilattice: merging is a keyed union in
//! which a key collision keeps the greater record. Merge order and reduction
//! tree shape therefore never change the result, whichever node finishes first.

use crate::engine::graph::NodeId;
use research_llm::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Add;
use std::time::Duration;

/// Input/output/total token counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenCounts {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

impl From<TokenUsage> for TokenCounts {
    fn from(usage: TokenUsage) -> Self {
        Self::new(usage.input_tokens as u64, usage.output_tokens as u64)
    }
}

impl Add for TokenCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.input + rhs.input, self.output + rhs.output)
    }
}

/// Metrics recorded for one node attempt
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub node: NodeId,
    /// 1-based; greater than one only for revised synthesis and critique runs
    pub attempt: u32,
    pub latency: Duration,
    pub tokens: TokenCounts,
    pub model: Option<String>,
    pub served_from_cache: bool,
}

impl NodeMetrics {
    /// Record for an executed node
    pub fn executed(node: NodeId, attempt: u32, latency: Duration, usage: TokenUsage, model: Option<String>) -> Self {
        Self {
            node,
            attempt,
            latency,
            tokens: usage.into(),
            model,
            served_from_cache: false,
        }
    }

    /// Record for a cache hit; carries no tokens
    pub fn cached(node: NodeId, attempt: u32, latency: Duration) -> Self {
        Self {
            node,
            attempt,
            latency,
            tokens: TokenCounts::default(),
            model: None,
            served_from_cache: true,
        }
    }

    /// Report label: `critique`, `critique_2`, ...
    pub fn label(&self) -> String {
        if self.attempt > 1 {
            format!("{}_{}", self.node, self.attempt)
        } else {
            self.node.to_string()
        }
    }
}

/// Request-level aggregate of node metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSummary {
    records: BTreeMap<(NodeId, u32), NodeMetrics>,
    wall_clock: Duration,
}

impl MetricsSummary {
    /// Summary holding one record
    pub fn single(record: NodeMetrics) -> Self {
        let mut summary = Self::default();
        summary.record(record);
        summary
    }

    /// Merge two summaries; associative, commutative and idempotent
    pub fn merge(mut self, other: Self) -> Self {
        for record in other.records.into_values() {
            self.record(record);
        }
        self.wall_clock = self.wall_clock.max(other.wall_clock);
        self
    }

    /// Reduce any number of summaries
    pub fn reduce(summaries: impl IntoIterator<Item = Self>) -> Self {
        summaries.into_iter().fold(Self::default(), Self::merge)
    }

    /// Merge one record in place
    pub fn record(&mut self, record: NodeMetrics) {
        let key = (record.node, record.attempt);
        match self.records.get(&key) {
            Some(existing) if *existing >= record => {}
            _ => {
                self.records.insert(key, record);
            }
        }
    }

    /// Set the scheduler-measured end-to-end time
    pub fn with_wall_clock(mut self, wall_clock: Duration) -> Self {
        self.wall_clock = self.wall_clock.max(wall_clock);
        self
    }

    pub fn wall_clock(&self) -> Duration {
        self.wall_clock
    }

    pub fn get(&self, node: NodeId, attempt: u32) -> Option<&NodeMetrics> {
        self.records.get(&(node, attempt))
    }

    /// All attempts recorded for `node`
    pub fn for_node(&self, node: NodeId) -> impl Iterator<Item = &NodeMetrics> {
        self.records.range((node, 0)..=(node, u32::MAX)).map(|(_, record)| record)
    }

    pub fn records(&self) -> impl Iterator<Item = &NodeMetrics> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Tokens summed over executed records
    pub fn total_tokens(&self) -> TokenCounts {
        self.records
            .values()
            .filter(|record| !record.served_from_cache)
            .fold(TokenCounts::default(), |acc, record| acc + record.tokens)
    }

    /// Latency summed over all records; compute time, not elapsed time
    pub fn cumulative_latency(&self) -> Duration {
        self.records.values().map(|record| record.latency).sum()
    }

    /// Slowest single record
    pub fn max_latency(&self) -> Duration {
        self.records.values().map(|record| record.latency).max().unwrap_or_default()
    }

    pub fn cache_hits(&self) -> usize {
        self.records.values().filter(|record| record.served_from_cache).count()
    }

    pub fn executed(&self) -> usize {
        self.len() - self.cache_hits()
    }

    /// Serializable response shape
    pub fn report(&self) -> MetricsReport {
        MetricsReport::from(self)
    }
}

/// Per-node entry of a [`MetricsReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    pub latency_ms: f64,
    pub tokens: TokenCounts,
    pub model: Option<String>,
    pub cached: bool,
}

/// Metrics as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub total_latency_ms: f64,
    pub total_tokens: TokenCounts,
    pub cache_hits: usize,
    pub agents: BTreeMap<String, AgentReport>,
}

impl From<&MetricsSummary> for MetricsReport {
    fn from(summary: &MetricsSummary) -> Self {
        let agents = summary
            .records()
            .map(|record| {
                (
                    record.label(),
                    AgentReport {
                        latency_ms: millis(record.latency),
                        tokens: record.tokens,
                        model: record.model.clone(),
                        cached: record.served_from_cache,
                    },
                )
            })
            .collect();

        Self {
            total_latency_ms: millis(summary.wall_clock()),
            total_tokens: summary.total_tokens(),
            cache_hits: summary.cache_hits(),
            agents,
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}
