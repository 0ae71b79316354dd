//! Equity research orchestration
//!
//! This crate runs a fixed dependency graph of research nodes for one stock
//! and turns their independent analyses into a single reviewed thesis:
//!
//! - Subject validation gates every request; an unknown symbol aborts before
//!   any analysis runs
//! - Fundamental, technical, macro, industry, peer, headline and SEC filings
//!   analyses run concurrently once their prerequisites finish
//! - A failing node degrades to an `unavailable` output instead of failing
//!   the request
//! - Node outputs are cached per node with their own key and TTL
//! - A synthesis/critique loop revises the thesis up to three times
//! - Per-node latency and token usage are reported with the result
//!
//! # Architecture
//!
//! The [`ResearchEngine`] owns a validated [`DependencyGraph`], one
//! [`ResearchNode`] body per graph node and a shared [`ResultCache`]. Each
//! request gets its own [`RequestContext`]; node bodies only see owned
//! snapshots of their prerequisites' outputs.
//!
//! # Example
//!
//! ```rust,ignore
//! use equity_research::{Collaborators, ResearchConfig, ResearchEngine, ResearchRequest};
//! use equity_research::{TradeDirection, TradeDuration};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ResearchEngine::builder()
//!         .config(ResearchConfig::from_env()?)
//!         .with_standard_nodes(collaborators)
//!         .build()?;
//!
//!     let report = engine
//!         .research(ResearchRequest::new("AAPL", TradeDirection::Long, TradeDuration::Swing))
//!         .await?;
//!     println!("{}", report.final_output.text);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod nodes;
pub mod prompts;
pub mod retry;
pub mod sources;

// Re-export main types for convenience
pub use cache::{CacheKey, CachePolicy, CachePolicyTable, ResultCache};
pub use config::{ResearchConfig, TokenPreset};
pub use engine::{
    Approval, Collaborators, DependencyGraph, FinalThesis, NodeId, RequestContext, RequestStatus, ResearchEngine,
    ResearchReport, ResearchRequest, Subject, TradeDirection, TradeDuration, TradeParameters,
};
pub use error::{CollaboratorError, GraphConfigurationError, ResearchError, Result, TransientTaskError};
pub use metrics::{MetricsReport, MetricsSummary, NodeMetrics};
pub use nodes::output::NodeOutput;
pub use nodes::{NodeInput, NodeRun, ResearchNode};
pub use retry::RetryPolicy;
pub use sources::{DataSource, DocumentStore, FetchQuery, SubjectValidator};
