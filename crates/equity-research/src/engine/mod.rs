//! Research orchestration engine
//!
//! Core coordination layer: the dependency graph, the per-request context,
//! the scheduler that drives the graph, and the revision loop over the
//! terminal synthesis/critique pair.

pub mod context;
pub mod graph;
pub mod research_engine;
pub mod result;
pub mod revision;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{RequestContext, RequestStatus, Subject, TradeDirection, TradeDuration, TradeParameters};
pub use graph::{DependencyGraph, DependencyGraphBuilder, NodeId};
pub use research_engine::{Collaborators, ResearchEngine, ResearchEngineBuilder, ResearchRequest};
pub use result::ResearchReport;
pub use revision::{Approval, FinalThesis, MAX_REVISIONS, RevisionController};
pub use scheduler::Scheduler;
