//! Error types for research orchestration
//!
//! Only [`ResearchError`] escapes to callers. [`TransientTaskError`] is
//! absorbed by the scheduler and turned into a degraded node output.

use crate::engine::graph::NodeId;
use research_llm::LLMError;
use std::time::Duration;
use thiserror::Error;

/// Malformed dependency graph, detected at construction time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphConfigurationError {
    /// Node declared more than once
    #[error("node '{0}' is declared more than once")]
    DuplicateNode(NodeId),

    /// Edge endpoint was never declared
    #[error("edge references undeclared node '{0}'")]
    UndeclaredNode(NodeId),

    /// Edge closes a cycle
    #[error("edge {from} -> {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    /// Edge between nodes that are already transitively connected
    #[error("edge {from} -> {to} is redundant, {to} is already reachable from {from}")]
    RedundantEdge { from: NodeId, to: NodeId },

    /// Entry gate missing or gated by another node
    #[error("invalid entry gate: {0}")]
    EntryGate(String),

    /// Terminal synthesis/critique pair is missing or not terminal
    #[error("invalid terminal stage: {0}")]
    TerminalStage(String),

    /// Graph node without a registered task body
    #[error("no task body registered for node '{0}'")]
    MissingNodeBody(NodeId),
}

/// Errors returned to callers of the research engine
#[derive(Debug, Error)]
pub enum ResearchError {
    /// The dependency graph or node registry is malformed
    #[error("Graph configuration error: {0}")]
    Graph(#[from] GraphConfigurationError),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// The subject failed validation; no analysis ran
    #[error("Invalid subject '{subject}': {reason}")]
    Validation { subject: String, reason: String },
}

/// Result type alias for research operations
pub type Result<T> = std::result::Result<T, ResearchError>;

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Network failure or non-success status
    #[error("{source_name} unreachable: {message}")]
    Unreachable { source_name: String, message: String },

    /// Upstream throttled the request
    #[error("{source_name} rate limited the request")]
    RateLimited { source_name: String },

    /// Request succeeded but carried nothing usable
    #[error("{source_name} returned no data for {query}")]
    NoData { source_name: String, query: String },

    /// Response could not be decoded
    #[error("{source_name} returned malformed data: {message}")]
    Malformed { source_name: String, message: String },

    /// Query kind is not served by this collaborator
    #[error("{source_name} does not support {query}")]
    Unsupported { source_name: String, query: String },

    /// No collaborator configured for this capability
    #[error("{0} is not configured")]
    NotConfigured(String),
}

impl CollaboratorError {
    /// Whether a retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::RateLimited { .. })
    }
}

/// Node-local failure, recovered into an `unavailable` output
#[derive(Debug, Error)]
pub enum TransientTaskError {
    /// External data collaborator failed
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Text generation backend failed
    #[error("text generation failed: {0}")]
    Generation(#[from] LLMError),

    /// Model answered, but not in the expected shape
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// Collaborator data was too thin to compute from
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Prompt template failed to render
    #[error("prompt rendering failed: {0}")]
    Prompt(String),

    /// A prerequisite output was missing or of the wrong kind
    #[error("missing upstream output from '{0}'")]
    MissingInput(NodeId),

    /// Node exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Task body panicked
    #[error("task aborted: {0}")]
    Panicked(String),
}

impl From<minijinja::Error> for TransientTaskError {
    fn from(err: minijinja::Error) -> Self {
        Self::Prompt(err.to_string())
    }
}

/// A write-once output slot was written twice
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("output slot for '{0}' is already filled")]
pub struct SlotOccupied(pub NodeId);
