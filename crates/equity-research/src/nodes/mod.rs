//! Research node contract and concrete node bodies
//!
//! Every [`NodeId`] maps to one [`ResearchNode`] implementation. Nodes never
//! call each other: they receive owned snapshots of their prerequisites'
//! outputs and return a [`NodeRun`].

pub mod critique;
pub mod filings;
pub mod fundamental;
pub mod generation;
pub mod headline;
pub mod industry;
pub mod ingestion;
pub mod macro_economy;
mod news;
pub mod output;
pub mod peer;
pub mod synthesis;
pub mod technical;
pub mod validation;

use crate::engine::context::{Subject, TradeParameters};
use crate::engine::graph::{DependencyGraph, NodeId};
use crate::error::{GraphConfigurationError, TransientTaskError};
use async_trait::async_trait;
use output::{Draft, NodeOutput, SubjectProfile};
use research_llm::TokenUsage;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

pub use critique::CritiqueNode;
pub use filings::FilingsNode;
pub use fundamental::FundamentalNode;
pub use generation::Generator;
pub use headline::HeadlineNode;
pub use industry::IndustryNode;
pub use ingestion::IngestionNode;
pub use macro_economy::MacroNode;
pub use peer::PeerNode;
pub use synthesis::SynthesisNode;
pub use technical::TechnicalNode;
pub use validation::ValidationNode;

/// Prior draft and the critic's reasons for rejecting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionNote {
    pub previous_draft: String,
    pub feedback: String,
}

/// Everything a node may read
#[derive(Debug, Clone)]
pub struct NodeInput {
    pub request_id: Uuid,
    pub subject: Subject,
    pub parameters: TradeParameters,
    /// Set once validation passed
    pub profile: Option<SubjectProfile>,
    /// Outputs of the node's prerequisites
    pub upstream: BTreeMap<NodeId, NodeOutput>,
    /// 1-based attempt number; above one only inside the revision loop
    pub attempt: u32,
    /// Synthesis only: the rejected draft and its feedback
    pub revision: Option<RevisionNote>,
    /// Critique only: the draft under review
    pub candidate: Option<Draft>,
}

impl NodeInput {
    pub fn new(subject: Subject, parameters: TradeParameters) -> Self {
        Self {
            request_id: Uuid::nil(),
            subject,
            parameters,
            profile: None,
            upstream: BTreeMap::new(),
            attempt: 1,
            revision: None,
            candidate: None,
        }
    }

    /// Output of a prerequisite
    pub fn upstream(&self, node: NodeId) -> Result<&NodeOutput, TransientTaskError> {
        self.upstream.get(&node).ok_or(TransientTaskError::MissingInput(node))
    }

    /// Profile, or a bare one built from the subject
    pub fn profile_or_subject(&self) -> SubjectProfile {
        self.profile
            .clone()
            .unwrap_or_else(|| SubjectProfile::new(self.subject.as_str()))
    }
}

/// Output of one node execution with its generation cost
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRun {
    pub output: NodeOutput,
    pub usage: TokenUsage,
    pub model: Option<String>,
}

impl NodeRun {
    /// Output of a node that did not call a model
    pub fn new(output: NodeOutput) -> Self {
        Self {
            output,
            usage: TokenUsage::default(),
            model: None,
        }
    }

    /// Attach generation cost
    pub fn with_generation(mut self, usage: TokenUsage, model: impl Into<String>) -> Self {
        self.usage = usage;
        self.model = Some(model.into());
        self
    }
}

/// Task body of one graph node
#[async_trait]
pub trait ResearchNode: Send + Sync {
    /// Graph vertex this body serves
    fn id(&self) -> NodeId;

    /// Compute the node output
    ///
    /// Errors are node-local: the scheduler converts them into an
    /// `unavailable` output.
    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError>;
}

/// Node bodies keyed by identity, resolved once at engine construction
#[derive(Default, Clone)]
pub struct NodeRegistry {
    nodes: HashMap<NodeId, Arc<dyn ResearchNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body, replacing any earlier one for the same node
    pub fn register(&mut self, node: Arc<dyn ResearchNode>) {
        self.nodes.insert(node.id(), node);
    }

    pub fn get(&self, node: NodeId) -> Option<Arc<dyn ResearchNode>> {
        self.nodes.get(&node).cloned()
    }

    /// Body for `node`, failing when none is registered
    pub fn require(&self, node: NodeId) -> Result<Arc<dyn ResearchNode>, GraphConfigurationError> {
        self.get(node).ok_or(GraphConfigurationError::MissingNodeBody(node))
    }

    /// Check that every graph node has a body
    pub fn ensure_covers(&self, graph: &DependencyGraph) -> Result<(), GraphConfigurationError> {
        graph.nodes().try_for_each(|node| self.require(node).map(|_| ()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.nodes.keys().collect();
        ids.sort();
        f.debug_struct("NodeRegistry").field("nodes", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(NodeId);

    #[async_trait]
    impl ResearchNode for Constant {
        fn id(&self) -> NodeId {
            self.0
        }

        async fn run(&self, _input: NodeInput) -> Result<NodeRun, TransientTaskError> {
            Ok(NodeRun::new(NodeOutput::unavailable("constant")))
        }
    }

    #[test]
    fn test_registry_must_cover_graph() {
        let graph = DependencyGraph::standard().unwrap();
        let mut registry = NodeRegistry::new();
        for node in NodeId::ALL {
            if node != NodeId::Peer {
                registry.register(Arc::new(Constant(node)));
            }
        }

        assert_eq!(
            registry.ensure_covers(&graph),
            Err(GraphConfigurationError::MissingNodeBody(NodeId::Peer))
        );

        registry.register(Arc::new(Constant(NodeId::Peer)));
        assert!(registry.ensure_covers(&graph).is_ok());
        assert_eq!(registry.len(), NodeId::ALL.len());
    }

    #[test]
    fn test_missing_upstream_is_transient() {
        let input = NodeInput::new(Subject::new("AAPL"), TradeParameters::default());
        assert!(matches!(
            input.upstream(NodeId::Ingestion),
            Err(TransientTaskError::MissingInput(NodeId::Ingestion))
        ));
        assert_eq!(input.profile_or_subject().symbol, "AAPL");
    }
}
