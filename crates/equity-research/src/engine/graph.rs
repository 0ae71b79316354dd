//! Static dependency graph over research nodes
//!
//! The graph is validated once, at construction: it must be acyclic, free of
//! redundant edges, gated by a single entry node and closed by exactly one
//! `synthesis -> critique` pair.

use crate::error::GraphConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Identity of a research node, also its cache namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    /// Entry gate checking the subject exists
    Validation,
    /// Loads regulatory filings into the document store
    Ingestion,
    /// Analysis of ingested filings
    Filings,
    /// Valuation and financial health
    Fundamental,
    /// Price action and indicators
    Technical,
    /// Economy and monetary policy
    Macro,
    /// Sector trends
    Industry,
    /// Relative standing against competitors
    Peer,
    /// Recent news flow
    Headline,
    /// Combines all analyses into one thesis
    Synthesis,
    /// Reviews the thesis for compliance
    Critique,
}

impl NodeId {
    /// Every node identity
    pub const ALL: [Self; 11] = [
        Self::Validation,
        Self::Ingestion,
        Self::Filings,
        Self::Fundamental,
        Self::Technical,
        Self::Macro,
        Self::Industry,
        Self::Peer,
        Self::Headline,
        Self::Synthesis,
        Self::Critique,
    ];

    /// Nodes whose outputs feed the synthesis
    pub const ANALYSES: [Self; 7] = [
        Self::Fundamental,
        Self::Technical,
        Self::Macro,
        Self::Industry,
        Self::Peer,
        Self::Headline,
        Self::Filings,
    ];

    /// Stable snake_case name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Ingestion => "ingestion",
            Self::Filings => "filings",
            Self::Fundamental => "fundamental",
            Self::Technical => "technical",
            Self::Macro => "macro",
            Self::Industry => "industry",
            Self::Peer => "peer",
            Self::Headline => "headline",
            Self::Synthesis => "synthesis",
            Self::Critique => "critique",
        }
    }

    /// Whether the node produces an analysis consumed by synthesis
    pub fn is_analysis(self) -> bool {
        Self::ANALYSES.contains(&self)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, immutable dependency graph
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeSet<NodeId>,
    prerequisites: BTreeMap<NodeId, BTreeSet<NodeId>>,
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
    entry_gate: NodeId,
    synthesis: NodeId,
    critique: NodeId,
}

impl DependencyGraph {
    /// Create a graph builder
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::default()
    }

    /// The fixed research shape
    ///
    /// `validation` gates the six independent analyses, `ingestion` feeds
    /// `filings`, every analysis feeds `synthesis`, and `critique` reviews the
    /// synthesis.
    pub fn standard() -> Result<Self, GraphConfigurationError> {
        let mut builder = Self::builder()
            .nodes(NodeId::ALL)
            .entry_gate(NodeId::Validation)
            .terminal(NodeId::Synthesis, NodeId::Critique)
            .edge(NodeId::Ingestion, NodeId::Filings);

        for analysis in NodeId::ANALYSES {
            if analysis != NodeId::Filings {
                builder = builder.edge(NodeId::Validation, analysis);
            }
            builder = builder.edge(analysis, NodeId::Synthesis);
        }

        builder.edge(NodeId::Synthesis, NodeId::Critique).build()
    }

    /// All nodes in the graph
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    /// Whether the node is part of the graph
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Nodes without prerequisites
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .copied()
            .filter(|node| self.prerequisites(*node).is_empty())
            .collect()
    }

    /// Prerequisites of `node`, empty when it has none
    pub fn prerequisites(&self, node: NodeId) -> &BTreeSet<NodeId> {
        static EMPTY: BTreeSet<NodeId> = BTreeSet::new();
        self.prerequisites.get(&node).unwrap_or(&EMPTY)
    }

    /// Direct dependents of `node`
    pub fn dependents(&self, node: NodeId) -> &BTreeSet<NodeId> {
        static EMPTY: BTreeSet<NodeId> = BTreeSet::new();
        self.dependents.get(&node).unwrap_or(&EMPTY)
    }

    /// The validation gate
    pub fn entry_gate(&self) -> NodeId {
        self.entry_gate
    }

    /// The terminal producer
    pub fn synthesis(&self) -> NodeId {
        self.synthesis
    }

    /// The terminal critic
    pub fn critique(&self) -> NodeId {
        self.critique
    }

    /// Whether the node is one of the terminal pair
    pub fn is_terminal(&self, node: NodeId) -> bool {
        node == self.synthesis || node == self.critique
    }

    /// Nodes scheduled by the fan-out phase, excluding the gate and terminal pair
    pub fn fan_out_nodes(&self) -> BTreeSet<NodeId> {
        self.nodes
            .iter()
            .copied()
            .filter(|node| *node != self.entry_gate && !self.is_terminal(*node))
            .collect()
    }

    /// Nodes in a dependency-respecting order
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: BTreeMap<NodeId, usize> = self
            .nodes
            .iter()
            .map(|node| (*node, self.prerequisites(*node).len()))
            .collect();
        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for dependent in self.dependents(node) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        order
    }

    fn reachable(
        dependents: &BTreeMap<NodeId, BTreeSet<NodeId>>,
        from: NodeId,
        to: NodeId,
        skip_edge: Option<(NodeId, NodeId)>,
    ) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();

        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            for next in dependents.get(&node).into_iter().flatten() {
                if skip_edge == Some((node, *next)) {
                    continue;
                }
                stack.push(*next);
            }
        }

        false
    }
}

/// Builder for [`DependencyGraph`]
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    nodes: Vec<NodeId>,
    edges: Vec<(NodeId, NodeId)>,
    entry_gate: Option<NodeId>,
    terminal: Option<(NodeId, NodeId)>,
}

impl DependencyGraphBuilder {
    /// Declare a node
    pub fn node(mut self, node: NodeId) -> Self {
        self.nodes.push(node);
        self
    }

    /// Declare several nodes
    pub fn nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Add a `prerequisite -> dependent` edge
    pub fn edge(mut self, prerequisite: NodeId, dependent: NodeId) -> Self {
        self.edges.push((prerequisite, dependent));
        self
    }

    /// Designate the validation gate
    pub fn entry_gate(mut self, node: NodeId) -> Self {
        self.entry_gate = Some(node);
        self
    }

    /// Designate the terminal synthesis and critique nodes
    pub fn terminal(mut self, synthesis: NodeId, critique: NodeId) -> Self {
        self.terminal = Some((synthesis, critique));
        self
    }

    /// Validate and build the graph
    pub fn build(self) -> Result<DependencyGraph, GraphConfigurationError> {
        let mut nodes = BTreeSet::new();
        for node in &self.nodes {
            if !nodes.insert(*node) {
                return Err(GraphConfigurationError::DuplicateNode(*node));
            }
        }

        let mut prerequisites: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        let mut dependents: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();

        for &(from, to) in &self.edges {
            for endpoint in [from, to] {
                if !nodes.contains(&endpoint) {
                    return Err(GraphConfigurationError::UndeclaredNode(endpoint));
                }
            }
            if from == to || DependencyGraph::reachable(&dependents, to, from, None) {
                return Err(GraphConfigurationError::Cycle { from, to });
            }
            if DependencyGraph::reachable(&dependents, from, to, None) {
                return Err(GraphConfigurationError::RedundantEdge { from, to });
            }
            dependents.entry(from).or_default().insert(to);
            prerequisites.entry(to).or_default().insert(from);
        }

        // Insertion order can hide a shortcut added before the longer path.
        for &(from, to) in &self.edges {
            if DependencyGraph::reachable(&dependents, from, to, Some((from, to))) {
                return Err(GraphConfigurationError::RedundantEdge { from, to });
            }
        }

        let entry_gate = self
            .entry_gate
            .ok_or_else(|| GraphConfigurationError::EntryGate("no entry gate declared".to_string()))?;
        if !nodes.contains(&entry_gate) {
            return Err(GraphConfigurationError::UndeclaredNode(entry_gate));
        }
        if prerequisites.get(&entry_gate).is_some_and(|p| !p.is_empty()) {
            return Err(GraphConfigurationError::EntryGate(format!(
                "'{entry_gate}' must not have prerequisites"
            )));
        }

        let (synthesis, critique) = self.terminal.ok_or_else(|| {
            GraphConfigurationError::TerminalStage("no synthesis/critique pair declared".to_string())
        })?;
        for node in [synthesis, critique] {
            if !nodes.contains(&node) {
                return Err(GraphConfigurationError::UndeclaredNode(node));
            }
        }
        let critique_prerequisites = prerequisites.get(&critique).cloned().unwrap_or_default();
        if critique_prerequisites != BTreeSet::from([synthesis]) {
            return Err(GraphConfigurationError::TerminalStage(format!(
                "'{critique}' must depend on '{synthesis}' alone"
            )));
        }
        if dependents.get(&synthesis).cloned().unwrap_or_default() != BTreeSet::from([critique]) {
            return Err(GraphConfigurationError::TerminalStage(format!(
                "'{synthesis}' must feed '{critique}' alone"
            )));
        }
        if let Some(sink) = nodes
            .iter()
            .find(|node| **node != critique && dependents.get(node).is_none_or(BTreeSet::is_empty))
        {
            return Err(GraphConfigurationError::TerminalStage(format!(
                "'{sink}' has no dependents; only '{critique}' may end the graph"
            )));
        }

        Ok(DependencyGraph {
            nodes,
            prerequisites,
            dependents,
            entry_gate,
            synthesis,
            critique,
        })
    }
}
