//! Scripted node bodies for engine tests

use super::graph::NodeId;
use super::research_engine::{ResearchEngine, ResearchEngineBuilder};
use crate::error::TransientTaskError;
use crate::nodes::output::{
    Analysis, ComplianceVerdict, Confidence, Draft, IngestionSummary, KeyPoint, NodeOutput, SubjectProfile, Verdict,
};
use crate::nodes::{NodeInput, NodeRun, ResearchNode};
use async_trait::async_trait;
use research_llm::TokenUsage;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const INVALID_SUBJECT: &str = "ZZZZINVALID";

type Script = Box<dyn Fn(&NodeInput) -> Result<NodeOutput, TransientTaskError> + Send + Sync>;

/// Node that answers from a closure and records every input it saw
pub(crate) struct ScriptedNode {
    id: NodeId,
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<NodeInput>>,
}

impl ScriptedNode {
    pub(crate) fn new(
        id: NodeId,
        script: impl Fn(&NodeInput) -> Result<NodeOutput, TransientTaskError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            script: Box::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Default body for `id`: valid gate, bullish analyses, approving critic
    pub(crate) fn standard(id: NodeId) -> Self {
        match id {
            NodeId::Validation => Self::new(id, |input| {
                if input.subject.as_str() == INVALID_SUBJECT {
                    Ok(NodeOutput::Rejected {
                        reason: "not a known listed symbol".to_string(),
                    })
                } else {
                    Ok(NodeOutput::Profile(SubjectProfile::new(input.subject.as_str())))
                }
            }),
            NodeId::Ingestion => Self::new(id, |_| {
                Ok(NodeOutput::Ingestion(IngestionSummary {
                    documents: 2,
                    chunks: 40,
                    newly_ingested: true,
                }))
            }),
            NodeId::Synthesis => Self::new(id, |input| {
                Ok(NodeOutput::Draft(Draft::new(
                    format!("thesis for {} #{}", input.subject, input.attempt),
                    input.attempt,
                )))
            }),
            NodeId::Critique => Self::new(id, |_| Ok(NodeOutput::Verdict(ComplianceVerdict::approve()))),
            analysis => Self::new(analysis, |_| Ok(bullish())),
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn inputs(&self) -> Vec<NodeInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResearchNode for ScriptedNode {
    fn id(&self) -> NodeId {
        self.id
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let output = (self.script)(&input)?;
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 40,
        };
        Ok(NodeRun::new(output).with_generation(usage, "scripted"))
    }
}

pub(crate) fn bullish() -> NodeOutput {
    NodeOutput::Analysis(Analysis {
        verdict: Verdict::Bullish,
        key_points: vec![KeyPoint::new("momentum is improving"), KeyPoint::new("estimates rising")],
        confidence: Confidence::High,
    })
}

/// Standard scripted bodies with some replaced
pub(crate) struct Harness {
    pub nodes: BTreeMap<NodeId, Arc<ScriptedNode>>,
}

impl Harness {
    pub(crate) fn new(overrides: impl IntoIterator<Item = ScriptedNode>) -> Self {
        let mut nodes: BTreeMap<NodeId, Arc<ScriptedNode>> = NodeId::ALL
            .iter()
            .map(|id| (*id, Arc::new(ScriptedNode::standard(*id))))
            .collect();
        for node in overrides {
            nodes.insert(node.id, Arc::new(node));
        }
        Self { nodes }
    }

    pub(crate) fn node(&self, id: NodeId) -> &ScriptedNode {
        &self.nodes[&id]
    }

    /// Builder with every scripted body registered
    pub(crate) fn builder(&self) -> ResearchEngineBuilder {
        self.nodes
            .values()
            .fold(ResearchEngine::builder(), |builder, node| builder.node(Arc::clone(node) as Arc<dyn ResearchNode>))
    }

    pub(crate) fn engine(&self) -> ResearchEngine {
        self.builder().build().unwrap()
    }
}
