//! Compliance review of a draft thesis

use super::generation::{Generator, json_payload};
use super::output::{ComplianceVerdict, NodeOutput};
use super::{NodeInput, NodeRun, ResearchNode};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{CritiquePrompt, system, user};
use async_trait::async_trait;
use serde::Deserialize;

const MISSING_FEEDBACK: &str = "The draft does not meet the compliance criteria.";

pub struct CritiqueNode {
    generator: Generator,
}

impl CritiqueNode {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

#[derive(Debug, Deserialize)]
struct RawCompliance {
    compliant: bool,
    #[serde(default)]
    feedback: Option<String>,
}

/// Parse the critic's JSON answer
pub fn parse_compliance(text: &str) -> Result<ComplianceVerdict, TransientTaskError> {
    let raw: RawCompliance = serde_json::from_str(json_payload(text)?)
        .map_err(|e| TransientTaskError::MalformedResponse(format!("invalid compliance JSON: {e}")))?;

    if raw.compliant {
        return Ok(ComplianceVerdict::approve());
    }

    let feedback = raw
        .feedback
        .map(|feedback| feedback.trim().to_string())
        .filter(|feedback| !feedback.is_empty())
        .unwrap_or_else(|| MISSING_FEEDBACK.to_string());
    Ok(ComplianceVerdict::reject(feedback))
}

#[async_trait]
impl ResearchNode for CritiqueNode {
    fn id(&self) -> NodeId {
        NodeId::Critique
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let draft = input
            .candidate
            .as_ref()
            .ok_or(TransientTaskError::MissingInput(NodeId::Synthesis))?;

        let ctx = CritiquePrompt {
            duration: input.parameters.duration.as_str(),
            draft: draft.text.clone(),
        };
        let generation = self
            .generator
            .generate(
                self.generator.render(system::CRITIQUE, &ctx)?,
                self.generator.render(user::CRITIQUE, &ctx)?,
            )
            .await?;

        let verdict = parse_compliance(&generation.text)?;
        Ok(NodeRun::new(NodeOutput::Verdict(verdict)).with_generation(generation.usage, generation.model))
    }
}
