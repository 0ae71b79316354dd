//! Drafts the investment thesis from every analysis

use super::generation::Generator;
use super::output::{Draft, NodeOutput};
use super::{NodeInput, NodeRun, ResearchNode};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{NamedAnalysis, SubjectContext, SynthesisPrompt, system, user};
use async_trait::async_trait;

pub struct SynthesisNode {
    generator: Generator,
}

impl SynthesisNode {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

/// Prompt context from the upstream analyses, in fixed perspective order
fn prompt_context(input: &NodeInput) -> SynthesisPrompt {
    let analyses = NodeId::ANALYSES
        .iter()
        .filter_map(|node| {
            input.upstream.get(node).map(|output| NamedAnalysis {
                name: node.as_str(),
                text: output.render(),
            })
        })
        .collect();

    SynthesisPrompt {
        subject: SubjectContext::from_input(input),
        analyses,
        previous_draft: input.revision.as_ref().map(|note| note.previous_draft.clone()),
        feedback: input.revision.as_ref().map(|note| note.feedback.clone()),
    }
}

#[async_trait]
impl ResearchNode for SynthesisNode {
    fn id(&self) -> NodeId {
        NodeId::Synthesis
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let ctx = prompt_context(&input);
        if ctx.analyses.is_empty() {
            return Err(TransientTaskError::InsufficientData("no analyses to synthesize".to_string()));
        }

        let template = if input.revision.is_some() { user::REVISION } else { user::SYNTHESIS };
        let generation = self
            .generator
            .generate(self.generator.render(system::SYNTHESIS, &ctx)?, self.generator.render(template, &ctx)?)
            .await?;

        let draft = Draft::new(generation.text, input.attempt);
        Ok(NodeRun::new(NodeOutput::Draft(draft)).with_generation(generation.usage, generation.model))
    }
}
