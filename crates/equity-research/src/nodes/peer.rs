//! Relative standing against listed peers

use super::generation::Generator;
use super::output::VerdictScale;
use super::{NodeInput, NodeRun, ResearchNode, news};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{AnalysisPrompt, system};
use crate::sources::{DataSource, NewsTopic};
use async_trait::async_trait;
use std::sync::Arc;

/// Peer coverage reaches further back than company headlines
pub const PEER_WINDOW_DAYS: u32 = 60;

pub struct PeerNode {
    news: Arc<dyn DataSource>,
    generator: Generator,
}

impl PeerNode {
    pub fn new(news: Arc<dyn DataSource>, generator: Generator) -> Self {
        Self { news, generator }
    }
}

#[async_trait]
impl ResearchNode for PeerNode {
    fn id(&self) -> NodeId {
        NodeId::Peer
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let articles = news::fetch(self.news.as_ref(), input.subject.as_str(), NewsTopic::Peers, PEER_WINDOW_DAYS).await?;

        let prompt = AnalysisPrompt::new(
            &input,
            VerdictScale::Relative,
            "Recent news about listed peers",
            news::render(&articles),
        )
        .cited()
        .within_days(PEER_WINDOW_DAYS);

        self.generator.analyze(system::PEER, &prompt, VerdictScale::Relative).await
    }
}
