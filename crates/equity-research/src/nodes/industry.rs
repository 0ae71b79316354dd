//! Industry and sector backdrop from recent market news

use super::generation::Generator;
use super::output::VerdictScale;
use super::{NodeInput, NodeRun, ResearchNode, news};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{AnalysisPrompt, system};
use crate::sources::{DataSource, NewsTopic};
use async_trait::async_trait;
use std::sync::Arc;

pub const INDUSTRY_WINDOW_DAYS: u32 = 30;

pub struct IndustryNode {
    news: Arc<dyn DataSource>,
    generator: Generator,
}

impl IndustryNode {
    pub fn new(news: Arc<dyn DataSource>, generator: Generator) -> Self {
        Self { news, generator }
    }
}

#[async_trait]
impl ResearchNode for IndustryNode {
    fn id(&self) -> NodeId {
        NodeId::Industry
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let articles = news::fetch(
            self.news.as_ref(),
            input.subject.as_str(),
            NewsTopic::Industry,
            INDUSTRY_WINDOW_DAYS,
        )
        .await?;

        let prompt = AnalysisPrompt::new(
            &input,
            VerdictScale::Relative,
            "Recent market and sector news",
            news::render(&articles),
        )
        .cited()
        .within_days(INDUSTRY_WINDOW_DAYS);

        self.generator
            .analyze(system::INDUSTRY, &prompt, VerdictScale::Relative)
            .await
    }
}
