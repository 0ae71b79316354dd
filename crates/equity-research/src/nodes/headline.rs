//! Sentiment of recent company headlines

use super::generation::Generator;
use super::output::VerdictScale;
use super::{NodeInput, NodeRun, ResearchNode, news};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{AnalysisPrompt, system};
use crate::sources::{DataSource, NewsTopic};
use async_trait::async_trait;
use std::sync::Arc;

/// Days of company news considered
pub const HEADLINE_WINDOW_DAYS: u32 = 30;

pub struct HeadlineNode {
    news: Arc<dyn DataSource>,
    generator: Generator,
}

impl HeadlineNode {
    pub fn new(news: Arc<dyn DataSource>, generator: Generator) -> Self {
        Self { news, generator }
    }
}

#[async_trait]
impl ResearchNode for HeadlineNode {
    fn id(&self) -> NodeId {
        NodeId::Headline
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let articles = news::fetch(
            self.news.as_ref(),
            input.subject.as_str(),
            NewsTopic::Company,
            HEADLINE_WINDOW_DAYS,
        )
        .await?;

        let prompt = AnalysisPrompt::new(&input, VerdictScale::Directional, "Recent headlines", news::render(&articles))
            .cited()
            .within_days(HEADLINE_WINDOW_DAYS);

        self.generator
            .analyze(system::HEADLINE, &prompt, VerdictScale::Directional)
            .await
    }
}
