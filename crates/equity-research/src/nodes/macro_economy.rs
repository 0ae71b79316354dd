//! Macro backdrop for equities

use super::generation::Generator;
use super::output::VerdictScale;
use super::{NodeInput, NodeRun, ResearchNode};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{AnalysisPrompt, system};
use crate::sources::{DataSource, FetchQuery, MacroSnapshot, decode};
use async_trait::async_trait;
use std::sync::Arc;

pub struct MacroNode {
    macro_data: Arc<dyn DataSource>,
    generator: Generator,
}

impl MacroNode {
    pub fn new(macro_data: Arc<dyn DataSource>, generator: Generator) -> Self {
        Self { macro_data, generator }
    }
}

#[async_trait]
impl ResearchNode for MacroNode {
    fn id(&self) -> NodeId {
        NodeId::Macro
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let payload = self.macro_data.fetch(&FetchQuery::MacroIndicators).await?;
        let snapshot: MacroSnapshot = decode(self.macro_data.name(), payload)?;
        if snapshot.indicators.is_empty() {
            return Err(TransientTaskError::InsufficientData("no macro indicators".to_string()));
        }

        let prompt = AnalysisPrompt::new(&input, VerdictScale::Directional, "Latest US macro indicators", render(&snapshot))
            .market_wide();
        self.generator
            .analyze(system::MACRO, &prompt, VerdictScale::Directional)
            .await
    }
}

fn render(snapshot: &MacroSnapshot) -> String {
    snapshot
        .indicators
        .iter()
        .map(|indicator| format!("- {}: {:.2} (as of {})", indicator.label, indicator.value, indicator.date))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{Subject, TradeParameters};
    use crate::nodes::generation::testing::{ScriptedProvider, generator};
    use crate::sources::{MacroIndicator, MockDataSource};

    #[test]
    fn test_render_indicators() {
        let snapshot = MacroSnapshot {
            indicators: vec![MacroIndicator {
                series_id: "FEDFUNDS".to_string(),
                label: "Fed funds rate (%)".to_string(),
                value: 4.33,
                date: "2026-09-01".to_string(),
            }],
        };
        assert_eq!(render(&snapshot), "- Fed funds rate (%): 4.33 (as of 2026-09-01)");
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_insufficient() {
        let mut source = MockDataSource::new();
        source.expect_name().return_const("fred".to_string());
        source
            .expect_fetch()
            .returning(|_| Ok(serde_json::json!({ "indicators": [] })));

        let node = MacroNode::new(Arc::new(source), generator(ScriptedProvider::replying([])));
        let result = node
            .run(NodeInput::new(Subject::new("AAPL"), TradeParameters::default()))
            .await;
        assert!(matches!(result, Err(TransientTaskError::InsufficientData(_))));
    }
}
