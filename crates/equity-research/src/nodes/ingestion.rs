//! Loads the subject's filings into the document store

use super::output::NodeOutput;
use super::{NodeInput, NodeRun, ResearchNode};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::sources::DocumentStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct IngestionNode {
    documents: Arc<dyn DocumentStore>,
}

impl IngestionNode {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl ResearchNode for IngestionNode {
    fn id(&self) -> NodeId {
        NodeId::Ingestion
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let symbol = input.subject.as_str();
        let summary = self.documents.ensure_ingested(symbol).await?;

        info!(
            symbol,
            documents = summary.documents,
            chunks = summary.chunks,
            newly_ingested = summary.newly_ingested,
            "Filings ready"
        );

        Ok(NodeRun::new(NodeOutput::Ingestion(summary)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{Subject, TradeParameters};
    use crate::nodes::output::IngestionSummary;
    use crate::sources::MockDocumentStore;

    #[tokio::test]
    async fn test_ingestion_reports_summary() {
        let mut store = MockDocumentStore::new();
        store
            .expect_ensure_ingested()
            .withf(|symbol| symbol.eq_ignore_ascii_case("MSFT"))
            .times(1)
            .returning(|_| {
                Ok(IngestionSummary {
                    documents: 3,
                    chunks: 120,
                    newly_ingested: true,
                })
            });

        let node = IngestionNode::new(Arc::new(store));
        let run = node
            .run(NodeInput::new(Subject::new("msft"), TradeParameters::default()))
            .await
            .unwrap();

        assert_eq!(
            run.output,
            NodeOutput::Ingestion(IngestionSummary {
                documents: 3,
                chunks: 120,
                newly_ingested: true
            })
        );
        assert_eq!(run.model, None);
    }
}
