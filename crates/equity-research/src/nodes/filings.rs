//! SEC filings analysis over retrieved excerpts

use super::generation::Generator;
use super::output::{NodeOutput, VerdictScale};
use super::{NodeInput, NodeRun, ResearchNode};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{AnalysisPrompt, system};
use crate::sources::{DocumentExcerpt, DocumentStore};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Queries run against the filings index
pub const SEARCH_TOPICS: [&str; 5] = [
    "risk factors material risks",
    "revenue growth trends performance",
    "competitive landscape market position",
    "management guidance outlook",
    "debt obligations liquidity",
];

/// Excerpts handed to the model
pub const MAX_EXCERPTS: usize = 15;

/// Leading characters compared when de-duplicating excerpts
const DEDUPE_PREFIX_CHARS: usize = 100;

pub const NO_FILINGS: &str = "No SEC filings available for analysis.";
pub const RETRIEVAL_FAILED: &str = "Analysis unavailable due to data retrieval error.";

pub struct FilingsNode {
    documents: Arc<dyn DocumentStore>,
    generator: Generator,
    top_k: usize,
}

impl FilingsNode {
    pub fn new(documents: Arc<dyn DocumentStore>, generator: Generator, top_k: usize) -> Self {
        Self {
            documents,
            generator,
            top_k,
        }
    }

    async fn retrieve(&self, symbol: &str) -> Result<Vec<DocumentExcerpt>, TransientTaskError> {
        let results = join_all(
            SEARCH_TOPICS
                .iter()
                .map(|topic| self.documents.search(symbol, topic, self.top_k)),
        )
        .await;

        let mut excerpts = Vec::new();
        let mut last_error = None;
        for (topic, result) in SEARCH_TOPICS.iter().zip(results) {
            match result {
                Ok(found) => excerpts.extend(found),
                Err(e) => {
                    warn!(symbol, topic, error = %e, "Filings search failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if excerpts.is_empty() => Err(e.into()),
            _ => Ok(select_excerpts(excerpts)),
        }
    }
}

/// Most relevant first, duplicates by leading text dropped, capped
pub(crate) fn select_excerpts(mut excerpts: Vec<DocumentExcerpt>) -> Vec<DocumentExcerpt> {
    excerpts.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));

    let mut seen = HashSet::new();
    excerpts.retain(|excerpt| seen.insert(excerpt.text.chars().take(DEDUPE_PREFIX_CHARS).collect::<String>()));
    excerpts.truncate(MAX_EXCERPTS);
    excerpts
}

fn render(excerpts: &[DocumentExcerpt]) -> String {
    excerpts
        .iter()
        .map(|excerpt| {
            let section = excerpt.section.as_deref().unwrap_or("unspecified section");
            format!(
                "[{}, {}, filed {}]\n{}",
                excerpt.filing_type,
                section,
                excerpt.filing_date,
                excerpt.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl ResearchNode for FilingsNode {
    fn id(&self) -> NodeId {
        NodeId::Filings
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let summary = match input.upstream(NodeId::Ingestion)? {
            NodeOutput::Ingestion(summary) => *summary,
            NodeOutput::Unavailable { reason } => {
                debug!(reason = %reason, "Ingestion unavailable, skipping filings analysis");
                return Ok(NodeRun::new(NodeOutput::unavailable(RETRIEVAL_FAILED)));
            }
            _ => return Err(TransientTaskError::MissingInput(NodeId::Ingestion)),
        };

        if summary.documents == 0 {
            return Ok(NodeRun::new(NodeOutput::unavailable(NO_FILINGS)));
        }

        let excerpts = self.retrieve(input.subject.as_str()).await?;
        if excerpts.is_empty() {
            return Ok(NodeRun::new(NodeOutput::unavailable(NO_FILINGS)));
        }
        debug!(excerpts = excerpts.len(), "Filing excerpts selected");

        let prompt = AnalysisPrompt::new(&input, VerdictScale::Directional, "Filing excerpts", render(&excerpts)).cited();
        self.generator
            .analyze(system::FILINGS, &prompt, VerdictScale::Directional)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{Subject, TradeParameters};
    use crate::error::CollaboratorError;
    use crate::nodes::generation::testing::{ScriptedProvider, generator};
    use crate::nodes::output::{IngestionSummary, Verdict};
    use crate::sources::MockDocumentStore;

    fn excerpt(text: &str, relevance: f64) -> DocumentExcerpt {
        DocumentExcerpt {
            text: text.to_string(),
            filing_type: "10-K".to_string(),
            section: Some("Item 1A. Risk Factors".to_string()),
            filing_date: "2026-08-01".to_string(),
            relevance,
        }
    }

    fn input(documents: usize) -> NodeInput {
        let mut input = NodeInput::new(Subject::new("AAPL"), TradeParameters::default());
        input.upstream.insert(
            NodeId::Ingestion,
            NodeOutput::Ingestion(IngestionSummary {
                documents,
                chunks: documents * 40,
                newly_ingested: false,
            }),
        );
        input
    }

    #[test]
    fn test_select_dedupes_sorts_and_caps() {
        let shared = "a".repeat(DEDUPE_PREFIX_CHARS);
        let mut excerpts = vec![
            excerpt(&format!("{shared} tail one"), 0.2),
            excerpt(&format!("{shared} tail two"), 0.9),
        ];
        excerpts.extend((0..20).map(|i| excerpt(&format!("distinct passage {i}"), f64::from(i) / 100.0)));

        let selected = select_excerpts(excerpts);
        assert_eq!(selected.len(), MAX_EXCERPTS);
        assert!(selected[0].text.ends_with("tail two"));
        assert!(!selected.iter().any(|e| e.text.ends_with("tail one")));
        assert!(selected.windows(2).all(|pair| pair[0].relevance >= pair[1].relevance));
    }

    #[tokio::test]
    async fn test_no_documents_short_circuits() {
        let mut store = MockDocumentStore::new();
        store.expect_search().never();

        let node = FilingsNode::new(Arc::new(store), generator(ScriptedProvider::replying([])), 3);
        let run = node.run(input(0)).await.unwrap();
        assert_eq!(run.output, NodeOutput::unavailable(NO_FILINGS));
    }

    #[tokio::test]
    async fn test_ingestion_failure_degrades() {
        let mut input = input(0);
        input
            .upstream
            .insert(NodeId::Ingestion, NodeOutput::unavailable("EDGAR unreachable"));

        let node = FilingsNode::new(
            Arc::new(MockDocumentStore::new()),
            generator(ScriptedProvider::replying([])),
            3,
        );
        let run = node.run(input).await.unwrap();
        assert_eq!(run.output, NodeOutput::unavailable(RETRIEVAL_FAILED));
    }

    #[tokio::test]
    async fn test_searches_every_topic() {
        let mut store = MockDocumentStore::new();
        store
            .expect_search()
            .times(SEARCH_TOPICS.len())
            .returning(|_, query, _| Ok(vec![excerpt(&format!("passage about {query}"), 0.5)]));

        let provider = ScriptedProvider::replying([
            r#"{"verdict": "BEARISH", "key_points": [{"point": "Rising debt", "source": "10-K Item 7", "date": "2026-08-01"}], "confidence": "High"}"#,
        ]);
        let node = FilingsNode::new(Arc::new(store), generator(provider.clone()), 3);

        let run = node.run(input(2)).await.unwrap();
        let NodeOutput::Analysis(analysis) = run.output else {
            panic!("expected an analysis");
        };
        assert_eq!(analysis.verdict, Verdict::Bearish);

        let prompt = &provider.last_request().messages[0].content;
        assert!(prompt.contains("[10-K, Item 1A. Risk Factors, filed 2026-08-01]"));
        assert!(prompt.contains("passage about debt obligations liquidity"));
    }

    #[tokio::test]
    async fn test_all_searches_failing_is_transient() {
        let mut store = MockDocumentStore::new();
        store.expect_search().returning(|_, _, _| {
            Err(CollaboratorError::Unreachable {
                source_name: "edgar".to_string(),
                message: "timeout".to_string(),
            })
        });

        let node = FilingsNode::new(Arc::new(store), generator(ScriptedProvider::replying([])), 3);
        assert!(matches!(node.run(input(1)).await, Err(TransientTaskError::Collaborator(_))));
    }
}
