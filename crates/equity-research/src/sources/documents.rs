//! In-process filing index with keyword scoring

use super::{DocumentExcerpt, DocumentStore};
use crate::error::CollaboratorError;
use crate::nodes::output::IngestionSummary;
use async_trait::async_trait;
use cached::{Cached, TimedSizedCache};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const DEFAULT_CHUNK_WORDS: usize = 220;
const DEFAULT_MAX_SYMBOLS: usize = 64;
/// Same as the ingestion cache TTL
const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

const STOPWORDS: &[&str] = &[
    "and", "are", "but", "for", "from", "has", "have", "its", "not", "our", "that", "the", "their", "this", "was",
    "were", "which", "with",
];

/// Titled part of a filing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingSection {
    pub title: Option<String>,
    pub text: String,
}

/// One filing to index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingDocument {
    pub filing_type: String,
    pub filing_date: String,
    pub sections: Vec<FilingSection>,
}

impl FilingDocument {
    /// Filing with a single untitled section
    pub fn new(filing_type: impl Into<String>, filing_date: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filing_type: filing_type.into(),
            filing_date: filing_date.into(),
            sections: vec![FilingSection {
                title: None,
                text: text.into(),
            }],
        }
    }
}

#[derive(Debug, Clone)]
struct Chunk {
    text: String,
    filing_type: String,
    section: Option<String>,
    filing_date: String,
    terms: HashSet<String>,
}

#[derive(Debug, Default)]
struct Corpus {
    documents: usize,
    chunks: Vec<Chunk>,
}

/// Filing chunks per symbol, searched by term overlap
///
/// Holds at most `max_symbols` corpora; a corpus is dropped once it is older
/// than the retention period, after which the symbol reads as not indexed.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    corpora: Arc<RwLock<TimedSizedCache<String, Arc<Corpus>>>>,
    chunk_words: usize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_chunk_words(DEFAULT_CHUNK_WORDS)
    }

    /// Store splitting filings into chunks of `chunk_words` words
    pub fn with_chunk_words(chunk_words: usize) -> Self {
        Self {
            corpora: Arc::new(RwLock::new(TimedSizedCache::with_size_and_lifespan(
                DEFAULT_MAX_SYMBOLS,
                DEFAULT_RETENTION,
            ))),
            chunk_words: chunk_words.max(1),
        }
    }

    /// Bound the index to `max_symbols` corpora kept for `retention` each
    pub fn with_limits(mut self, max_symbols: usize, retention: Duration) -> Self {
        self.corpora = Arc::new(RwLock::new(TimedSizedCache::with_size_and_lifespan(
            max_symbols.max(1),
            retention,
        )));
        self
    }

    async fn corpus(&self, symbol: &str) -> Option<Arc<Corpus>> {
        self.corpora.write().await.cache_get(&symbol.to_uppercase()).cloned()
    }

    /// Index filings for `symbol`, replacing what was there
    pub async fn insert(&self, symbol: &str, documents: Vec<FilingDocument>) -> IngestionSummary {
        let mut corpus = Corpus {
            documents: documents.len(),
            chunks: Vec::new(),
        };

        for document in documents {
            for section in &document.sections {
                for text in chunk_text(&section.text, self.chunk_words) {
                    corpus.chunks.push(Chunk {
                        terms: terms(&text),
                        text,
                        filing_type: document.filing_type.clone(),
                        section: section.title.clone(),
                        filing_date: document.filing_date.clone(),
                    });
                }
            }
        }

        let summary = IngestionSummary {
            documents: corpus.documents,
            chunks: corpus.chunks.len(),
            newly_ingested: true,
        };
        debug!(symbol, documents = summary.documents, chunks = summary.chunks, "Indexed filings");

        let _ = self.corpora.write().await.cache_set(symbol.to_uppercase(), Arc::new(corpus));
        summary
    }

    /// Summary of what is indexed for `symbol`, if anything
    pub async fn summary(&self, symbol: &str) -> Option<IngestionSummary> {
        self.corpus(symbol).await.map(|corpus| IngestionSummary {
            documents: corpus.documents,
            chunks: corpus.chunks.len(),
            newly_ingested: false,
        })
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ensure_ingested(&self, symbol: &str) -> Result<IngestionSummary, CollaboratorError> {
        Ok(self.summary(symbol).await.unwrap_or_default())
    }

    async fn search(
        &self,
        symbol: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentExcerpt>, CollaboratorError> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let Some(corpus) = self.corpus(symbol).await else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f64, &Chunk)> = corpus
            .chunks
            .iter()
            .map(|chunk| {
                let hits = query_terms.intersection(&chunk.terms).count();
                (hits as f64 / query_terms.len() as f64, chunk)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(relevance, chunk)| DocumentExcerpt {
                text: chunk.text.clone(),
                filing_type: chunk.filing_type.clone(),
                section: chunk.section.clone(),
                filing_date: chunk.filing_date.clone(),
                relevance,
            })
            .collect())
    }
}

/// Split on whitespace into windows of at most `words` words
pub(crate) fn chunk_text(text: &str, words: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.chunks(words).map(|window| window.join(" ")).collect()
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= 3)
        .map(str::to_lowercase)
        .filter(|token| !STOPWORDS.contains(&token.as_str()))
        .collect()
}
