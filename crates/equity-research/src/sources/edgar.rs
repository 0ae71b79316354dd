//! SEC EDGAR filings client and the document store built on it
//!
//! SEC EDGAR is the Electronic Data Gathering, Analysis, and Retrieval system
//! used by the U.S. Securities and Exchange Commission.
//!
//! Rate limit: 10 requests per second (as per SEC fair access policy)
//! User-Agent requirement: Must include company name and contact email

use super::documents::{FilingDocument, FilingSection, InMemoryDocumentStore};
use super::{DocumentExcerpt, DocumentStore};
use crate::error::{CollaboratorError, ResearchError};
use crate::nodes::output::IngestionSummary;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, info, warn};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const SEC_BASE_URL: &str = "https://data.sec.gov";
const SEC_ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar/data";
const SEC_COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const SOURCE: &str = "sec-edgar";

/// Forms loaded into the document store
pub const INGESTED_FORMS: [&str; 2] = ["10-K", "10-Q"];

/// SEC submissions response
#[derive(Debug, Clone, Deserialize)]
struct CompanySubmissions {
    filings: FilingsData,
}

#[derive(Debug, Clone, Deserialize)]
struct FilingsData {
    recent: RecentFilings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    accession_number: Vec<String>,
    filing_date: Vec<String>,
    form: Vec<String>,
    primary_document: Vec<String>,
}

/// SEC filing metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecFiling {
    pub accession_number: String,
    pub form_type: String,
    pub filing_date: String,
    pub primary_document: String,
}

/// SEC EDGAR API client
pub struct SecEdgarClient {
    client: Client,
    user_agent: String,
    rate_limiter: SharedRateLimiter,
}

impl SecEdgarClient {
    /// Create a client identifying itself with `user_agent`
    /// (`"Company contact@example.com"`, as SEC requires)
    pub fn new(user_agent: impl Into<String>) -> Self {
        // SEC allows 10 requests per second
        let quota = Quota::per_second(NonZeroU32::MIN.saturating_add(9));

        Self {
            client: Client::new(),
            user_agent: user_agent.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create from environment variables
    /// Uses SEC_USER_AGENT or defaults to "equity-research (research@example.com)"
    pub fn from_env() -> Self {
        let user_agent = std::env::var("SEC_USER_AGENT")
            .unwrap_or_else(|_| "equity-research (research@example.com)".to_string());
        Self::new(user_agent)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, CollaboratorError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| unreachable(format!("request failed: {e}")))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => Err(CollaboratorError::RateLimited {
                source_name: SOURCE.to_string(),
            }),
            status => Err(unreachable(format!("API error: {status}"))),
        }
    }

    /// Get CIK number from stock ticker
    pub async fn get_cik(&self, ticker: &str) -> Result<String, CollaboratorError> {
        let data: serde_json::Value = self
            .get(SEC_COMPANY_TICKERS_URL)
            .await?
            .json()
            .await
            .map_err(|e| malformed(format!("failed to parse ticker list: {e}")))?;

        let ticker_upper = ticker.to_uppercase();
        data.as_object()
            .into_iter()
            .flat_map(|companies| companies.values())
            .find(|company| {
                company
                    .get("ticker")
                    .and_then(serde_json::Value::as_str)
                    .is_some_and(|t| t.eq_ignore_ascii_case(&ticker_upper))
            })
            .and_then(|company| company.get("cik_str"))
            .and_then(|cik| cik.as_u64().map(|n| n.to_string()).or_else(|| cik.as_str().map(str::to_string)))
            .ok_or_else(|| CollaboratorError::NoData {
                source_name: SOURCE.to_string(),
                query: format!("CIK for {ticker}"),
            })
    }

    /// Most recent filings of the given forms, newest first
    pub async fn recent_filings(
        &self,
        cik: &str,
        forms: &[&str],
        limit: usize,
    ) -> Result<Vec<SecFiling>, CollaboratorError> {
        let url = format!("{SEC_BASE_URL}/submissions/CIK{:0>10}.json", cik.trim_start_matches('0'));
        let submissions: CompanySubmissions = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| malformed(format!("failed to parse submissions: {e}")))?;

        let recent = submissions.filings.recent;
        let filings = recent
            .form
            .iter()
            .enumerate()
            .filter(|(_, form)| forms.contains(&form.as_str()))
            .filter_map(|(i, form)| {
                Some(SecFiling {
                    accession_number: recent.accession_number.get(i)?.clone(),
                    form_type: form.clone(),
                    filing_date: recent.filing_date.get(i)?.clone(),
                    primary_document: recent.primary_document.get(i)?.clone(),
                })
            })
            .take(limit)
            .collect();

        Ok(filings)
    }

    /// Build URL to access a filing document
    pub fn filing_url(cik: &str, filing: &SecFiling) -> String {
        format!(
            "{SEC_ARCHIVES_URL}/{}/{}/{}",
            cik.trim_start_matches('0'),
            filing.accession_number.replace('-', ""),
            filing.primary_document
        )
    }

    /// Raw primary document of a filing
    pub async fn filing_document(&self, cik: &str, filing: &SecFiling) -> Result<String, CollaboratorError> {
        self.get(&Self::filing_url(cik, filing))
            .await?
            .text()
            .await
            .map_err(|e| malformed(format!("failed to read filing body: {e}")))
    }
}

/// Turns filing HTML into plain text split at `Item N.` headings
struct FilingText {
    blocks: Regex,
    tags: Regex,
    entities: Regex,
    items: Regex,
}

impl FilingText {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            blocks: Regex::new(r"(?is)<(script|style|head)[^>]*>.*?</(script|style|head)>")?,
            tags: Regex::new(r"(?s)<[^>]*>")?,
            entities: Regex::new(r"&(#\d+|#x[0-9a-fA-F]+|[a-zA-Z]+);")?,
            items: Regex::new(r"(?i)\bitem\s+(\d{1,2}[a-c]?)\s*[.:]")?,
        })
    }

    fn plain(&self, html: &str) -> String {
        let text = self.blocks.replace_all(html, " ");
        let text = self.tags.replace_all(&text, " ");
        let text = self.entities.replace_all(&text, |caps: &regex::Captures<'_>| match &caps[1] {
            "amp" => "&".to_string(),
            "lt" => "<".to_string(),
            "gt" => ">".to_string(),
            "quot" => "\"".to_string(),
            "#39" | "apos" => "'".to_string(),
            _ => " ".to_string(),
        });
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn sections(&self, text: &str) -> Vec<FilingSection> {
        let mut sections = Vec::new();
        let mut start = 0;
        let mut title = None;

        for caps in self.items.captures_iter(text) {
            let Some(heading) = caps.get(0) else { continue };
            let body = text[start..heading.start()].trim();
            if !body.is_empty() {
                sections.push(FilingSection {
                    title: title.take(),
                    text: body.to_string(),
                });
            }
            title = Some(format!("Item {}", caps[1].to_uppercase()));
            start = heading.end();
        }

        let tail = text[start..].trim();
        if !tail.is_empty() {
            sections.push(FilingSection {
                title,
                text: tail.to_string(),
            });
        }
        sections
    }
}

/// [`DocumentStore`] that indexes recent EDGAR filings on first use
pub struct EdgarDocumentStore {
    client: SecEdgarClient,
    index: InMemoryDocumentStore,
    text: FilingText,
    max_filings: usize,
}

impl EdgarDocumentStore {
    pub fn new(client: SecEdgarClient) -> crate::error::Result<Self> {
        let text = FilingText::new().map_err(|e| ResearchError::Config(format!("filing text patterns: {e}")))?;
        Ok(Self {
            client,
            index: InMemoryDocumentStore::new(),
            text,
            max_filings: 3,
        })
    }

    /// Number of recent filings loaded per subject
    pub fn with_max_filings(mut self, max_filings: usize) -> Self {
        self.max_filings = max_filings.max(1);
        self
    }
}

#[async_trait]
impl DocumentStore for EdgarDocumentStore {
    async fn ensure_ingested(&self, symbol: &str) -> Result<IngestionSummary, CollaboratorError> {
        if let Some(summary) = self.index.summary(symbol).await {
            debug!(symbol, "Filings already indexed");
            return Ok(summary);
        }

        let cik = self.client.get_cik(symbol).await?;
        let filings = self.client.recent_filings(&cik, &INGESTED_FORMS, self.max_filings).await?;

        let mut documents = Vec::with_capacity(filings.len());
        for filing in &filings {
            match self.client.filing_document(&cik, filing).await {
                Ok(html) => documents.push(FilingDocument {
                    filing_type: filing.form_type.clone(),
                    filing_date: filing.filing_date.clone(),
                    sections: self.text.sections(&self.text.plain(&html)),
                }),
                Err(e) => warn!(symbol, accession = %filing.accession_number, error = %e, "Skipping filing"),
            }
        }

        let summary = self.index.insert(symbol, documents).await;
        info!(symbol, documents = summary.documents, chunks = summary.chunks, "Ingested SEC filings");
        Ok(summary)
    }

    async fn search(
        &self,
        symbol: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentExcerpt>, CollaboratorError> {
        self.index.search(symbol, query, top_k).await
    }
}

fn unreachable(message: String) -> CollaboratorError {
    CollaboratorError::Unreachable {
        source_name: SOURCE.to_string(),
        message,
    }
}

fn malformed(message: String) -> CollaboratorError {
    CollaboratorError::Malformed {
        source_name: SOURCE.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SecEdgarClient::new("TestApp test@example.com");
        assert!(client.user_agent.contains("TestApp"));
    }

    #[test]
    fn test_filing_url() {
        let filing = SecFiling {
            accession_number: "0000320193-25-000079".to_string(),
            form_type: "10-K".to_string(),
            filing_date: "2025-10-31".to_string(),
            primary_document: "aapl-20250927.htm".to_string(),
        };
        assert_eq!(
            SecEdgarClient::filing_url("0000320193", &filing),
            "https://www.sec.gov/Archives/edgar/data/320193/000032019325000079/aapl-20250927.htm"
        );
    }

    #[test]
    fn test_html_to_sections() {
        let text = FilingText::new().unwrap();
        let html = "<html><head><title>x</title></head><body>\
                    <p>Cover&nbsp;page</p>\
                    <p>Item 1A. Risk Factors</p><p>Supply &amp; demand risks.</p>\
                    <p>ITEM 7. Management&#8217;s Discussion</p><p>Revenue grew.</p>\
                    <script>var a = 1;</script></body></html>";

        let plain = text.plain(html);
        assert!(plain.contains("Supply & demand risks."));
        assert!(!plain.contains("var a"));

        let sections = text.sections(&plain);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title, None);
        assert_eq!(sections[1].title.as_deref(), Some("Item 1A"));
        assert!(sections[1].text.starts_with("Risk Factors"));
        assert_eq!(sections[2].title.as_deref(), Some("Item 7"));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_get_cik() {
        let client = SecEdgarClient::from_env();
        assert_eq!(client.get_cik("AAPL").await.unwrap(), "320193");
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_ingest_and_search() {
        let store = EdgarDocumentStore::new(SecEdgarClient::from_env()).unwrap().with_max_filings(1);
        let summary = store.ensure_ingested("AAPL").await.unwrap();
        assert!(summary.chunks > 0);
        assert!(!store.search("AAPL", "risk factors", 3).await.unwrap().is_empty());
    }
}
