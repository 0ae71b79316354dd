//! Typed node outputs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result produced by a research node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeOutput {
    /// Validation succeeded
    Profile(SubjectProfile),
    /// Validation failed; never stored
    Rejected { reason: String },
    /// Filings are indexed and searchable
    Ingestion(IngestionSummary),
    /// Verdict from one perspective
    Analysis(Analysis),
    /// Candidate thesis from the synthesis node
    Draft(Draft),
    /// Critic decision; consumed by the revision controller only
    Verdict(ComplianceVerdict),
    /// Degraded marker emitted instead of failing the request
    Unavailable { reason: String },
}

impl NodeOutput {
    /// Build a degraded output
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether the output may be served from the cache on a later request
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Profile(_) | Self::Ingestion(_) | Self::Analysis(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Text block handed to the synthesis prompt and printed by the CLI
    pub fn render(&self) -> String {
        match self {
            Self::Profile(profile) => profile.to_string(),
            Self::Rejected { reason } => format!("Rejected: {reason}"),
            Self::Ingestion(summary) => format!(
                "{} filings indexed ({} chunks)",
                summary.documents, summary.chunks
            ),
            Self::Analysis(analysis) => analysis.to_string(),
            Self::Draft(draft) => draft.text.clone(),
            Self::Verdict(verdict) if verdict.approved => "Approved".to_string(),
            Self::Verdict(verdict) => format!(
                "Not approved: {}",
                verdict.feedback.as_deref().unwrap_or("no feedback")
            ),
            Self::Unavailable { reason } => format!("Analysis unavailable: {reason}"),
        }
    }
}

/// What the validation gate learned about the subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub symbol: String,
    pub name: Option<String>,
    pub industry: Option<String>,
    pub next_earnings: Option<NaiveDate>,
    pub last_price: Option<f64>,
}

impl SubjectProfile {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Company name, falling back to the symbol
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.symbol)
    }

    /// Whether earnings are due within `days` of `today`
    pub fn earnings_within(&self, today: NaiveDate, days: i64) -> bool {
        self.next_earnings
            .map(|date| (date - today).num_days())
            .is_some_and(|delta| (0..=days).contains(&delta))
    }
}

impl fmt::Display for SubjectProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.symbol)?;
        if let Some(industry) = &self.industry {
            write!(f, ", {industry}")?;
        }
        Ok(())
    }
}

/// Result of loading filings for a subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub documents: usize,
    pub chunks: usize,
    pub newly_ingested: bool,
}

/// Label scale a node is allowed to answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictScale {
    /// BULLISH / BEARISH / NEUTRAL
    Directional,
    /// POSITIVE / NEGATIVE / NEUTRAL, relative to a reference group
    Relative,
    /// UNDERVALUED / OVERVALUED / FAIRLY VALUED
    Valuation,
}

impl VerdictScale {
    /// Labels accepted on this scale
    pub fn labels(self) -> &'static [Verdict] {
        match self {
            Self::Directional => &[Verdict::Bullish, Verdict::Bearish, Verdict::Neutral],
            Self::Relative => &[Verdict::Positive, Verdict::Negative, Verdict::Neutral],
            Self::Valuation => &[Verdict::Undervalued, Verdict::Overvalued, Verdict::FairlyValued],
        }
    }

    /// Parse a label, rejecting labels from other scales
    pub fn parse(self, raw: &str) -> Option<Verdict> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['_', '-'], " ");
        self.labels()
            .iter()
            .copied()
            .find(|verdict| verdict.label() == normalized)
    }
}

/// Verdict label of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Bullish,
    Bearish,
    Neutral,
    Positive,
    Negative,
    Undervalued,
    Overvalued,
    FairlyValued,
}

impl Verdict {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Neutral => "NEUTRAL",
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
            Self::Undervalued => "UNDERVALUED",
            Self::Overvalued => "OVERVALUED",
            Self::FairlyValued => "FAIRLY VALUED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Confidence attached to an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" | "moderate" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        })
    }
}

/// Where a key point came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub date: String,
}

/// One supporting point of an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub point: String,
    pub citation: Option<Citation>,
}

impl KeyPoint {
    pub fn new(point: impl Into<String>) -> Self {
        Self {
            point: point.into(),
            citation: None,
        }
    }

    pub fn cited(point: impl Into<String>, source: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            point: point.into(),
            citation: Some(Citation {
                source: source.into(),
                date: date.into(),
            }),
        }
    }
}

/// Verdict, supporting points and confidence from one perspective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub verdict: Verdict,
    pub key_points: Vec<KeyPoint>,
    pub confidence: Confidence,
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]\n\n", self.verdict)?;
        for key_point in &self.key_points {
            write!(f, "* {}", key_point.point)?;
            if let Some(citation) = &key_point.citation {
                write!(f, " [{}, {}]", citation.source, citation.date)?;
            }
            writeln!(f)?;
        }
        write!(f, "\nConfidence: {}", self.confidence)
    }
}

/// Candidate thesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
    /// 1-based synthesis attempt that produced the draft
    pub attempt: u32,
}

impl Draft {
    pub fn new(text: impl Into<String>, attempt: u32) -> Self {
        Self {
            text: text.into(),
            attempt,
        }
    }
}

/// Critic decision on a draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub approved: bool,
    /// Present only when not approved
    pub feedback: Option<String>,
}

impl ComplianceVerdict {
    pub fn approve() -> Self {
        Self {
            approved: true,
            feedback: None,
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            feedback: Some(feedback.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_rendering() {
        let analysis = Analysis {
            verdict: Verdict::Bullish,
            key_points: vec![
                KeyPoint::cited("Services revenue hit a record", "Reuters", "2026-10-01"),
                KeyPoint::new("RSI is neutral"),
            ],
            confidence: Confidence::Medium,
        };

        assert_eq!(
            analysis.to_string(),
            "[BULLISH]\n\n* Services revenue hit a record [Reuters, 2026-10-01]\n* RSI is neutral\n\nConfidence: Medium"
        );
    }

    #[test]
    fn test_verdict_scales() {
        assert_eq!(VerdictScale::Valuation.parse("fairly_valued"), Some(Verdict::FairlyValued));
        assert_eq!(VerdictScale::Relative.parse(" positive "), Some(Verdict::Positive));
        assert_eq!(VerdictScale::Directional.parse("POSITIVE"), None);
    }

    #[test]
    fn test_cacheability() {
        assert!(NodeOutput::Ingestion(IngestionSummary::default()).is_cacheable());
        assert!(!NodeOutput::unavailable("down").is_cacheable());
        assert!(!NodeOutput::Rejected { reason: "x".to_string() }.is_cacheable());
        assert!(!NodeOutput::Verdict(ComplianceVerdict::approve()).is_cacheable());
    }

    #[test]
    fn test_earnings_window() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let mut profile = SubjectProfile::new("AAPL");
        assert!(!profile.earnings_within(today, 7));

        profile.next_earnings = NaiveDate::from_ymd_opt(2026, 10, 25);
        assert!(profile.earnings_within(today, 7));

        profile.next_earnings = NaiveDate::from_ymd_opt(2026, 10, 26);
        assert!(!profile.earnings_within(today, 7));
    }
}
