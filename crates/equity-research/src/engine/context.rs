//! Request-scoped state threaded through one research run

use crate::engine::graph::NodeId;
use crate::error::SlotOccupied;
use crate::metrics::{MetricsSummary, NodeMetrics};
use crate::nodes::output::{Draft, NodeOutput, SubjectProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Ticker-like identifier, trimmed and upper-cased
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    /// Normalize a raw identifier
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    /// The normalized identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Side of the trade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    #[default]
    Long,
    Short,
}

/// Holding period of the trade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDuration {
    #[serde(alias = "day_trade")]
    Day,
    #[default]
    #[serde(alias = "swing_trade")]
    Swing,
    #[serde(alias = "position_trade")]
    Position,
}

impl TradeDirection {
    /// Lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl TradeDuration {
    /// Lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Swing => "swing",
            Self::Position => "position",
        }
    }

    /// Expected holding period in calendar days
    pub const fn horizon_days(self) -> u32 {
        match self {
            Self::Day => 1,
            Self::Swing => 14,
            Self::Position => 120,
        }
    }

    /// Perspectives the synthesis should weight most for this horizon
    pub const fn emphasis(self) -> &'static str {
        match self {
            Self::Day => "technical signals and headline sentiment",
            Self::Swing => "a balance of technical and fundamental factors, with attention to industry trends",
            Self::Position => "fundamental strength, industry positioning and structural macro trends",
        }
    }
}

/// Immutable request parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeParameters {
    pub direction: TradeDirection,
    pub duration: TradeDuration,
}

impl TradeParameters {
    pub fn new(direction: TradeDirection, duration: TradeDuration) -> Self {
        Self { direction, duration }
    }
}

/// Lifecycle of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Running,
    Aborted,
    Completed,
}

/// Request-scoped state
///
/// Node outputs are write-once per node. The synthesis slot is the exception:
/// the revision controller replaces the draft between attempts.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    subject: Subject,
    parameters: TradeParameters,
    started_at: DateTime<Utc>,
    status: RequestStatus,
    profile: Option<SubjectProfile>,
    node_outputs: BTreeMap<NodeId, NodeOutput>,
    metrics: MetricsSummary,
    revision_count: u32,
    feedback: Option<String>,
}

impl RequestContext {
    /// Create a pending context
    pub fn new(subject: Subject, parameters: TradeParameters) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            subject,
            parameters,
            started_at: Utc::now(),
            status: RequestStatus::Pending,
            profile: None,
            node_outputs: BTreeMap::new(),
            metrics: MetricsSummary::default(),
            revision_count: 0,
            feedback: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn parameters(&self) -> TradeParameters {
        self.parameters
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Profile produced by the validation gate
    pub fn profile(&self) -> Option<&SubjectProfile> {
        self.profile.as_ref()
    }

    /// Output recorded for `node`
    pub fn output(&self, node: NodeId) -> Option<&NodeOutput> {
        self.node_outputs.get(&node)
    }

    /// All recorded outputs
    pub fn outputs(&self) -> &BTreeMap<NodeId, NodeOutput> {
        &self.node_outputs
    }

    pub fn metrics(&self) -> &MetricsSummary {
        &self.metrics
    }

    /// Number of rejected drafts so far
    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }

    /// Critic feedback on the latest rejected draft
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    /// Owned copies of the outputs of `nodes`
    pub fn snapshot<'a>(&self, nodes: impl IntoIterator<Item = &'a NodeId>) -> BTreeMap<NodeId, NodeOutput> {
        nodes
            .into_iter()
            .filter_map(|node| self.node_outputs.get(node).map(|output| (*node, output.clone())))
            .collect()
    }

    pub(crate) fn begin(&mut self) {
        self.status = RequestStatus::Running;
    }

    pub(crate) fn abort(&mut self) {
        self.status = RequestStatus::Aborted;
    }

    pub(crate) fn complete(&mut self) {
        self.status = RequestStatus::Completed;
    }

    pub(crate) fn set_profile(&mut self, profile: SubjectProfile) {
        self.profile = Some(profile);
    }

    /// Fill the slot for `node`; rejects a second write
    pub(crate) fn record_output(&mut self, node: NodeId, output: NodeOutput) -> Result<(), SlotOccupied> {
        if self.node_outputs.contains_key(&node) {
            return Err(SlotOccupied(node));
        }
        self.node_outputs.insert(node, output);
        Ok(())
    }

    /// Replace the synthesis draft between revision attempts
    pub(crate) fn replace_draft(&mut self, node: NodeId, draft: Draft) {
        self.node_outputs.insert(node, NodeOutput::Draft(draft));
    }

    pub(crate) fn record_metrics(&mut self, record: NodeMetrics) {
        self.metrics.record(record);
    }

    pub(crate) fn set_metrics(&mut self, metrics: MetricsSummary) {
        self.metrics = metrics;
    }

    /// Count a rejection and keep its feedback for the next draft
    pub(crate) fn note_rejection(&mut self, feedback: Option<String>) {
        self.revision_count += 1;
        self.feedback = feedback;
    }
}
