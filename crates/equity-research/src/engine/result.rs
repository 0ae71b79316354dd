//! Response shape of a completed research request

use crate::engine::context::{RequestContext, RequestStatus, Subject, TradeParameters};
use crate::engine::graph::NodeId;
use crate::engine::revision::FinalThesis;
use crate::metrics::{MetricsReport, MetricsSummary};
use crate::nodes::output::NodeOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything a caller gets back from one research request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub request_id: Uuid,
    pub subject: Subject,
    pub parameters: TradeParameters,
    pub status: RequestStatus,
    pub final_output: FinalThesis,
    /// Outputs of the analysis nodes, keyed by node
    pub analyses: BTreeMap<NodeId, NodeOutput>,
    pub revision_count: u32,
    pub metrics: MetricsReport,
}

impl ResearchReport {
    /// Collect the report from a finished context
    pub fn from_context(ctx: &RequestContext, final_output: FinalThesis, metrics: &MetricsSummary) -> Self {
        let analyses = ctx
            .outputs()
            .iter()
            .filter(|(node, _)| node.is_analysis())
            .map(|(node, output)| (*node, output.clone()))
            .collect();

        Self {
            request_id: ctx.request_id(),
            subject: ctx.subject().clone(),
            parameters: ctx.parameters(),
            status: ctx.status(),
            final_output,
            analyses,
            revision_count: ctx.revision_count(),
            metrics: metrics.report(),
        }
    }

    /// Rendered analysis text per node, as handed to synthesis
    pub fn rendered_analyses(&self) -> BTreeMap<NodeId, String> {
        self.analyses
            .iter()
            .map(|(node, output)| (*node, output.render()))
            .collect()
    }

    /// Analyses that degraded to `unavailable`
    pub fn unavailable_nodes(&self) -> Vec<NodeId> {
        self.analyses
            .iter()
            .filter(|(_, output)| output.is_unavailable())
            .map(|(node, _)| *node)
            .collect()
    }
}
