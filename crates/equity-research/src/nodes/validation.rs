//! Entry gate: decides whether the subject exists before any analysis runs

use super::output::NodeOutput;
use super::{NodeInput, NodeRun, ResearchNode};
use crate::engine::graph::NodeId;
use crate::error::{ResearchError, TransientTaskError};
use crate::sources::SubjectValidator;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Listed ticker shape: up to six characters plus an optional share-class suffix
const TICKER_PATTERN: &str = r"^[A-Z][A-Z0-9]{0,5}([.\-][A-Z]{1,2})?$";

pub struct ValidationNode {
    validator: Arc<dyn SubjectValidator>,
    ticker: Regex,
}

impl ValidationNode {
    pub fn new(validator: Arc<dyn SubjectValidator>) -> crate::error::Result<Self> {
        let ticker = Regex::new(TICKER_PATTERN)
            .map_err(|e| ResearchError::Config(format!("invalid ticker pattern: {e}")))?;
        Ok(Self { validator, ticker })
    }

    fn rejected(reason: String) -> NodeRun {
        NodeRun::new(NodeOutput::Rejected { reason })
    }
}

#[async_trait]
impl ResearchNode for ValidationNode {
    fn id(&self) -> NodeId {
        NodeId::Validation
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let symbol = input.subject.as_str();

        if !self.ticker.is_match(symbol) {
            debug!(symbol, "Subject does not look like a ticker");
            return Ok(Self::rejected(format!("'{symbol}' is not a ticker symbol")));
        }

        if !self.validator.is_valid_subject(symbol).await? {
            return Ok(Self::rejected(format!("'{symbol}' is not a known listed symbol")));
        }

        // The gate passes even when the profile lookup fails
        let mut profile = match self.validator.describe(symbol).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(symbol, error = %e, "Subject profile unavailable");
                input.profile_or_subject()
            }
        };
        profile.symbol = symbol.to_string();

        Ok(NodeRun::new(NodeOutput::Profile(profile)))
    }
}
