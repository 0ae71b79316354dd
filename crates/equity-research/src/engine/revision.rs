//! Bounded draft/critique loop for the terminal pair

use crate::engine::context::RequestContext;
use crate::engine::graph::NodeId;
use crate::engine::scheduler::run_body;
use crate::metrics::NodeMetrics;
use crate::nodes::output::{Draft, NodeOutput};
use crate::nodes::{NodeInput, ResearchNode, RevisionNote};
use research_llm::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Rejections tolerated before the last draft is returned unapproved
pub const MAX_REVISIONS: u32 = 3;

/// How the final thesis left the revision loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    /// The critic accepted the draft
    Approved,
    /// Every permitted draft was rejected
    NotApproved,
    /// The critic could not be reached; the draft was never reviewed
    Unreviewed,
    /// No draft could be produced
    Unavailable,
}

/// Thesis returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalThesis {
    pub text: String,
    pub approval: Approval,
    /// Synthesis attempts made
    pub attempts: u32,
    /// Latest critic feedback, if the draft was rejected
    pub last_feedback: Option<String>,
}

impl FinalThesis {
    pub fn is_approved(&self) -> bool {
        self.approval == Approval::Approved
    }
}

enum RevisionState {
    Drafting,
    Critiquing(Draft),
    Done(FinalThesis),
}

/// Drives synthesis and critique until approval or the revision bound
pub struct RevisionController {
    synthesis: Arc<dyn ResearchNode>,
    critique: Arc<dyn ResearchNode>,
    analyses: BTreeSet<NodeId>,
    node_timeout: Duration,
    max_revisions: u32,
}

impl RevisionController {
    /// `analyses` are the synthesis prerequisites handed to every draft
    pub fn new(
        synthesis: Arc<dyn ResearchNode>,
        critique: Arc<dyn ResearchNode>,
        analyses: BTreeSet<NodeId>,
        node_timeout: Duration,
    ) -> Self {
        Self {
            synthesis,
            critique,
            analyses,
            node_timeout,
            max_revisions: MAX_REVISIONS,
        }
    }

    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    /// Run the loop; the synthesis slot of `ctx` ends holding the last draft
    pub async fn run(&self, ctx: &mut RequestContext, synthesis: NodeId, critique: NodeId) -> FinalThesis {
        let mut state = RevisionState::Drafting;
        let mut attempt = 0;
        let mut last_draft: Option<Draft> = None;

        loop {
            state = match state {
                RevisionState::Drafting => {
                    attempt += 1;
                    let input = self.draft_input(ctx, attempt, last_draft.as_ref());

                    match self.step(ctx, synthesis, self.synthesis.as_ref(), input, attempt).await {
                        Ok(NodeOutput::Draft(draft)) => {
                            debug!(attempt, chars = draft.text.len(), "Draft produced");
                            ctx.replace_draft(synthesis, draft.clone());
                            last_draft = Some(draft.clone());
                            RevisionState::Critiquing(draft)
                        }
                        outcome => {
                            let reason = failure_reason(outcome);
                            warn!(attempt, reason = %reason, "Synthesis failed");
                            RevisionState::Done(fallback(ctx, last_draft.take(), attempt, reason))
                        }
                    }
                }
                RevisionState::Critiquing(draft) => {
                    let mut input = base_input(ctx, attempt);
                    input.candidate = Some(draft.clone());

                    match self.step(ctx, critique, self.critique.as_ref(), input, attempt).await {
                        Ok(NodeOutput::Verdict(verdict)) if verdict.approved => {
                            info!(attempt, "Draft approved");
                            RevisionState::Done(FinalThesis {
                                text: draft.text,
                                approval: Approval::Approved,
                                attempts: attempt,
                                last_feedback: None,
                            })
                        }
                        Ok(NodeOutput::Verdict(verdict)) => {
                            ctx.note_rejection(verdict.feedback);
                            warn!(
                                attempt,
                                revisions = ctx.revision_count(),
                                feedback = ctx.feedback().unwrap_or_default(),
                                "Draft rejected"
                            );
                            if ctx.revision_count() < self.max_revisions {
                                RevisionState::Drafting
                            } else {
                                RevisionState::Done(FinalThesis {
                                    text: draft.text,
                                    approval: Approval::NotApproved,
                                    attempts: attempt,
                                    last_feedback: ctx.feedback().map(str::to_string),
                                })
                            }
                        }
                        outcome => {
                            warn!(attempt, reason = %failure_reason(outcome), "Critic unavailable, returning unreviewed draft");
                            RevisionState::Done(FinalThesis {
                                text: draft.text,
                                approval: Approval::Unreviewed,
                                attempts: attempt,
                                last_feedback: ctx.feedback().map(str::to_string),
                            })
                        }
                    }
                }
                RevisionState::Done(thesis) => return thesis,
            };
        }
    }

    fn draft_input(&self, ctx: &RequestContext, attempt: u32, last_draft: Option<&Draft>) -> NodeInput {
        let mut input = base_input(ctx, attempt);
        input.upstream = ctx.snapshot(&self.analyses);
        input.revision = last_draft.map(|draft| RevisionNote {
            previous_draft: draft.text.clone(),
            feedback: ctx.feedback().unwrap_or_default().to_string(),
        });
        input
    }

    /// Run one terminal node and record its metrics under `attempt`
    async fn step(
        &self,
        ctx: &mut RequestContext,
        node: NodeId,
        body: &dyn ResearchNode,
        input: NodeInput,
        attempt: u32,
    ) -> Result<NodeOutput, String> {
        let started = Instant::now();
        let result = run_body(body, input, self.node_timeout).await;
        let latency = started.elapsed();

        match result {
            Ok(run) => {
                ctx.record_metrics(NodeMetrics::executed(node, attempt, latency, run.usage, run.model));
                Ok(run.output)
            }
            Err(err) => {
                ctx.record_metrics(NodeMetrics::executed(node, attempt, latency, TokenUsage::default(), None));
                Err(err.to_string())
            }
        }
    }
}

fn base_input(ctx: &RequestContext, attempt: u32) -> NodeInput {
    let mut input = NodeInput::new(ctx.subject().clone(), ctx.parameters());
    input.request_id = ctx.request_id();
    input.profile = ctx.profile().cloned();
    input.attempt = attempt;
    input
}

fn failure_reason(outcome: Result<NodeOutput, String>) -> String {
    match outcome {
        Ok(NodeOutput::Unavailable { reason }) => reason,
        Ok(other) => format!("unexpected output: {}", other.render()),
        Err(reason) => reason,
    }
}

/// Thesis when synthesis cannot produce a new draft
fn fallback(ctx: &RequestContext, last_draft: Option<Draft>, attempt: u32, reason: String) -> FinalThesis {
    match last_draft {
        Some(draft) => FinalThesis {
            text: draft.text,
            approval: Approval::NotApproved,
            attempts: attempt,
            last_feedback: ctx.feedback().map(str::to_string),
        },
        None => FinalThesis {
            text: format!("Synthesis unavailable: {reason}"),
            approval: Approval::Unavailable,
            attempts: attempt,
            last_feedback: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{Subject, TradeParameters};
    use crate::error::TransientTaskError;
    use crate::nodes::NodeRun;
    use crate::nodes::output::ComplianceVerdict;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Drafter {
        seen: Mutex<Vec<Option<RevisionNote>>>,
    }

    #[async_trait]
    impl ResearchNode for Drafter {
        fn id(&self) -> NodeId {
            NodeId::Synthesis
        }

        async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
            self.seen.lock().unwrap().push(input.revision.clone());
            Ok(NodeRun::new(NodeOutput::Draft(Draft::new(
                format!("draft {}", input.attempt),
                input.attempt,
            ))))
        }
    }

    struct Critic {
        verdicts: Mutex<VecDeque<Result<ComplianceVerdict, TransientTaskError>>>,
    }

    #[async_trait]
    impl ResearchNode for Critic {
        fn id(&self) -> NodeId {
            NodeId::Critique
        }

        async fn run(&self, _input: NodeInput) -> Result<NodeRun, TransientTaskError> {
            let next = self
                .verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ComplianceVerdict::reject("again")));
            next.map(|verdict| NodeRun::new(NodeOutput::Verdict(verdict)))
        }
    }

    fn controller(
        verdicts: Vec<Result<ComplianceVerdict, TransientTaskError>>,
    ) -> (RevisionController, Arc<Drafter>) {
        let drafter = Arc::new(Drafter {
            seen: Mutex::new(Vec::new()),
        });
        let critic = Arc::new(Critic {
            verdicts: Mutex::new(verdicts.into()),
        });
        let controller = RevisionController::new(
            drafter.clone(),
            critic,
            BTreeSet::from([NodeId::Technical]),
            Duration::from_secs(5),
        );
        (controller, drafter)
    }

    fn context() -> RequestContext {
        RequestContext::new(Subject::new("AAPL"), TradeParameters::default())
    }

    #[tokio::test]
    async fn test_approval_after_one_revision() {
        let (controller, drafter) = controller(vec![
            Ok(ComplianceVerdict::reject("cite sources")),
            Ok(ComplianceVerdict::approve()),
        ]);
        let mut ctx = context();

        let thesis = controller.run(&mut ctx, NodeId::Synthesis, NodeId::Critique).await;

        assert_eq!(thesis.approval, Approval::Approved);
        assert_eq!(thesis.text, "draft 2");
        assert_eq!(thesis.attempts, 2);
        assert_eq!(ctx.revision_count(), 1);

        let seen = drafter.seen.lock().unwrap();
        assert_eq!(seen[0], None);
        assert_eq!(
            seen[1],
            Some(RevisionNote {
                previous_draft: "draft 1".to_string(),
                feedback: "cite sources".to_string(),
            })
        );
        assert!(ctx.metrics().get(NodeId::Critique, 2).is_some());
        assert_eq!(
            ctx.output(NodeId::Synthesis),
            Some(&NodeOutput::Draft(Draft::new("draft 2", 2)))
        );
    }

    #[tokio::test]
    async fn test_rejections_are_bounded() {
        let (controller, drafter) = controller(Vec::new());
        let mut ctx = context();

        let thesis = controller.run(&mut ctx, NodeId::Synthesis, NodeId::Critique).await;

        assert_eq!(thesis.approval, Approval::NotApproved);
        assert_eq!(thesis.attempts, MAX_REVISIONS);
        assert_eq!(thesis.text, "draft 3");
        assert_eq!(thesis.last_feedback.as_deref(), Some("again"));
        assert_eq!(ctx.revision_count(), MAX_REVISIONS);
        assert_eq!(drafter.seen.lock().unwrap().len(), MAX_REVISIONS as usize);
    }

    #[tokio::test]
    async fn test_critic_failure_leaves_draft_unreviewed() {
        let (controller, _) = controller(vec![Err(TransientTaskError::MalformedResponse("not json".to_string()))]);
        let mut ctx = context();

        let thesis = controller.run(&mut ctx, NodeId::Synthesis, NodeId::Critique).await;

        assert_eq!(thesis.approval, Approval::Unreviewed);
        assert_eq!(thesis.text, "draft 1");
        assert_eq!(ctx.revision_count(), 0);
    }

    #[tokio::test]
    async fn test_lower_bound_is_configurable() {
        let (controller, _) = controller(Vec::new());
        let controller = controller.with_max_revisions(1);
        let mut ctx = context();

        let thesis = controller.run(&mut ctx, NodeId::Synthesis, NodeId::Critique).await;
        assert_eq!(thesis.attempts, 1);
        assert_eq!(ctx.revision_count(), 1);
    }
}
