//! Executes the dependency graph for one request
//!
//! The entry gate runs first and alone. Once it passes, ready nodes are
//! launched on a [`JoinSet`]; each completion may make more nodes ready. The
//! terminal pair then runs under the [`RevisionController`].

use crate::cache::{CacheKey, CacheKeyInput, CachePolicyTable, ResultCache};
use crate::engine::context::RequestContext;
use crate::engine::graph::{DependencyGraph, NodeId};
use crate::engine::revision::{FinalThesis, RevisionController};
use crate::error::{GraphConfigurationError, ResearchError, Result, TransientTaskError};
use crate::metrics::{MetricsSummary, NodeMetrics};
use crate::nodes::output::NodeOutput;
use crate::nodes::{NodeInput, NodeRegistry, NodeRun, ResearchNode};
use chrono::Utc;
use research_llm::TokenUsage;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// Run a node body under a time budget
pub(crate) async fn run_body(
    body: &dyn ResearchNode,
    input: NodeInput,
    limit: Duration,
) -> std::result::Result<NodeRun, TransientTaskError> {
    match tokio::time::timeout(limit, body.run(input)).await {
        Ok(result) => result,
        Err(_) => Err(TransientTaskError::Timeout(limit)),
    }
}

/// Output and metrics of one launched node
#[derive(Debug)]
struct Launched {
    node: NodeId,
    output: NodeOutput,
    metrics: NodeMetrics,
}

impl Launched {
    /// Task panicked or was cancelled before producing an output
    fn aborted(node: NodeId, latency: Duration, err: &JoinError) -> Self {
        Self::failed(node, latency, &TransientTaskError::Panicked(err.to_string()))
    }

    fn failed(node: NodeId, latency: Duration, err: &TransientTaskError) -> Self {
        warn!(node = %node, error = %err, "Node degraded");
        Self {
            node,
            output: NodeOutput::unavailable(err.to_string()),
            metrics: NodeMetrics::executed(node, 1, latency, TokenUsage::default(), None),
        }
    }
}

/// Self-contained unit of work handed to a tokio task
struct Launch {
    node: NodeId,
    body: Arc<dyn ResearchNode>,
    input: NodeInput,
    cache: ResultCache,
    slot: Option<(CacheKey, Duration)>,
    timeout: Duration,
}

impl Launch {
    async fn run(self) -> Launched {
        let started = Instant::now();
        let attempt = self.input.attempt;

        if let Some((key, _)) = &self.slot {
            if let Some(hit) = self.cache.get(key).await {
                debug!(key = %key, "Cache hit");
                return Launched {
                    node: self.node,
                    output: hit,
                    metrics: NodeMetrics::cached(self.node, attempt, started.elapsed()),
                };
            }
            debug!(key = %key, "Cache miss");
        }

        match run_body(self.body.as_ref(), self.input, self.timeout).await {
            Ok(run) => {
                if run.output.is_cacheable() {
                    if let Some((key, ttl)) = self.slot {
                        self.cache.put(key, run.output.clone(), ttl).await;
                    }
                }
                Launched {
                    node: self.node,
                    metrics: NodeMetrics::executed(self.node, attempt, started.elapsed(), run.usage, run.model),
                    output: run.output,
                }
            }
            Err(err) => {
                warn!(node = %self.node, error = %err, "Node degraded");
                Launched {
                    node: self.node,
                    output: NodeOutput::unavailable(err.to_string()),
                    metrics: NodeMetrics::executed(self.node, attempt, started.elapsed(), TokenUsage::default(), None),
                }
            }
        }
    }
}

/// Graph executor shared by all requests of an engine
pub struct Scheduler {
    graph: Arc<DependencyGraph>,
    bodies: BTreeMap<NodeId, Arc<dyn ResearchNode>>,
    cache: ResultCache,
    policies: Arc<CachePolicyTable>,
    node_timeout: Duration,
    revision: RevisionController,
}

impl Scheduler {
    /// Resolve every graph node to its body
    pub fn new(
        graph: Arc<DependencyGraph>,
        registry: &NodeRegistry,
        cache: ResultCache,
        policies: Arc<CachePolicyTable>,
        node_timeout: Duration,
    ) -> std::result::Result<Self, GraphConfigurationError> {
        let bodies = graph
            .nodes()
            .map(|node| registry.require(node).map(|body| (node, body)))
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        let revision = RevisionController::new(
            registry.require(graph.synthesis())?,
            registry.require(graph.critique())?,
            graph.prerequisites(graph.synthesis()).clone(),
            node_timeout,
        );

        Ok(Self {
            graph,
            bodies,
            cache,
            policies,
            node_timeout,
            revision,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Drive one request to completion or early abort
    ///
    /// Returns a [`ResearchError::Validation`] when the entry gate rejects the
    /// subject; the context is then `aborted` and holds no outputs.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), subject = %ctx.subject()))]
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<(FinalThesis, MetricsSummary)> {
        let started = Instant::now();
        ctx.begin();
        info!(parameters = ?ctx.parameters(), "Research started");

        self.run_gate(ctx).await?;
        self.fan_out(ctx).await;

        let thesis = self.revision.run(ctx, self.graph.synthesis(), self.graph.critique()).await;

        let metrics = ctx.metrics().clone().with_wall_clock(started.elapsed());
        ctx.set_metrics(metrics.clone());
        ctx.complete();

        info!(
            approval = ?thesis.approval,
            revisions = ctx.revision_count(),
            cache_hits = metrics.cache_hits(),
            total_tokens = metrics.total_tokens().total,
            elapsed_ms = metrics.wall_clock().as_millis() as u64,
            "Research completed"
        );

        Ok((thesis, metrics))
    }

    async fn run_gate(&self, ctx: &mut RequestContext) -> Result<()> {
        let gate = self.graph.entry_gate();
        let started = Instant::now();

        let launched = match self.launch(gate, ctx) {
            Some(launch) => match tokio::spawn(launch.run().instrument(self.node_span(gate, ctx))).await {
                Ok(launched) => launched,
                Err(err) => Launched::aborted(gate, started.elapsed(), &err),
            },
            None => Launched::failed(gate, Duration::ZERO, &missing_body(gate)),
        };
        ctx.record_metrics(launched.metrics);

        let reason = match launched.output {
            NodeOutput::Profile(profile) => {
                ctx.set_profile(profile.clone());
                if let Err(err) = ctx.record_output(gate, NodeOutput::Profile(profile)) {
                    error!(error = %err, "Gate output written twice");
                }
                return Ok(());
            }
            NodeOutput::Rejected { reason } => reason,
            NodeOutput::Unavailable { reason } => format!("validation unavailable: {reason}"),
            other => format!("unexpected validation output: {}", other.render()),
        };

        ctx.abort();
        warn!(reason = %reason, "Subject rejected, aborting request");
        Err(ResearchError::Validation {
            subject: ctx.subject().to_string(),
            reason,
        })
    }

    async fn fan_out(&self, ctx: &mut RequestContext) {
        let mut pending = self.graph.fan_out_nodes();
        let mut completed = BTreeSet::from([self.graph.entry_gate()]);
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<task::Id, (NodeId, Instant)> = HashMap::new();

        loop {
            let ready: Vec<NodeId> = pending
                .iter()
                .copied()
                .filter(|node| self.graph.prerequisites(*node).is_subset(&completed))
                .collect();

            for node in ready {
                pending.remove(&node);
                let Some(launch) = self.launch(node, ctx) else {
                    self.absorb(ctx, Launched::failed(node, Duration::ZERO, &missing_body(node)));
                    completed.insert(node);
                    continue;
                };
                let handle = tasks.spawn(launch.run().instrument(self.node_span(node, ctx)));
                in_flight.insert(handle.id(), (node, Instant::now()));
            }

            debug!(in_flight = in_flight.len(), pending = pending.len(), "Ready set launched");

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };

            let launched = match joined {
                Ok((id, launched)) => {
                    in_flight.remove(&id);
                    launched
                }
                Err(err) => {
                    let Some((node, started)) = in_flight.remove(&err.id()) else {
                        error!(error = %err, "Unknown task finished");
                        continue;
                    };
                    Launched::aborted(node, started.elapsed(), &err)
                }
            };

            completed.insert(launched.node);
            self.absorb(ctx, launched);
        }

        if !pending.is_empty() {
            error!(?pending, "Nodes never became ready");
        }
    }

    fn absorb(&self, ctx: &mut RequestContext, launched: Launched) {
        debug!(
            node = %launched.node,
            cached = launched.metrics.served_from_cache,
            degraded = launched.output.is_unavailable(),
            "Node completed"
        );
        ctx.record_metrics(launched.metrics);
        if let Err(err) = ctx.record_output(launched.node, launched.output) {
            error!(error = %err, "Discarding duplicate node output");
        }
    }

    fn launch(&self, node: NodeId, ctx: &RequestContext) -> Option<Launch> {
        let body = Arc::clone(self.bodies.get(&node)?);
        let parameters = ctx.parameters();
        let key_input = CacheKeyInput {
            subject: ctx.subject(),
            parameters: &parameters,
            profile: ctx.profile(),
            now: Utc::now(),
        };

        let input = NodeInput {
            request_id: ctx.request_id(),
            subject: ctx.subject().clone(),
            parameters,
            profile: ctx.profile().cloned(),
            upstream: ctx.snapshot(self.graph.prerequisites(node)),
            attempt: 1,
            revision: None,
            candidate: None,
        };

        Some(Launch {
            node,
            body,
            input,
            cache: self.cache.clone(),
            slot: self.policies.key_for(node, &key_input),
            timeout: self.node_timeout,
        })
    }

    fn node_span(&self, node: NodeId, ctx: &RequestContext) -> tracing::Span {
        info_span!("node", node = %node, request_id = %ctx.request_id())
    }
}

// Bodies are resolved in `Scheduler::new`; a miss here means the graph and
// the resolved table disagree.
fn missing_body(node: NodeId) -> TransientTaskError {
    TransientTaskError::Panicked(format!("no body resolved for {node}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use crate::engine::context::{RequestStatus, Subject, TradeDirection, TradeDuration, TradeParameters};
    use crate::engine::testing::{Harness, INVALID_SUBJECT, ScriptedNode};
    use crate::nodes::MacroNode;
    use crate::nodes::generation::testing::{ScriptedProvider, generator};
    use crate::sources::MockDataSource;
    use tokio_test::{assert_err, assert_ok};

    fn context(subject: &str) -> RequestContext {
        RequestContext::new(Subject::new(subject), TradeParameters::default())
    }

    #[tokio::test]
    async fn test_rejected_subject_aborts_before_fan_out() {
        let harness = Harness::new([]);
        let engine = harness.engine();
        let mut ctx = context(INVALID_SUBJECT);

        let err = assert_err!(engine.execute(&mut ctx).await);

        assert!(matches!(err, ResearchError::Validation { ref subject, .. } if subject == INVALID_SUBJECT));
        assert_eq!(ctx.status(), RequestStatus::Aborted);
        assert!(ctx.outputs().is_empty());
        assert_eq!(engine.cache().writes(), 0);
        for node in NodeId::ALL.into_iter().filter(|node| *node != NodeId::Validation) {
            assert_eq!(harness.node(node).calls(), 0, "{node} ran after rejection");
        }
    }

    #[tokio::test]
    async fn test_failing_gate_aborts() {
        let harness = Harness::new([ScriptedNode::new(NodeId::Validation, |_| {
            Err(TransientTaskError::MalformedResponse("garbled".to_string()))
        })]);
        let mut ctx = context("AAPL");

        let err = assert_err!(harness.engine().execute(&mut ctx).await);

        assert!(err.to_string().contains("validation unavailable"));
        assert_eq!(harness.node(NodeId::Technical).calls(), 0);
    }

    #[tokio::test]
    async fn test_nodes_see_their_prerequisites() {
        let harness = Harness::new([]);
        let mut ctx = context("aapl");

        harness.engine().execute(&mut ctx).await.unwrap();

        let filings = harness.node(NodeId::Filings).inputs();
        assert!(filings[0].upstream.contains_key(&NodeId::Ingestion));
        assert_eq!(filings[0].profile.as_ref().map(|p| p.symbol.as_str()), Some("AAPL"));

        let technical = harness.node(NodeId::Technical).inputs();
        assert_eq!(technical[0].upstream.keys().copied().collect::<Vec<_>>(), vec![NodeId::Validation]);

        let synthesis = harness.node(NodeId::Synthesis).inputs();
        let upstream: Vec<_> = synthesis[0].upstream.keys().copied().collect();
        let mut expected = NodeId::ANALYSES.to_vec();
        expected.sort();
        assert_eq!(upstream, expected);
        assert_eq!(ctx.status(), RequestStatus::Completed);
    }

    #[tokio::test]
    async fn test_failing_node_degrades() {
        let harness = Harness::new([ScriptedNode::new(NodeId::Technical, |_| {
            Err(TransientTaskError::InsufficientData("12 sessions".to_string()))
        })]);
        let mut ctx = context("AAPL");

        let (thesis, _) = assert_ok!(harness.engine().execute(&mut ctx).await);

        assert!(thesis.is_approved());
        let technical = ctx.output(NodeId::Technical).unwrap();
        assert!(technical.is_unavailable());
        assert!(technical.render().contains("12 sessions"));
        assert!(!ctx.output(NodeId::Fundamental).unwrap().is_unavailable());

        let synthesis = harness.node(NodeId::Synthesis).inputs();
        assert!(synthesis[0].upstream[&NodeId::Technical].is_unavailable());
    }

    #[tokio::test]
    async fn test_panicking_node_degrades() {
        let harness = Harness::new([ScriptedNode::new(NodeId::Peer, |_| panic!("peer body exploded"))]);
        let mut ctx = context("AAPL");

        let (thesis, metrics) = assert_ok!(harness.engine().execute(&mut ctx).await);

        assert!(ctx.output(NodeId::Peer).unwrap().render().contains("task aborted"));
        assert!(metrics.get(NodeId::Peer, 1).is_some());
        assert_eq!(thesis.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_node_times_out() {
        let harness = Harness::new([ScriptedNode::standard(NodeId::Macro).delayed(Duration::from_secs(30))]);
        let config = ResearchConfig {
            node_timeout: Duration::from_secs(1),
            ..ResearchConfig::default()
        };
        let engine = harness.builder().config(config).build().unwrap();
        let mut ctx = context("AAPL");

        engine.execute(&mut ctx).await.unwrap();

        assert!(ctx.output(NodeId::Macro).unwrap().render().contains("timed out"));
        assert!(!ctx.output(NodeId::Headline).unwrap().is_unavailable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_nodes_run_concurrently() {
        let delay = Duration::from_secs(10);
        let harness = Harness::new(NodeId::ANALYSES.map(|node| ScriptedNode::standard(node).delayed(delay)));
        let mut ctx = context("AAPL");
        let started = Instant::now();

        harness.engine().execute(&mut ctx).await.unwrap();

        assert!(started.elapsed() < delay * 2, "analyses ran sequentially");
    }

    #[tokio::test]
    async fn test_replay_is_served_from_cache() {
        let harness = Harness::new([]);
        let engine = harness.engine();

        engine.execute(&mut context("AAPL")).await.unwrap();
        let cached_nodes = NodeId::ANALYSES.into_iter().chain([NodeId::Ingestion]);
        for node in cached_nodes.clone() {
            assert_eq!(harness.node(node).calls(), 1, "{node} did not run exactly once");
        }
        let writes = engine.cache().writes();
        let mut replay = context("AAPL");
        let (_, metrics) = engine.execute(&mut replay).await.unwrap();

        for node in cached_nodes {
            assert_eq!(harness.node(node).calls(), 1, "{node} re-ran on replay");
            assert!(metrics.get(node, 1).unwrap().served_from_cache, "{node} missed the cache");
        }
        assert_eq!(harness.node(NodeId::Validation).calls(), 2);
        assert_eq!(harness.node(NodeId::Synthesis).calls(), 2);
        assert_eq!(metrics.cache_hits(), 8);
        assert_eq!(engine.cache().writes(), writes);
        assert_eq!(replay.output(NodeId::Fundamental), Some(&crate::engine::testing::bullish()));
    }

    #[tokio::test]
    async fn test_degraded_output_is_not_cached() {
        let harness = Harness::new([ScriptedNode::new(NodeId::Headline, |_| {
            Err(TransientTaskError::MalformedResponse("no json".to_string()))
        })]);
        let engine = harness.engine();

        engine.execute(&mut context("AAPL")).await.unwrap();
        engine.execute(&mut context("AAPL")).await.unwrap();

        assert_eq!(harness.node(NodeId::Headline).calls(), 2);
        assert_eq!(harness.node(NodeId::Industry).calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_keys_separate_subjects() {
        let harness = Harness::new([]);
        let engine = harness.engine();

        engine.execute(&mut context("AAPL")).await.unwrap();
        engine.execute(&mut context("MSFT")).await.unwrap();

        assert_eq!(harness.node(NodeId::Industry).calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_keys_separate_trades() {
        let harness = Harness::new([]);
        let engine = harness.engine();
        let day = TradeParameters::new(TradeDirection::Long, TradeDuration::Day);
        let position = TradeParameters::new(TradeDirection::Long, TradeDuration::Position);

        engine.execute(&mut RequestContext::new(Subject::new("AAPL"), day)).await.unwrap();
        engine.execute(&mut RequestContext::new(Subject::new("AAPL"), position)).await.unwrap();

        for node in NodeId::ANALYSES {
            assert_eq!(harness.node(node).calls(), 2, "{node} reused another trade's output");
        }
        assert_eq!(harness.node(NodeId::Ingestion).calls(), 1);
    }

    #[tokio::test]
    async fn test_macro_analysis_follows_the_trade_not_the_subject() {
        let reply = r#"{"verdict": "NEUTRAL", "key_points": ["rates on hold"], "confidence": "Medium"}"#;
        let provider = ScriptedProvider::replying([reply, reply, reply]);
        let mut source = MockDataSource::new();
        source.expect_name().return_const("fred".to_string());
        source.expect_fetch().returning(|_| {
            Ok(serde_json::json!({ "indicators": [
                { "series_id": "CPIAUCSL", "label": "CPI", "value": 3.1, "date": "2026-09-01" }
            ] }))
        });
        let macro_node = MacroNode::new(Arc::new(source), generator(Arc::clone(&provider)));
        let engine = Harness::new([]).builder().node(Arc::new(macro_node)).build().unwrap();
        let prompts = || {
            provider
                .requests
                .lock()
                .unwrap()
                .iter()
                .map(|request| request.messages[0].content.clone())
                .collect::<Vec<_>>()
        };

        let aapl_day = TradeParameters::new(TradeDirection::Long, TradeDuration::Day);
        let msft_position = TradeParameters::new(TradeDirection::Short, TradeDuration::Position);
        engine.execute(&mut RequestContext::new(Subject::new("AAPL"), aapl_day)).await.unwrap();
        let mut msft = RequestContext::new(Subject::new("MSFT"), msft_position);
        let (_, metrics) = engine.execute(&mut msft).await.unwrap();

        let seen = prompts();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("Trade: long, day"));
        assert!(seen[1].starts_with("Trade: short, position"));
        assert!(seen.iter().all(|prompt| !prompt.contains("AAPL") && !prompt.contains("MSFT")));
        assert!(!metrics.get(NodeId::Macro, 1).unwrap().served_from_cache);

        // Same trade, other subject: the prompt would be identical
        let mut nvda = RequestContext::new(Subject::new("NVDA"), aapl_day);
        let (_, metrics) = engine.execute(&mut nvda).await.unwrap();
        assert_eq!(prompts().len(), 2);
        assert!(metrics.get(NodeId::Macro, 1).unwrap().served_from_cache);
    }
}
