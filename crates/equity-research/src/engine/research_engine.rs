//! Research engine facade: wires configuration, collaborators and node bodies

use super::context::{RequestContext, Subject, TradeDirection, TradeDuration, TradeParameters};
use super::graph::{DependencyGraph, NodeId};
use super::result::ResearchReport;
use super::revision::FinalThesis;
use super::scheduler::Scheduler;
use crate::cache::ResultCache;
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::metrics::MetricsSummary;
use crate::nodes::{
    CritiqueNode, FilingsNode, FundamentalNode, Generator, HeadlineNode, IndustryNode, IngestionNode, MacroNode,
    NodeRegistry, PeerNode, ResearchNode, SynthesisNode, TechnicalNode, ValidationNode,
};
use crate::prompts::PromptLibrary;
use crate::sources::{DataSource, DocumentStore, SubjectValidator};
use research_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// One inbound research request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub subject: String,
    #[serde(flatten)]
    pub parameters: TradeParameters,
}

impl ResearchRequest {
    pub fn new(subject: impl Into<String>, direction: TradeDirection, duration: TradeDuration) -> Self {
        Self {
            subject: subject.into(),
            parameters: TradeParameters::new(direction, duration),
        }
    }
}

/// External capabilities the standard nodes depend on
#[derive(Clone)]
pub struct Collaborators {
    pub validator: Arc<dyn SubjectValidator>,
    /// Price history and valuation context
    pub market: Arc<dyn DataSource>,
    pub macro_data: Arc<dyn DataSource>,
    /// Company, industry and peer news
    pub news: Arc<dyn DataSource>,
    pub documents: Arc<dyn DocumentStore>,
    pub llm: Arc<dyn LLMProvider>,
}

/// Research engine shared by all requests
///
/// # Example
///
/// ```rust,ignore
/// use equity_research::{Collaborators, ResearchEngine, ResearchRequest, TradeDirection, TradeDuration};
///
/// let engine = ResearchEngine::builder()
///     .config(ResearchConfig::from_env()?)
///     .with_standard_nodes(collaborators)
///     .build()?;
///
/// let report = engine
///     .research(ResearchRequest::new("AAPL", TradeDirection::Long, TradeDuration::Swing))
///     .await?;
/// println!("{}", report.final_output.text);
/// ```
pub struct ResearchEngine {
    config: Arc<ResearchConfig>,
    scheduler: Scheduler,
}

impl ResearchEngine {
    pub fn builder() -> ResearchEngineBuilder {
        ResearchEngineBuilder::default()
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        self.scheduler.graph()
    }

    /// Result cache shared across requests
    pub fn cache(&self) -> &ResultCache {
        self.scheduler.cache()
    }

    /// Run one request end to end
    ///
    /// Fails only when the subject does not pass validation; degraded nodes
    /// show up as `unavailable` analyses in the report.
    #[instrument(skip_all, fields(subject = %request.subject))]
    pub async fn research(&self, request: ResearchRequest) -> Result<ResearchReport> {
        let mut ctx = RequestContext::new(Subject::new(&request.subject), request.parameters);
        let (thesis, metrics) = self.execute(&mut ctx).await?;
        Ok(ResearchReport::from_context(&ctx, thesis, &metrics))
    }

    /// Drive a caller-owned context through the graph
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<(FinalThesis, MetricsSummary)> {
        self.scheduler.execute(ctx).await
    }
}

/// Builder for [`ResearchEngine`]
#[derive(Default)]
pub struct ResearchEngineBuilder {
    config: Option<ResearchConfig>,
    graph: Option<DependencyGraph>,
    cache: Option<ResultCache>,
    collaborators: Option<Collaborators>,
    nodes: Vec<Arc<dyn ResearchNode>>,
}

impl ResearchEngineBuilder {
    pub fn config(mut self, config: ResearchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the standard graph shape
    pub fn graph(mut self, graph: DependencyGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Share an existing cache, e.g. between engines in tests
    pub fn cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register the standard body of every node over `collaborators`
    pub fn with_standard_nodes(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Register one node body; it replaces the standard body for its node
    pub fn node(mut self, node: Arc<dyn ResearchNode>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn build(self) -> Result<ResearchEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let graph = match self.graph {
            Some(graph) => graph,
            None => DependencyGraph::standard()?,
        };

        let mut registry = match self.collaborators {
            Some(collaborators) => standard_registry(&config, collaborators)?,
            None => NodeRegistry::new(),
        };
        for node in self.nodes {
            registry.register(node);
        }
        registry.ensure_covers(&graph)?;

        let cache = self.cache.unwrap_or_else(|| ResultCache::new(config.cache_capacity));
        let scheduler = Scheduler::new(
            Arc::new(graph),
            &registry,
            cache,
            Arc::new(config.cache_policies.clone()),
            config.node_timeout,
        )?;

        info!(
            nodes = registry.len(),
            model = %config.model,
            critic_model = %config.critic_model,
            preset = ?config.token_preset,
            "Research engine ready"
        );

        Ok(ResearchEngine {
            config: Arc::new(config),
            scheduler,
        })
    }
}

fn standard_registry(config: &ResearchConfig, collaborators: Collaborators) -> Result<NodeRegistry> {
    let prompts = Arc::new(
        PromptLibrary::new().map_err(|e| ResearchError::Config(format!("invalid prompt template: {e}")))?,
    );
    let Collaborators {
        validator,
        market,
        macro_data,
        news,
        documents,
        llm,
    } = collaborators;
    let generator = |node: NodeId| Generator::for_node(config, node, Arc::clone(&llm), Arc::clone(&prompts));

    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(ValidationNode::new(validator)?));
    registry.register(Arc::new(IngestionNode::new(Arc::clone(&documents))));
    registry.register(Arc::new(FilingsNode::new(
        documents,
        generator(NodeId::Filings),
        config.filings_top_k,
    )));
    registry.register(Arc::new(FundamentalNode::new(Arc::clone(&market), generator(NodeId::Fundamental))));
    registry.register(Arc::new(TechnicalNode::new(market, generator(NodeId::Technical))));
    registry.register(Arc::new(MacroNode::new(macro_data, generator(NodeId::Macro))));
    registry.register(Arc::new(IndustryNode::new(Arc::clone(&news), generator(NodeId::Industry))));
    registry.register(Arc::new(PeerNode::new(Arc::clone(&news), generator(NodeId::Peer))));
    registry.register(Arc::new(HeadlineNode::new(news, generator(NodeId::Headline))));
    registry.register(Arc::new(SynthesisNode::new(generator(NodeId::Synthesis))));
    registry.register(Arc::new(CritiqueNode::new(generator(NodeId::Critique))));

    Ok(registry)
}
