//! Configuration for research runs

use crate::cache::CachePolicyTable;
use crate::engine::graph::NodeId;
use crate::error::{ResearchError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Output token ceilings per node class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPreset {
    /// Half of standard
    Economy,
    #[default]
    Standard,
    /// Double of standard
    Premium,
    /// No ceiling sent to the model
    Unlimited,
}

impl TokenPreset {
    /// Max output tokens for `node`; `None` means no ceiling
    pub fn max_output_tokens(self, node: NodeId) -> Option<usize> {
        let standard = match node {
            NodeId::Synthesis => 4096,
            NodeId::Critique => 1024,
            node if node.is_analysis() => 2048,
            _ => return None,
        };

        match self {
            Self::Economy => Some(standard / 2),
            Self::Standard => Some(standard),
            Self::Premium => Some(standard * 2),
            Self::Unlimited => None,
        }
    }
}

impl FromStr for TokenPreset {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "economy" => Ok(Self::Economy),
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            "unlimited" => Ok(Self::Unlimited),
            other => Err(ResearchError::Config(format!("unknown token preset '{other}'"))),
        }
    }
}

/// Configuration for the research engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Model used by analysis and synthesis nodes
    pub model: String,

    /// Model used by the critic
    pub critic_model: String,

    /// Sampling temperature for analysis and synthesis
    pub temperature: f32,

    /// Sampling temperature for the critic
    pub critic_temperature: f32,

    /// Output token ceilings
    pub token_preset: TokenPreset,

    /// Time budget of a single node run
    pub node_timeout: Duration,

    /// Maximum attempts for collaborator calls
    pub max_retries: u32,

    /// Initial backoff duration for retries
    pub retry_backoff_base: Duration,

    /// Result cache capacity in entries
    pub cache_capacity: usize,

    /// Filing excerpts retrieved per search topic
    pub filings_top_k: usize,

    /// FRED API key (optional; macro analysis degrades without it)
    pub fred_api_key: Option<String>,

    /// Cache key function and TTL per node
    #[serde(skip)]
    pub cache_policies: CachePolicyTable,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            critic_model: "gpt-4o".to_string(),
            temperature: 0.1,
            critic_temperature: 0.0,
            token_preset: TokenPreset::Standard,
            node_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_backoff_base: Duration::from_millis(500),
            cache_capacity: 1024,
            filings_top_k: 3,
            fred_api_key: None,
            cache_policies: CachePolicyTable::standard(),
        }
    }
}

impl ResearchConfig {
    /// Create a new configuration builder
    pub fn builder() -> ResearchConfigBuilder {
        ResearchConfigBuilder::default()
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self::builder().with_env()?.build()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() || self.critic_model.trim().is_empty() {
            return Err(ResearchError::Config("model names must not be empty".to_string()));
        }

        if self.max_retries == 0 {
            return Err(ResearchError::Config("max_retries must be greater than 0".to_string()));
        }

        if self.node_timeout.is_zero() {
            return Err(ResearchError::Config("node_timeout must be greater than 0".to_string()));
        }

        if self.cache_capacity == 0 {
            return Err(ResearchError::Config("cache_capacity must be greater than 0".to_string()));
        }

        if self.filings_top_k == 0 {
            return Err(ResearchError::Config("filings_top_k must be greater than 0".to_string()));
        }

        if !(0.0..=2.0).contains(&self.temperature) || !(0.0..=2.0).contains(&self.critic_temperature) {
            return Err(ResearchError::Config("temperature must be within 0.0..=2.0".to_string()));
        }

        Ok(())
    }

    /// Get retry backoff duration for attempt number
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff_base * 2_u32.pow(attempt)
    }

    /// Max output tokens for `node` under the configured preset
    pub fn max_output_tokens(&self, node: NodeId) -> Option<usize> {
        self.token_preset.max_output_tokens(node)
    }
}

/// Builder for ResearchConfig
#[derive(Debug, Default)]
pub struct ResearchConfigBuilder {
    model: Option<String>,
    critic_model: Option<String>,
    temperature: Option<f32>,
    critic_temperature: Option<f32>,
    token_preset: Option<TokenPreset>,
    node_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    cache_capacity: Option<usize>,
    filings_top_k: Option<usize>,
    fred_api_key: Option<String>,
    cache_policies: Option<CachePolicyTable>,
}

impl ResearchConfigBuilder {
    /// Set the analysis and synthesis model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the critic model
    pub fn critic_model(mut self, model: impl Into<String>) -> Self {
        self.critic_model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn critic_temperature(mut self, temperature: f32) -> Self {
        self.critic_temperature = Some(temperature);
        self
    }

    /// Set the token preset
    pub fn token_preset(mut self, preset: TokenPreset) -> Self {
        self.token_preset = Some(preset);
        self
    }

    /// Set the per-node time budget
    pub fn node_timeout(mut self, duration: Duration) -> Self {
        self.node_timeout = Some(duration);
        self
    }

    /// Set maximum retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set retry backoff base duration
    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn filings_top_k(mut self, top_k: usize) -> Self {
        self.filings_top_k = Some(top_k);
        self
    }

    /// Set FRED API key
    pub fn fred_api_key(mut self, key: impl Into<String>) -> Self {
        self.fred_api_key = Some(key.into());
        self
    }

    /// Replace the cache policy table
    pub fn cache_policies(mut self, policies: CachePolicyTable) -> Self {
        self.cache_policies = Some(policies);
        self
    }

    /// Load overrides from environment
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(model) = std::env::var("EQUITY_RESEARCH_MODEL") {
            self.model = Some(model);
        }
        if let Ok(model) = std::env::var("EQUITY_RESEARCH_CRITIC_MODEL") {
            self.critic_model = Some(model);
        }
        if let Ok(preset) = std::env::var("EQUITY_RESEARCH_TOKEN_PRESET") {
            self.token_preset = Some(preset.parse()?);
        }
        if let Ok(secs) = std::env::var("EQUITY_RESEARCH_NODE_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ResearchError::Config(format!("EQUITY_RESEARCH_NODE_TIMEOUT_SECS is not a number: '{secs}'"))
            })?;
            self.node_timeout = Some(Duration::from_secs(secs));
        }
        if let Ok(key) = std::env::var("FRED_API_KEY") {
            if !key.trim().is_empty() {
                self.fred_api_key = Some(key);
            }
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<ResearchConfig> {
        let defaults = ResearchConfig::default();

        let config = ResearchConfig {
            model: self.model.unwrap_or(defaults.model),
            critic_model: self.critic_model.unwrap_or(defaults.critic_model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            critic_temperature: self.critic_temperature.unwrap_or(defaults.critic_temperature),
            token_preset: self.token_preset.unwrap_or(defaults.token_preset),
            node_timeout: self.node_timeout.unwrap_or(defaults.node_timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            cache_capacity: self.cache_capacity.unwrap_or(defaults.cache_capacity),
            filings_top_k: self.filings_top_k.unwrap_or(defaults.filings_top_k),
            fred_api_key: self.fred_api_key,
            cache_policies: self.cache_policies.unwrap_or(defaults.cache_policies),
        };

        config.validate()?;
        Ok(config)
    }
}
