//! Text generation shared by the analyst, synthesis and critique nodes

use super::NodeRun;
use super::output::{Analysis, Confidence, KeyPoint, NodeOutput, VerdictScale};
use crate::config::ResearchConfig;
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{AnalysisPrompt, PromptLibrary, user};
use crate::retry::RetryPolicy;
use research_llm::{CompletionRequest, LLMProvider, Message, TokenUsage};
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One completed generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
    /// Model as reported by the backend
    pub model: String,
}

/// Renders prompts and calls the text-generation backend for one node
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
    model: String,
    temperature: f32,
    max_tokens: Option<usize>,
    retry: RetryPolicy,
}

impl Generator {
    pub fn new(provider: Arc<dyn LLMProvider>, prompts: Arc<PromptLibrary>, model: impl Into<String>) -> Self {
        Self {
            provider,
            prompts,
            model: model.into(),
            temperature: 0.1,
            max_tokens: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Generator configured for `node`: the critic gets its own model and
    /// temperature, every node gets its preset token ceiling
    pub fn for_node(
        config: &ResearchConfig,
        node: NodeId,
        provider: Arc<dyn LLMProvider>,
        prompts: Arc<PromptLibrary>,
    ) -> Self {
        let (model, temperature) = if node == NodeId::Critique {
            (config.critic_model.as_str(), config.critic_temperature)
        } else {
            (config.model.as_str(), config.temperature)
        };

        Self::new(provider, prompts, model)
            .with_temperature(temperature)
            .with_max_tokens(config.max_output_tokens(node))
            .with_retry(RetryPolicy::from_config(config))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> Option<usize> {
        self.max_tokens
    }

    /// Render a registered template
    pub fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, TransientTaskError> {
        Ok(self.prompts.render(name, ctx)?)
    }

    /// Run one completion, retrying transient backend failures
    pub async fn generate(&self, system: String, prompt: String) -> Result<Generation, TransientTaskError> {
        let request = CompletionRequest::builder(self.model.as_str())
            .system(system)
            .add_message(Message::user(prompt))
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build();

        let response = self
            .retry
            .execute("text generation", || self.provider.complete(request.clone()))
            .await?;

        let text = response
            .message
            .text()
            .ok_or_else(|| TransientTaskError::MalformedResponse("empty completion".to_string()))?
            .to_string();

        debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Generation complete"
        );

        Ok(Generation {
            text,
            usage: response.usage,
            model: response.model,
        })
    }

    /// Render the analyst prompts, generate, and parse the answer on `scale`
    pub async fn analyze(
        &self,
        system: &str,
        prompt: &AnalysisPrompt,
        scale: VerdictScale,
    ) -> Result<NodeRun, TransientTaskError> {
        let generation = self
            .generate(self.render(system, prompt)?, self.render(user::ANALYSIS, prompt)?)
            .await?;
        let analysis = parse_analysis(&generation.text, scale)?;

        Ok(NodeRun::new(NodeOutput::Analysis(analysis)).with_generation(generation.usage, generation.model))
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

/// The outermost JSON object in a model answer, ignoring code fences and prose
pub fn json_payload(text: &str) -> Result<&str, TransientTaskError> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(TransientTaskError::MalformedResponse(
            "no JSON object in response".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    verdict: String,
    #[serde(default)]
    key_points: Vec<RawKeyPoint>,
    #[serde(default)]
    confidence: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawKeyPoint {
    Text(String),
    Cited {
        point: String,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        date: Option<String>,
    },
}

impl RawKeyPoint {
    fn into_key_point(self) -> Option<KeyPoint> {
        let (point, source, date) = match self {
            Self::Text(point) => (point, None, None),
            Self::Cited { point, source, date } => (point, source, date),
        };

        let point = point.trim();
        if point.is_empty() {
            return None;
        }

        Some(match source.filter(|source| !source.trim().is_empty()) {
            Some(source) => KeyPoint::cited(point, source.trim(), date.as_deref().map_or("undated", str::trim)),
            None => KeyPoint::new(point),
        })
    }
}

/// Parse an analyst answer; a verdict outside `scale` is malformed
///
/// Missing or unrecognized confidence is read as low.
pub fn parse_analysis(text: &str, scale: VerdictScale) -> Result<Analysis, TransientTaskError> {
    let raw: RawAnalysis = serde_json::from_str(json_payload(text)?)
        .map_err(|e| TransientTaskError::MalformedResponse(format!("invalid analysis JSON: {e}")))?;

    let verdict = scale.parse(&raw.verdict).ok_or_else(|| {
        TransientTaskError::MalformedResponse(format!("verdict '{}' is not on the expected scale", raw.verdict))
    })?;

    let key_points: Vec<KeyPoint> = raw
        .key_points
        .into_iter()
        .filter_map(RawKeyPoint::into_key_point)
        .collect();
    if key_points.is_empty() {
        return Err(TransientTaskError::MalformedResponse("analysis has no key points".to_string()));
    }

    let confidence = raw
        .confidence
        .as_deref()
        .and_then(Confidence::parse)
        .unwrap_or(Confidence::Low);

    Ok(Analysis {
        verdict,
        key_points,
        confidence,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted text-generation backend for node tests

    use super::*;
    use async_trait::async_trait;
    use research_llm::{CompletionResponse, LLMError, StopReason};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies in order and records every request
    #[derive(Default)]
    pub struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, LLMError>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        pub fn replying(replies: impl IntoIterator<Item = &'static str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(|reply| Ok(reply.to_string())).collect()),
                requests: Mutex::default(),
            })
        }

        pub fn failing(error: LLMError) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from([Err(error)])),
                requests: Mutex::default(),
            })
        }

        pub fn last_request(&self) -> CompletionRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, request: CompletionRequest) -> research_llm::Result<CompletionResponse> {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LLMError::UnexpectedResponse("script exhausted".to_string())))?;

            Ok(CompletionResponse {
                model,
                message: Message::assistant(reply),
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage {
                    input_tokens: 100,
                    output_tokens: 40,
                },
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Generator over `provider` with no retries
    pub fn generator(provider: Arc<ScriptedProvider>) -> Generator {
        let prompts = Arc::new(PromptLibrary::new().unwrap());
        Generator::new(provider, prompts, "test-model").with_retry(RetryPolicy::no_retry())
    }
}
