//! Prompt templates for research nodes
//!
//! Templates are organized into:
//! - `system`: system prompts, one per node kind
//! - `user`: user message templates filled from the node input
//!
//! All templates live in one [`PromptLibrary`] so system prompts can
//! `{% include %}` the shared analyst response contract.

pub mod system;
pub mod user;

use crate::nodes::NodeInput;
use crate::nodes::output::VerdictScale;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use minijinja::Environment;
use serde::Serialize;

/// Registered prompt templates
#[derive(Debug)]
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    /// Register all system and user templates
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for (name, source) in system::TEMPLATES.iter().chain(user::TEMPLATES) {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Render the template `name` with `ctx`
    pub fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }

    /// Whether a template with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }
}

/// Subject and trade fields shared by every prompt
#[derive(Debug, Clone, Serialize)]
pub struct SubjectContext {
    pub symbol: String,
    pub company: String,
    pub industry: Option<String>,
    pub direction: &'static str,
    pub duration: &'static str,
    pub horizon_days: u32,
    pub emphasis: &'static str,
    pub today: NaiveDate,
}

impl SubjectContext {
    pub fn from_input(input: &NodeInput) -> Self {
        let profile = input.profile_or_subject();
        Self {
            company: profile.display_name().to_string(),
            symbol: profile.symbol,
            industry: profile.industry,
            direction: input.parameters.direction.as_str(),
            duration: input.parameters.duration.as_str(),
            horizon_days: input.parameters.duration.horizon_days(),
            emphasis: input.parameters.duration.emphasis(),
            today: Utc::now().date_naive(),
        }
    }
}

/// Context of the analyst templates
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPrompt {
    #[serde(flatten)]
    pub subject: SubjectContext,
    /// Allowed verdict labels, e.g. `BULLISH / BEARISH / NEUTRAL`
    pub labels: String,
    /// Key points must carry a source and date
    pub cited: bool,
    /// Oldest date the analyst may consider
    pub cutoff: Option<NaiveDate>,
    /// Leave the company out; the data does not depend on it
    pub market_wide: bool,
    pub data_title: String,
    pub data: String,
}

impl AnalysisPrompt {
    pub fn new(input: &NodeInput, scale: VerdictScale, data_title: impl Into<String>, data: impl Into<String>) -> Self {
        let labels = scale
            .labels()
            .iter()
            .map(|verdict| verdict.label())
            .collect::<Vec<_>>()
            .join(" / ");

        Self {
            subject: SubjectContext::from_input(input),
            labels,
            cited: false,
            cutoff: None,
            market_wide: false,
            data_title: data_title.into(),
            data: data.into(),
        }
    }

    /// Require citations on every key point
    pub fn cited(mut self) -> Self {
        self.cited = true;
        self
    }

    /// Omit the company so the prompt is identical for every subject
    pub fn market_wide(mut self) -> Self {
        self.market_wide = true;
        self
    }

    /// Restrict the analyst to the last `days` days
    pub fn within_days(mut self, days: u32) -> Self {
        self.cutoff = Some(self.subject.today - ChronoDuration::days(i64::from(days)));
        self
    }
}

/// One analysis handed to the synthesis prompt
#[derive(Debug, Clone, Serialize)]
pub struct NamedAnalysis {
    pub name: &'static str,
    pub text: String,
}

/// Context of the synthesis and revision templates
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisPrompt {
    #[serde(flatten)]
    pub subject: SubjectContext,
    pub analyses: Vec<NamedAnalysis>,
    pub previous_draft: Option<String>,
    pub feedback: Option<String>,
}

/// Context of the critique template
#[derive(Debug, Clone, Serialize)]
pub struct CritiquePrompt {
    pub duration: &'static str,
    pub draft: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{Subject, TradeDirection, TradeDuration, TradeParameters};

    fn input() -> NodeInput {
        NodeInput::new(
            Subject::new("aapl"),
            TradeParameters::new(TradeDirection::Long, TradeDuration::Position),
        )
    }

    #[test]
    fn test_all_templates_registered() {
        let library = PromptLibrary::new().unwrap();
        for name in [
            system::FUNDAMENTAL,
            system::TECHNICAL,
            system::MACRO,
            system::INDUSTRY,
            system::PEER,
            system::HEADLINE,
            system::FILINGS,
            system::SYNTHESIS,
            system::CRITIQUE,
            user::ANALYSIS,
            user::SYNTHESIS,
            user::REVISION,
            user::CRITIQUE,
        ] {
            assert!(library.contains(name), "{name} is not registered");
        }
        assert!(!library.contains("research.system.unknown"));
    }

    #[test]
    fn test_analyst_prompt_includes_response_contract() {
        let library = PromptLibrary::new().unwrap();
        let ctx = AnalysisPrompt::new(&input(), VerdictScale::Relative, "Peer news", "none").cited();

        let system = library.render(system::PEER, &ctx).unwrap();
        assert!(system.contains("POSITIVE / NEGATIVE / NEUTRAL"));
        assert!(system.contains("MUST carry the source and date"));

        let user = library.render(user::ANALYSIS, &ctx).unwrap();
        assert!(user.contains("Company: AAPL (AAPL)"));
        assert!(user.contains("Trade: long, position (about 120 days)"));
        assert!(!user.contains("Cutoff date"));
    }

    #[test]
    fn test_cutoff_is_rendered() {
        let library = PromptLibrary::new().unwrap();
        let ctx = AnalysisPrompt::new(&input(), VerdictScale::Directional, "Headlines", "none").within_days(30);
        let expected = ctx.subject.today - ChronoDuration::days(30);

        let user = library.render(user::ANALYSIS, &ctx).unwrap();
        assert!(user.contains(&format!("Cutoff date: {expected}")));
    }

    #[test]
    fn test_market_wide_prompt_omits_company() {
        let library = PromptLibrary::new().unwrap();
        let msft = NodeInput::new(
            Subject::new("msft"),
            TradeParameters::new(TradeDirection::Long, TradeDuration::Position),
        );
        let aapl_ctx = AnalysisPrompt::new(&input(), VerdictScale::Directional, "Macro", "CPI 3.1").market_wide();
        let msft_ctx = AnalysisPrompt::new(&msft, VerdictScale::Directional, "Macro", "CPI 3.1").market_wide();

        let aapl = library.render(user::ANALYSIS, &aapl_ctx).unwrap();
        assert!(aapl.starts_with("Trade: long, position (about 120 days)"));
        assert!(!aapl.contains("AAPL"));
        assert_eq!(aapl, library.render(user::ANALYSIS, &msft_ctx).unwrap());
        assert_eq!(
            library.render(system::MACRO, &aapl_ctx).unwrap(),
            library.render(system::MACRO, &msft_ctx).unwrap()
        );
    }

    #[test]
    fn test_revision_prompt_carries_feedback() {
        let library = PromptLibrary::new().unwrap();
        let ctx = SynthesisPrompt {
            subject: SubjectContext::from_input(&input()),
            analyses: vec![NamedAnalysis {
                name: "technical",
                text: "[BULLISH]".to_string(),
            }],
            previous_draft: Some("First draft".to_string()),
            feedback: Some("Weights do not sum to 100".to_string()),
        };

        let prompt = library.render(user::REVISION, &ctx).unwrap();
        assert!(prompt.contains("## TECHNICAL SENTIMENT"));
        assert!(prompt.contains("Your original response:\nFirst draft"));
        assert!(prompt.contains("Revise your response based on this feedback:\nWeights do not sum to 100"));
    }
}
