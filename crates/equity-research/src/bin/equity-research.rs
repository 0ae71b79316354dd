//! Equity research CLI
//!
//! Runs one research request and prints the reviewed thesis.
//!
//! # Usage
//!
//! ```bash
//! export OPENAI_API_KEY="sk-..."
//! export FRED_API_KEY="..."        # optional, macro analysis degrades without it
//! export FINNHUB_API_KEY="..."     # optional, news analyses degrade without it
//! export SEC_USER_AGENT="Name contact@example.com"
//!
//! cargo run --bin equity-research -- AAPL --direction long --duration swing
//! ```

use anyhow::Context;
use clap::{Parser, ValueEnum};
use comfy_table::{Table, presets::UTF8_FULL};
use equity_research::sources::{
    EdgarDocumentStore, FinnhubNewsSource, FredMacroSource, RetryingSource, SecEdgarClient, UnconfiguredSource,
    YahooMarketSource, YahooSubjectValidator,
};
use equity_research::{
    Collaborators, DataSource, ResearchConfig, ResearchEngine, ResearchReport, ResearchRequest, RetryPolicy,
    TokenPreset, TradeDirection, TradeDuration,
};
use research_llm::providers::OpenAIProvider;
use research_utils::{LogFormat, Settings, init_tracing_with};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "equity-research")]
#[command(about = "Research one stock and print a reviewed investment thesis", long_about = None)]
struct Args {
    /// Ticker symbol, e.g. AAPL
    subject: String,

    /// Side of the trade
    #[arg(long, value_enum, default_value_t = DirectionArg::Long)]
    direction: DirectionArg,

    /// Holding period of the trade
    #[arg(long, value_enum, default_value_t = DurationArg::Swing)]
    duration: DurationArg,

    /// Output token ceilings
    #[arg(long, value_enum)]
    preset: Option<PresetArg>,

    /// Model for analysis and synthesis
    #[arg(long)]
    model: Option<String>,

    /// Model for the critic
    #[arg(long)]
    critic_model: Option<String>,

    /// Log output format (plain or json)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DirectionArg {
    Long,
    Short,
}

impl From<DirectionArg> for TradeDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Long => Self::Long,
            DirectionArg::Short => Self::Short,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DurationArg {
    #[value(alias = "day_trade")]
    Day,
    #[value(alias = "swing_trade")]
    Swing,
    #[value(alias = "position_trade")]
    Position,
}

impl From<DurationArg> for TradeDuration {
    fn from(arg: DurationArg) -> Self {
        match arg {
            DurationArg::Day => Self::Day,
            DurationArg::Swing => Self::Swing,
            DurationArg::Position => Self::Position,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PresetArg {
    Economy,
    Standard,
    Premium,
    Unlimited,
}

impl From<PresetArg> for TokenPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Economy => Self::Economy,
            PresetArg::Standard => Self::Standard,
            PresetArg::Premium => Self::Premium,
            PresetArg::Unlimited => Self::Unlimited,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::from_env()?;
    if let Some(format) = args.log_format {
        settings.log_format = format;
    }
    init_tracing_with(&settings);

    let mut builder = ResearchConfig::builder().with_env()?;
    if let Some(model) = args.model {
        builder = builder.model(model);
    }
    if let Some(model) = args.critic_model {
        builder = builder.critic_model(model);
    }
    if let Some(preset) = args.preset {
        builder = builder.token_preset(preset.into());
    }
    let config = builder.build()?;

    let collaborators = collaborators(&config)?;
    let engine = ResearchEngine::builder()
        .config(config)
        .with_standard_nodes(collaborators)
        .build()?;

    info!(subject = %args.subject, direction = ?args.direction, duration = ?args.duration, "Starting research");

    let report = engine
        .research(ResearchRequest::new(args.subject, args.direction.into(), args.duration.into()))
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn collaborators(config: &ResearchConfig) -> anyhow::Result<Collaborators> {
    let retry = RetryPolicy::from_config(config);
    let retrying = |source: Arc<dyn DataSource>| -> Arc<dyn DataSource> {
        Arc::new(RetryingSource::new(source, retry.clone()))
    };

    let macro_data: Arc<dyn DataSource> = match &config.fred_api_key {
        Some(key) => retrying(Arc::new(FredMacroSource::new(key.clone(), None))),
        None => Arc::new(UnconfiguredSource::new("macro data (FRED_API_KEY)")),
    };
    let news: Arc<dyn DataSource> = match FinnhubNewsSource::from_env() {
        Some(source) => retrying(Arc::new(source)),
        None => Arc::new(UnconfiguredSource::new("news (FINNHUB_API_KEY)")),
    };

    let documents = EdgarDocumentStore::new(SecEdgarClient::from_env())?;
    let llm = OpenAIProvider::from_env().context("OpenAI provider is not configured")?;

    Ok(Collaborators {
        validator: Arc::new(YahooSubjectValidator::new()),
        market: retrying(Arc::new(YahooMarketSource::new())),
        macro_data,
        news,
        documents: Arc::new(documents),
        llm: Arc::new(llm),
    })
}

fn print_report(report: &ResearchReport) {
    let thesis = &report.final_output;

    println!("{} ({}, {})", report.subject, report.parameters.direction.as_str(), report.parameters.duration.as_str());
    println!();
    println!("{}", thesis.text);
    println!();
    println!("Review: {:?} after {} attempt(s)", thesis.approval, thesis.attempts);
    if let Some(feedback) = &thesis.last_feedback {
        println!("Last feedback: {feedback}");
    }

    let unavailable = report.unavailable_nodes();
    if !unavailable.is_empty() {
        let names: Vec<_> = unavailable.iter().map(|node| node.as_str()).collect();
        println!("Unavailable: {}", names.join(", "));
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Node", "Latency (ms)", "Input tokens", "Output tokens", "Model", "Cached"]);
    for (label, agent) in &report.metrics.agents {
        table.add_row(vec![
            label.clone(),
            format!("{:.1}", agent.latency_ms),
            agent.tokens.input.to_string(),
            agent.tokens.output.to_string(),
            agent.model.clone().unwrap_or_else(|| "-".to_string()),
            if agent.cached { "yes" } else { "no" }.to_string(),
        ]);
    }
    table.add_row(vec![
        "total".to_string(),
        format!("{:.1}", report.metrics.total_latency_ms),
        report.metrics.total_tokens.input.to_string(),
        report.metrics.total_tokens.output.to_string(),
        String::new(),
        format!("{} hit(s)", report.metrics.cache_hits),
    ]);

    println!();
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_flags_accept_wire_aliases() {
        let args = Args::try_parse_from(["equity-research", "AAPL", "--direction", "short", "--duration", "position_trade"])
            .unwrap();

        assert_eq!(TradeDirection::from(args.direction), TradeDirection::Short);
        assert_eq!(TradeDuration::from(args.duration), TradeDuration::Position);
        assert!(args.preset.is_none());
    }

    #[test]
    fn test_defaults_and_preset() {
        let args = Args::try_parse_from(["equity-research", "MSFT", "--preset", "economy"]).unwrap();

        assert_eq!(TradeDirection::from(args.direction), TradeDirection::Long);
        assert_eq!(TradeDuration::from(args.duration), TradeDuration::Swing);
        assert_eq!(args.preset.map(TokenPreset::from), Some(TokenPreset::Economy));
    }
}
