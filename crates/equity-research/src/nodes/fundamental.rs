//! Valuation view from market-derived fundamentals

use super::generation::Generator;
use super::output::{SubjectProfile, VerdictScale};
use super::{NodeInput, NodeRun, ResearchNode};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{AnalysisPrompt, system};
use crate::sources::{DataSource, FetchQuery, MarketSnapshot, decode};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::fmt::Write;
use std::sync::Arc;

/// Earnings closer than this are flagged as imminent
const IMMINENT_EARNINGS_DAYS: i64 = 7;

pub struct FundamentalNode {
    market: Arc<dyn DataSource>,
    generator: Generator,
}

impl FundamentalNode {
    pub fn new(market: Arc<dyn DataSource>, generator: Generator) -> Self {
        Self { market, generator }
    }
}

#[async_trait]
impl ResearchNode for FundamentalNode {
    fn id(&self) -> NodeId {
        NodeId::Fundamental
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let query = FetchQuery::Fundamentals {
            symbol: input.subject.as_str().to_string(),
        };
        let snapshot: MarketSnapshot = decode(self.market.name(), self.market.fetch(&query).await?)?;

        let data = describe(&snapshot, &input.profile_or_subject(), Utc::now().date_naive());
        let prompt = AnalysisPrompt::new(&input, VerdictScale::Valuation, "Valuation context", data);

        self.generator
            .analyze(system::FUNDAMENTAL, &prompt, VerdictScale::Valuation)
            .await
    }
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:+.1}%"))
}

fn describe(snapshot: &MarketSnapshot, profile: &SubjectProfile, today: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Last price: {:.2}", snapshot.last_price);

    let _ = write!(out, "52-week range: {:.2} - {:.2}", snapshot.low_52w, snapshot.high_52w);
    let span = snapshot.high_52w - snapshot.low_52w;
    if span > 0.0 {
        let position = (snapshot.last_price - snapshot.low_52w) / span * 100.0;
        let _ = write!(out, " (price at {position:.0}% of range)");
    }
    out.push('\n');

    let _ = writeln!(out, "52-week change: {}", percent(Some(snapshot.change_52w_pct)));
    let _ = writeln!(out, "90-day change: {}", percent(snapshot.change_90d_pct));
    let _ = writeln!(out, "Average daily volume (30 sessions): {:.0}", snapshot.avg_volume_30d);
    let _ = write!(
        out,
        "Realized volatility (30 sessions, annualized): {}",
        snapshot
            .volatility_30d_pct
            .map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}%"))
    );

    if let Some(date) = profile.next_earnings {
        let days = (date - today).num_days();
        let _ = write!(out, "\nNext earnings: {date} (in {days} days)");
        if profile.earnings_within(today, IMMINENT_EARNINGS_DAYS) {
            out.push_str(", imminent");
        }
    }

    out
}
