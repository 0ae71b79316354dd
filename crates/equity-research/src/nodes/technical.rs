//! Price trend and momentum from daily indicators

use super::generation::Generator;
use super::output::VerdictScale;
use super::{NodeInput, NodeRun, ResearchNode};
use crate::engine::graph::NodeId;
use crate::error::TransientTaskError;
use crate::prompts::{AnalysisPrompt, system};
use crate::sources::{DataSource, FetchQuery, PriceBar, decode};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, FastStochastic, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};

/// Calendar days of history requested, enough for a 200-session average
const HISTORY_DAYS: u32 = 400;

/// Sessions below which indicators are not meaningful
const MIN_SESSIONS: usize = 50;

impl ta::High for PriceBar {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for PriceBar {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for PriceBar {
    fn close(&self) -> f64 {
        self.close
    }
}

fn setup_error(e: impl fmt::Display) -> TransientTaskError {
    TransientTaskError::InsufficientData(format!("indicator setup failed: {e}"))
}

/// Latest value of every indicator over a price history
#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalSnapshot {
    pub sessions: usize,
    pub last_close: f64,
    pub rsi_14: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    /// Present once 200 sessions are available
    pub sma_200: Option<f64>,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub atr_14: f64,
    pub stochastic_k: f64,
}

impl TechnicalSnapshot {
    pub fn compute(bars: &[PriceBar]) -> Result<Self, TransientTaskError> {
        if bars.len() < MIN_SESSIONS {
            return Err(TransientTaskError::InsufficientData(format!(
                "{} sessions of price history, need {MIN_SESSIONS}",
                bars.len()
            )));
        }

        let mut rsi = RelativeStrengthIndex::new(14).map_err(setup_error)?;
        let mut sma_20 = SimpleMovingAverage::new(20).map_err(setup_error)?;
        let mut sma_50 = SimpleMovingAverage::new(50).map_err(setup_error)?;
        let mut sma_200 = SimpleMovingAverage::new(200).map_err(setup_error)?;
        let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(setup_error)?;
        let mut bollinger = BollingerBands::new(20, 2.0).map_err(setup_error)?;
        let mut atr = AverageTrueRange::new(14).map_err(setup_error)?;
        let mut stochastic = FastStochastic::new(14).map_err(setup_error)?;

        let mut snapshot = Self {
            sessions: bars.len(),
            last_close: 0.0,
            rsi_14: 0.0,
            sma_20: 0.0,
            sma_50: 0.0,
            sma_200: None,
            macd: 0.0,
            macd_signal: 0.0,
            macd_histogram: 0.0,
            bollinger_upper: 0.0,
            bollinger_middle: 0.0,
            bollinger_lower: 0.0,
            atr_14: 0.0,
            stochastic_k: 0.0,
        };

        let mut long_average = 0.0;
        for bar in bars {
            snapshot.last_close = bar.close;
            snapshot.rsi_14 = rsi.next(bar.close);
            snapshot.sma_20 = sma_20.next(bar.close);
            snapshot.sma_50 = sma_50.next(bar.close);
            long_average = sma_200.next(bar.close);

            let m = macd.next(bar.close);
            (snapshot.macd, snapshot.macd_signal, snapshot.macd_histogram) = (m.macd, m.signal, m.histogram);

            let bands = bollinger.next(bar.close);
            (snapshot.bollinger_upper, snapshot.bollinger_middle, snapshot.bollinger_lower) =
                (bands.upper, bands.average, bands.lower);

            snapshot.atr_14 = atr.next(bar);
            snapshot.stochastic_k = stochastic.next(bar);
        }
        snapshot.sma_200 = (bars.len() >= 200).then_some(long_average);

        Ok(snapshot)
    }

    pub fn rsi_signal(&self) -> &'static str {
        if self.rsi_14 > 70.0 {
            "overbought"
        } else if self.rsi_14 < 30.0 {
            "oversold"
        } else {
            "neutral"
        }
    }

    fn bollinger_signal(&self) -> &'static str {
        if self.last_close > self.bollinger_upper {
            "overbought"
        } else if self.last_close < self.bollinger_lower {
            "oversold"
        } else {
            "neutral"
        }
    }

    /// Mean of the individual signals, from -1 (bearish) to 1 (bullish)
    pub fn score(&self) -> f64 {
        let signal = |bullish: bool| if bullish { 1.0 } else { -1.0 };
        let band = |label: &str| match label {
            "oversold" => 1.0,
            "overbought" => -1.0,
            _ => 0.0,
        };

        let mut signals = vec![
            band(self.rsi_signal()),
            signal(self.last_close > self.sma_50),
            signal(self.macd > self.macd_signal),
            band(self.bollinger_signal()),
        ];
        if let Some(sma_200) = self.sma_200 {
            signals.push(signal(self.last_close > sma_200));
        }

        signals.iter().sum::<f64>() / signals.len() as f64
    }
}

impl fmt::Display for TechnicalSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |average: f64| if self.last_close > average { "above" } else { "below" };

        writeln!(f, "Sessions analysed: {}", self.sessions)?;
        writeln!(f, "Last close: {:.2}", self.last_close)?;
        writeln!(f, "RSI (14): {:.1} ({})", self.rsi_14, self.rsi_signal())?;
        writeln!(f, "Stochastic %K (14): {:.1}", self.stochastic_k)?;
        writeln!(f, "SMA (20): {:.2}, price {}", self.sma_20, side(self.sma_20))?;
        writeln!(f, "SMA (50): {:.2}, price {}", self.sma_50, side(self.sma_50))?;
        match self.sma_200 {
            Some(sma_200) => writeln!(f, "SMA (200): {sma_200:.2}, price {}", side(sma_200))?,
            None => writeln!(f, "SMA (200): n/a, fewer than 200 sessions")?,
        }
        writeln!(
            f,
            "MACD (12, 26, 9): {:.3}, signal {:.3}, histogram {:.3}",
            self.macd, self.macd_signal, self.macd_histogram
        )?;
        writeln!(
            f,
            "Bollinger Bands (20, 2): lower {:.2}, middle {:.2}, upper {:.2} ({})",
            self.bollinger_lower,
            self.bollinger_middle,
            self.bollinger_upper,
            self.bollinger_signal()
        )?;
        writeln!(f, "ATR (14): {:.2}", self.atr_14)?;
        write!(f, "Overall signal score: {:+.2}", self.score())
    }
}

pub struct TechnicalNode {
    market: Arc<dyn DataSource>,
    generator: Generator,
}

impl TechnicalNode {
    pub fn new(market: Arc<dyn DataSource>, generator: Generator) -> Self {
        Self { market, generator }
    }
}

#[async_trait]
impl ResearchNode for TechnicalNode {
    fn id(&self) -> NodeId {
        NodeId::Technical
    }

    async fn run(&self, input: NodeInput) -> Result<NodeRun, TransientTaskError> {
        let query = FetchQuery::PriceHistory {
            symbol: input.subject.as_str().to_string(),
            days: HISTORY_DAYS,
        };
        let bars: Vec<PriceBar> = decode(self.market.name(), self.market.fetch(&query).await?)?;
        let snapshot = TechnicalSnapshot::compute(&bars)?;

        let prompt = AnalysisPrompt::new(
            &input,
            VerdictScale::Directional,
            "Technical indicators (daily)",
            snapshot.to_string(),
        );
        self.generator
            .analyze(system::TECHNICAL, &prompt, VerdictScale::Directional)
            .await
    }
}
