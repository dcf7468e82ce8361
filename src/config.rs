use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    advisor::{aggregate::DecisionLabel, profile::InvestmentHorizon},
    error::{AdvisorError, AugurError, AugurResult},
};

/// ε below which `DIV_SAFE` refuses to divide.
pub const DEFAULT_DIV_SAFE_EPSILON: f64 = 1e-9;

// ================================================================================================
// Aggregation Modes
// ================================================================================================

/// How decision scores are folded into one raw score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DecisionAggregation {
    #[default]
    Mean,
    Median,
    Max,
    /// Weighted by each rule's historical confidence (1.0 when absent).
    WeightedMean,
}

/// How risk and opportunity scores are folded. The default is `Max` for
/// both: worst-case risk and best-case opportunity win, extremes do not
/// cancel against quieter rules.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExtremeAggregation {
    #[default]
    Max,
    Mean,
}

// ================================================================================================
// Config Blocks
// ================================================================================================

/// Label cut-points. Buckets are closed-left, open-right, except the top
/// bucket which is closed on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Four ascending cuts partitioning `[-1, 1]` into
    /// STRONG_SELL / SELL / HOLD / BUY / STRONG_BUY.
    pub decision: Vec<f64>,
    /// Two ascending cuts partitioning `[0, 1]` into LOW / MODERATE / HIGH.
    pub risk: Vec<f64>,
    /// Two ascending cuts partitioning `[0, 1]` into LOW / INTERESTING / STRONG.
    pub opportunity: Vec<f64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            decision: vec![-0.6, -0.2, 0.2, 0.6],
            risk: vec![0.33, 0.66],
            opportunity: vec![0.33, 0.66],
        }
    }
}

/// Trading-action constants. Data, not code: tuning these requires no
/// engine change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Base position size per decision label, as a fraction of capital.
    pub base_size: BTreeMap<DecisionLabel, f64>,
    /// Base take-profit distance per investment horizon.
    pub base_tp: BTreeMap<InvestmentHorizon, f64>,
    /// Base stop-loss distance per investment horizon.
    pub base_sl: BTreeMap<InvestmentHorizon, f64>,
    /// Opportunity elasticity of the take-profit distance.
    pub k: f64,
    /// Risk elasticity of the stop-loss distance.
    pub k_prime: f64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            base_size: BTreeMap::from([
                (DecisionLabel::StrongSell, 0.5),
                (DecisionLabel::Sell, 0.3),
                (DecisionLabel::Hold, 0.0),
                (DecisionLabel::Buy, 0.3),
                (DecisionLabel::StrongBuy, 0.5),
            ]),
            base_tp: BTreeMap::from([
                (InvestmentHorizon::Intraday, 0.01),
                (InvestmentHorizon::Swing, 0.03),
                (InvestmentHorizon::Position, 0.08),
                (InvestmentHorizon::LongTerm, 0.15),
            ]),
            base_sl: BTreeMap::from([
                (InvestmentHorizon::Intraday, 0.005),
                (InvestmentHorizon::Swing, 0.015),
                (InvestmentHorizon::Position, 0.04),
                (InvestmentHorizon::LongTerm, 0.08),
            ]),
            k: 0.5,
            k_prime: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub decision_mode: DecisionAggregation,
    pub risk_mode: ExtremeAggregation,
    pub opportunity_mode: ExtremeAggregation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Per-request deadline. `None` disables cancellation.
    pub deadline_ms: Option<u64>,
    /// Max concurrent rule evaluations within one request.
    pub parallelism: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            deadline_ms: None,
            parallelism: 8,
        }
    }
}

// ================================================================================================
// Engine Config
// ================================================================================================

/// The single declarative configuration block of the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub div_safe_epsilon: f64,
    pub thresholds: ThresholdConfig,
    pub action: ActionConfig,
    pub aggregation: AggregationConfig,
    pub evaluation: EvaluationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            div_safe_epsilon: DEFAULT_DIV_SAFE_EPSILON,
            thresholds: ThresholdConfig::default(),
            action: ActionConfig::default(),
            aggregation: AggregationConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> AugurResult<Self> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|e| AugurError::from(AdvisorError::InvalidConfig(e.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects cut-point lists of the wrong shape before they can produce
    /// nonsensical labels.
    pub fn validate(&self) -> AugurResult<()> {
        let ascending = |cuts: &[f64]| cuts.windows(2).all(|w| w[0] < w[1]);

        if self.thresholds.decision.len() != 4 || !ascending(&self.thresholds.decision) {
            return Err(AdvisorError::InvalidConfig(
                "thresholds.decision must be 4 ascending cut-points".to_string(),
            )
            .into());
        }
        if self.thresholds.risk.len() != 2 || !ascending(&self.thresholds.risk) {
            return Err(AdvisorError::InvalidConfig(
                "thresholds.risk must be 2 ascending cut-points".to_string(),
            )
            .into());
        }
        if self.thresholds.opportunity.len() != 2 || !ascending(&self.thresholds.opportunity) {
            return Err(AdvisorError::InvalidConfig(
                "thresholds.opportunity must be 2 ascending cut-points".to_string(),
            )
            .into());
        }
        if self.div_safe_epsilon <= 0.0 || !self.div_safe_epsilon.is_finite() {
            return Err(AdvisorError::InvalidConfig(
                "div_safe_epsilon must be a positive finite float".to_string(),
            )
            .into());
        }
        if self.evaluation.parallelism == 0 {
            return Err(AdvisorError::InvalidConfig(
                "evaluation.parallelism must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn with_div_safe_epsilon(self, epsilon: f64) -> Self {
        Self {
            div_safe_epsilon: epsilon,
            ..self
        }
    }

    pub fn with_thresholds(self, thresholds: ThresholdConfig) -> Self {
        Self { thresholds, ..self }
    }

    pub fn with_aggregation(self, aggregation: AggregationConfig) -> Self {
        Self {
            aggregation,
            ..self
        }
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.evaluation.deadline_ms = Some(deadline_ms);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.evaluation.parallelism = parallelism;
        self
    }
}
