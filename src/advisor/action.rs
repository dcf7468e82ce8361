use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
    advisor::{aggregate::DecisionLabel, profile::{ActionModifiers, InvestmentHorizon}},
    config::ActionConfig,
};

// ================================================================================================
// Trading Action
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Buy,
    Sell,
    Hold,
}

/// The concrete, executable outcome of an advisor run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradingAction {
    pub action_type: ActionType,
    /// Fraction of capital to commit, in `[0, 1]`.
    pub position_size_pct: f64,
    /// Take-profit distance from entry, as a fraction of price.
    pub tp_pct: f64,
    /// Stop-loss distance from entry, as a fraction of price.
    pub sl_pct: f64,
}

impl TradingAction {
    pub fn hold() -> Self {
        Self {
            action_type: ActionType::Hold,
            position_size_pct: 0.0,
            tp_pct: 0.0,
            sl_pct: 0.0,
        }
    }
}

// ================================================================================================
// Action Mapper
// ================================================================================================

/// Deterministic translation from labelled scores plus personalization
/// modifiers into a trading action. All constants live in
/// [`ActionConfig`]; they are data, not code.
#[derive(Debug, Clone)]
pub struct ActionMapper {
    config: ActionConfig,
}

impl ActionMapper {
    pub fn new(config: ActionConfig) -> Self {
        Self { config }
    }

    pub fn map(
        &self,
        decision: DecisionLabel,
        final_risk: f64,
        final_opportunity: f64,
        horizon: InvestmentHorizon,
        modifiers: &ActionModifiers,
    ) -> TradingAction {
        let action_type = match decision {
            DecisionLabel::StrongBuy | DecisionLabel::Buy => ActionType::Buy,
            DecisionLabel::StrongSell | DecisionLabel::Sell => ActionType::Sell,
            DecisionLabel::Hold => return TradingAction::hold(),
        };

        let base_size = self.config.base_size.get(&decision).copied().unwrap_or(0.0);
        // Risk halves the commitment at its ceiling.
        let position_size_pct = (base_size
            * modifiers.position_sizing_factor
            * (1.0 - final_risk / 2.0))
            .clamp(0.0, 1.0);

        let base_tp = self.config.base_tp.get(&horizon).copied().unwrap_or(0.0);
        let base_sl = self.config.base_sl.get(&horizon).copied().unwrap_or(0.0);

        // Opportunity stretches the profit target; risk widens the stop.
        let tp_pct = base_tp
            * modifiers.risk_tolerance_factor
            * (1.0 + self.config.k * final_opportunity);
        let sl_pct = base_sl
            * modifiers.risk_tolerance_factor
            * (1.0 + self.config.k_prime * final_risk);

        TradingAction {
            action_type,
            position_size_pct,
            tp_pct,
            sl_pct,
        }
    }
}
