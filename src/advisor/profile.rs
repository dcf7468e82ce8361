use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
    error::{AdvisorError, AugurResult},
    rule::Rule,
};

// ================================================================================================
// Investment Profile
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskAppetite {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvestmentGoal {
    CapitalPreservation,
    Income,
    #[default]
    Growth,
    Speculation,
}

/// Holding-period horizon; keys the base take-profit/stop-loss tables.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvestmentHorizon {
    Intraday,
    #[default]
    Swing,
    Position,
    LongTerm,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MarketKnowledge {
    Novice,
    #[default]
    Informed,
    Expert,
}

/// Direct multipliers on the trading action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionModifiers {
    /// Scales the base position size.
    pub position_sizing_factor: f64,
    /// Scales both take-profit and stop-loss distances.
    pub risk_tolerance_factor: f64,
}

impl Default for ActionModifiers {
    fn default() -> Self {
        Self {
            position_sizing_factor: 1.0,
            risk_tolerance_factor: 1.0,
        }
    }
}

/// What the advisor knows about the person it advises.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestmentProfile {
    pub risk_appetite: RiskAppetite,
    pub goal: InvestmentGoal,
    pub horizon: InvestmentHorizon,
    pub knowledge: MarketKnowledge,
    /// Available capital, informational for downstream sizing.
    pub capital_usd: f64,
    /// Rule tags the user opted out of (sectors, themes, styles).
    pub excluded_tags: BTreeSet<String>,
    /// Explicit overrides; when absent the adapter derives them.
    pub modifiers: Option<ActionModifiers>,
}

// ================================================================================================
// Personalization Adapter
// ================================================================================================

/// Predicate deciding whether a rule participates in this user's run.
pub type RuleSelector = Arc<dyn Fn(&Rule) -> bool + Send + Sync>;

/// Meta-synthesis weight vector. Must sum to a positive value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetaWeights {
    pub decision: f64,
    pub risk: f64,
    pub opportunity: f64,
}

impl MetaWeights {
    pub fn validate(&self) -> AugurResult<()> {
        let sum = self.decision + self.risk + self.opportunity;
        if sum > 0.0 && sum.is_finite() {
            Ok(())
        } else {
            Err(AdvisorError::InvalidMetaWeights { sum }.into())
        }
    }
}

/// Everything the pipeline derives from a profile: a rule selector, the
/// meta-synthesis weights, and the action modifiers.
#[derive(Clone)]
pub struct Personalization {
    pub selector: RuleSelector,
    pub meta_weights: MetaWeights,
    pub modifiers: ActionModifiers,
}

impl Personalization {
    /// Derives the three outputs as pure functions of the profile.
    /// No state is kept anywhere in the adapter.
    pub fn from_profile(profile: &InvestmentProfile) -> AugurResult<Self> {
        let meta_weights = meta_weights_for(profile.risk_appetite);
        meta_weights.validate()?;

        let modifiers = profile
            .modifiers
            .unwrap_or_else(|| derive_modifiers(profile));

        let excluded = profile.excluded_tags.clone();
        let selector: RuleSelector = Arc::new(move |rule: &Rule| {
            !rule.tags().iter().any(|tag| excluded.contains(tag))
        });

        Ok(Self {
            selector,
            meta_weights,
            modifiers,
        })
    }
}

fn meta_weights_for(appetite: RiskAppetite) -> MetaWeights {
    match appetite {
        RiskAppetite::Conservative => MetaWeights {
            decision: 0.5,
            risk: 0.8,
            opportunity: 0.2,
        },
        RiskAppetite::Balanced => MetaWeights {
            decision: 0.6,
            risk: 0.6,
            opportunity: 0.3,
        },
        RiskAppetite::Aggressive => MetaWeights {
            decision: 0.7,
            risk: 0.4,
            opportunity: 0.5,
        },
    }
}

fn derive_modifiers(profile: &InvestmentProfile) -> ActionModifiers {
    let sizing_base = match profile.risk_appetite {
        RiskAppetite::Conservative => 0.5,
        RiskAppetite::Balanced => 0.75,
        RiskAppetite::Aggressive => 1.0,
    };
    // Inexperienced users get smaller positions regardless of appetite.
    let knowledge_factor = match profile.knowledge {
        MarketKnowledge::Novice => 0.8,
        MarketKnowledge::Informed => 1.0,
        MarketKnowledge::Expert => 1.1,
    };
    let tolerance = match profile.risk_appetite {
        RiskAppetite::Conservative => 0.7,
        RiskAppetite::Balanced => 1.0,
        RiskAppetite::Aggressive => 1.3,
    };

    ActionModifiers {
        position_sizing_factor: sizing_base * knowledge_factor,
        risk_tolerance_factor: tolerance,
    }
}
