use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
    advisor::profile::MetaWeights,
    config::{AggregationConfig, DecisionAggregation, ExtremeAggregation, ThresholdConfig},
    domain::Score,
};

// ================================================================================================
// Labels
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionLabel {
    StrongSell,
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

impl DecisionLabel {
    /// Human-readable one-liner attached to the advisor report.
    pub fn recommendation(self) -> &'static str {
        match self {
            DecisionLabel::StrongSell => "Exit the position; the signals align against holding.",
            DecisionLabel::Sell => "Reduce exposure while conditions deteriorate.",
            DecisionLabel::Hold => "No edge either way; keep the current position.",
            DecisionLabel::Buy => "Conditions favor accumulating a position.",
            DecisionLabel::StrongBuy => "Signals align strongly in favor of entering.",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLabel {
    RiskLow,
    RiskModerate,
    RiskHigh,
}

impl RiskLabel {
    pub fn recommendation(self) -> &'static str {
        match self {
            RiskLabel::RiskLow => "Downside indicators are quiet.",
            RiskLabel::RiskModerate => "Meaningful downside scenarios exist; size accordingly.",
            RiskLabel::RiskHigh => "At least one rule flags severe downside exposure.",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityLabel {
    OppLow,
    OppInteresting,
    OppStrong,
}

impl OpportunityLabel {
    pub fn recommendation(self) -> &'static str {
        match self {
            OpportunityLabel::OppLow => "No standout upside setup.",
            OpportunityLabel::OppInteresting => "An upside setup is forming; worth watching.",
            OpportunityLabel::OppStrong => "A rule flags a strong upside setup.",
        }
    }
}

// ================================================================================================
// Raw Aggregation
// ================================================================================================

/// One rule's contribution: its score and its aggregation weight (the
/// historical confidence, 1.0 by default).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleVote {
    pub score: Score,
    pub weight: f64,
}

impl RuleVote {
    pub fn unweighted(score: Score) -> Self {
        Self { score, weight: 1.0 }
    }
}

/// The per-purpose raw scores, before meta-synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedScores {
    pub raw_decision_score: f64,
    pub raw_risk_score: f64,
    pub raw_opportunity_score: f64,
}

/// Folds the three vote lists into raw scores. Empty lists aggregate to 0.
pub fn aggregate_raw(
    config: &AggregationConfig,
    decisions: &[RuleVote],
    risks: &[RuleVote],
    opportunities: &[RuleVote],
) -> AggregatedScores {
    AggregatedScores {
        raw_decision_score: aggregate_decision(config.decision_mode, decisions),
        raw_risk_score: aggregate_extreme(config.risk_mode, risks),
        raw_opportunity_score: aggregate_extreme(config.opportunity_mode, opportunities),
    }
}

fn aggregate_decision(mode: DecisionAggregation, votes: &[RuleVote]) -> f64 {
    if votes.is_empty() {
        return 0.0;
    }

    match mode {
        DecisionAggregation::Mean => {
            votes.iter().map(|v| v.score.0).sum::<f64>() / votes.len() as f64
        }
        DecisionAggregation::Median => {
            let sorted: Vec<f64> = votes
                .iter()
                .map(|v| v.score.0)
                .sorted_by_key(|s| OrderedFloat(*s))
                .collect();
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 1 {
                sorted[mid]
            } else {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            }
        }
        DecisionAggregation::Max => votes
            .iter()
            .map(|v| OrderedFloat(v.score.0))
            .max()
            .map(|s| s.0)
            .unwrap_or(0.0),
        DecisionAggregation::WeightedMean => {
            let weight_sum: f64 = votes.iter().map(|v| v.weight).sum();
            if weight_sum > 0.0 {
                votes.iter().map(|v| v.score.0 * v.weight).sum::<f64>() / weight_sum
            } else {
                0.0
            }
        }
    }
}

fn aggregate_extreme(mode: ExtremeAggregation, votes: &[RuleVote]) -> f64 {
    if votes.is_empty() {
        return 0.0;
    }

    match mode {
        ExtremeAggregation::Max => votes
            .iter()
            .map(|v| OrderedFloat(v.score.0))
            .max()
            .map(|s| s.0)
            .unwrap_or(0.0),
        ExtremeAggregation::Mean => {
            votes.iter().map(|v| v.score.0).sum::<f64>() / votes.len() as f64
        }
    }
}

// ================================================================================================
// Meta-Synthesis
// ================================================================================================

/// The final scores after weighting the raw aggregates against each other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalScores {
    pub decision: Score,
    pub risk: Score,
    pub opportunity: Score,
}

/// Weighs the raw aggregates into final scores.
///
/// Risk and opportunity pass through untouched; meta-synthesis must never
/// dilute a risk signal. Only the decision is rebalanced: risk pulls it
/// down, opportunity pushes it up, then the result is clamped to `[-1, 1]`.
pub fn meta_synthesize(weights: &MetaWeights, raw: &AggregatedScores) -> FinalScores {
    let decision = weights.decision * raw.raw_decision_score
        - weights.risk * raw.raw_risk_score
        + weights.opportunity * raw.raw_opportunity_score;

    FinalScores {
        decision: Score(decision.clamp(-1.0, 1.0)),
        risk: Score(raw.raw_risk_score),
        opportunity: Score(raw.raw_opportunity_score),
    }
}

// ================================================================================================
// Label Mapping
// ================================================================================================

/// Maps final scores onto labels using the configured cut-points.
///
/// Buckets are closed-left, open-right, except the top bucket which is
/// closed on both sides; the HOLD band additionally includes both of its
/// edges.
#[derive(Debug, Clone)]
pub struct ScoreFinalMapper {
    thresholds: ThresholdConfig,
}

impl ScoreFinalMapper {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    pub fn map_decision(&self, score: f64) -> DecisionLabel {
        let cuts = &self.thresholds.decision;
        if score < cuts[0] {
            DecisionLabel::StrongSell
        } else if score < cuts[1] {
            DecisionLabel::Sell
        } else if score <= cuts[2] {
            DecisionLabel::Hold
        } else if score <= cuts[3] {
            DecisionLabel::Buy
        } else {
            DecisionLabel::StrongBuy
        }
    }

    pub fn map_risk(&self, score: f64) -> RiskLabel {
        let cuts = &self.thresholds.risk;
        if score <= cuts[0] {
            RiskLabel::RiskLow
        } else if score <= cuts[1] {
            RiskLabel::RiskModerate
        } else {
            RiskLabel::RiskHigh
        }
    }

    pub fn map_opportunity(&self, score: f64) -> OpportunityLabel {
        let cuts = &self.thresholds.opportunity;
        if score <= cuts[0] {
            OpportunityLabel::OppLow
        } else if score <= cuts[1] {
            OpportunityLabel::OppInteresting
        } else {
            OpportunityLabel::OppStrong
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(scores: &[f64]) -> Vec<RuleVote> {
        scores.iter().map(|s| RuleVote::unweighted(Score(*s))).collect()
    }

    fn balanced() -> MetaWeights {
        MetaWeights {
            decision: 0.6,
            risk: 0.6,
            opportunity: 0.2,
        }
    }

    #[test]
    fn empty_vote_lists_aggregate_to_zero() {
        let raw = aggregate_raw(&AggregationConfig::default(), &[], &[], &[]);
        assert_eq!(raw.raw_decision_score, 0.0);
        assert_eq!(raw.raw_risk_score, 0.0);
        assert_eq!(raw.raw_opportunity_score, 0.0);
    }

    #[test]
    fn default_modes_are_mean_max_max() {
        let raw = aggregate_raw(
            &AggregationConfig::default(),
            &votes(&[0.5, -0.1, 0.2]),
            &votes(&[0.1, 0.9, 0.3]),
            &votes(&[0.2, 0.6]),
        );

        assert!((raw.raw_decision_score - 0.2).abs() < 1e-12);
        assert_eq!(raw.raw_risk_score, 0.9);
        assert_eq!(raw.raw_opportunity_score, 0.6);
    }

    #[test]
    fn alternate_decision_modes() {
        let decision_votes = vec![
            RuleVote {
                score: Score(0.8),
                weight: 3.0,
            },
            RuleVote {
                score: Score(-0.4),
                weight: 1.0,
            },
            RuleVote {
                score: Score(0.2),
                weight: 0.0,
            },
        ];

        let median = aggregate_raw(
            &AggregationConfig {
                decision_mode: DecisionAggregation::Median,
                ..Default::default()
            },
            &decision_votes,
            &[],
            &[],
        );
        assert_eq!(median.raw_decision_score, 0.2);

        let max = aggregate_raw(
            &AggregationConfig {
                decision_mode: DecisionAggregation::Max,
                ..Default::default()
            },
            &decision_votes,
            &[],
            &[],
        );
        assert_eq!(max.raw_decision_score, 0.8);

        let weighted = aggregate_raw(
            &AggregationConfig {
                decision_mode: DecisionAggregation::WeightedMean,
                ..Default::default()
            },
            &decision_votes,
            &[],
            &[],
        );
        // (0.8·3 − 0.4·1 + 0.2·0) / 4 = 0.5
        assert!((weighted.raw_decision_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mean_mode_for_risk_is_available() {
        let raw = aggregate_raw(
            &AggregationConfig {
                risk_mode: ExtremeAggregation::Mean,
                ..Default::default()
            },
            &[],
            &votes(&[0.2, 0.4]),
            &[],
        );
        assert!((raw.raw_risk_score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn risk_dominates_an_otherwise_bullish_decision() {
        // One decision rule at +0.8, one risk rule at 0.9, weights (0.6, 0.6, 0.2).
        let raw = aggregate_raw(
            &AggregationConfig::default(),
            &votes(&[0.8]),
            &votes(&[0.9]),
            &[],
        );
        let finals = meta_synthesize(&balanced(), &raw);

        assert!((finals.decision.0 - (-0.06)).abs() < 1e-12);
        assert_eq!(finals.risk.0, 0.9);

        let mapper = ScoreFinalMapper::new(ThresholdConfig::default());
        assert_eq!(mapper.map_decision(finals.decision.0), DecisionLabel::Hold);
        assert_eq!(mapper.map_risk(finals.risk.0), RiskLabel::RiskHigh);
    }

    #[test]
    fn meta_synthesis_never_dilutes_risk_or_opportunity() {
        let raw = AggregatedScores {
            raw_decision_score: 0.4,
            raw_risk_score: 0.77,
            raw_opportunity_score: 0.55,
        };
        let finals = meta_synthesize(&balanced(), &raw);

        assert_eq!(finals.risk.0, 0.77);
        assert_eq!(finals.opportunity.0, 0.55);
    }

    #[test]
    fn final_decision_is_clamped() {
        let raw = AggregatedScores {
            raw_decision_score: 1.0,
            raw_risk_score: 0.0,
            raw_opportunity_score: 1.0,
        };
        let heavy = MetaWeights {
            decision: 2.0,
            risk: 0.1,
            opportunity: 2.0,
        };
        assert_eq!(meta_synthesize(&heavy, &raw).decision.0, 1.0);
    }

    #[test]
    fn rising_risk_is_monotone() {
        // More risk must never lower the final risk or raise the decision.
        let weights = balanced();
        let config = AggregationConfig::default();
        let decisions = votes(&[0.5, 0.1]);
        let opportunities = votes(&[0.3]);

        let mut previous_risk = f64::NEG_INFINITY;
        let mut previous_decision = f64::INFINITY;
        for risk in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let raw = aggregate_raw(&config, &decisions, &votes(&[0.1, risk]), &opportunities);
            let finals = meta_synthesize(&weights, &raw);

            assert!(finals.risk.0 >= previous_risk, "risk regressed at {risk}");
            assert!(
                finals.decision.0 <= previous_decision,
                "decision rose with risk at {risk}"
            );
            previous_risk = finals.risk.0;
            previous_decision = finals.decision.0;
        }
    }

    #[test]
    fn rising_opportunity_is_monotone() {
        // More opportunity must never lower its final score or the decision.
        let weights = balanced();
        let config = AggregationConfig::default();
        let decisions = votes(&[0.1]);
        let risks = votes(&[0.4]);

        let mut previous_opportunity = f64::NEG_INFINITY;
        let mut previous_decision = f64::NEG_INFINITY;
        for opportunity in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let raw = aggregate_raw(&config, &decisions, &risks, &votes(&[opportunity]));
            let finals = meta_synthesize(&weights, &raw);

            assert!(finals.opportunity.0 >= previous_opportunity);
            assert!(finals.decision.0 >= previous_decision);
            previous_opportunity = finals.opportunity.0;
            previous_decision = finals.decision.0;
        }
    }

    #[test]
    fn decision_labels_respect_the_boundary_policy() {
        let mapper = ScoreFinalMapper::new(ThresholdConfig::default());

        let cases = [
            (-1.0, DecisionLabel::StrongSell),
            (-0.61, DecisionLabel::StrongSell),
            (-0.6, DecisionLabel::Sell),
            (-0.21, DecisionLabel::Sell),
            (-0.2, DecisionLabel::Hold),
            (0.0, DecisionLabel::Hold),
            (0.2, DecisionLabel::Hold),
            (0.21, DecisionLabel::Buy),
            (0.6, DecisionLabel::Buy),
            (0.61, DecisionLabel::StrongBuy),
            (1.0, DecisionLabel::StrongBuy),
        ];
        for (score, expected) in cases {
            assert_eq!(mapper.map_decision(score), expected, "at {score}");
        }
    }

    #[test]
    fn risk_and_opportunity_labels_respect_their_cuts() {
        let mapper = ScoreFinalMapper::new(ThresholdConfig::default());

        assert_eq!(mapper.map_risk(0.0), RiskLabel::RiskLow);
        assert_eq!(mapper.map_risk(0.33), RiskLabel::RiskLow);
        assert_eq!(mapper.map_risk(0.34), RiskLabel::RiskModerate);
        assert_eq!(mapper.map_risk(0.66), RiskLabel::RiskModerate);
        assert_eq!(mapper.map_risk(0.67), RiskLabel::RiskHigh);
        assert_eq!(mapper.map_risk(1.0), RiskLabel::RiskHigh);

        assert_eq!(mapper.map_opportunity(0.1), OpportunityLabel::OppLow);
        assert_eq!(mapper.map_opportunity(0.5), OpportunityLabel::OppInteresting);
        assert_eq!(mapper.map_opportunity(0.9), OpportunityLabel::OppStrong);
    }
}
