use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

// ================================================================================================
// Semantic Type Taxonomy
// ================================================================================================

/// Business-meaningful tag on node outputs.
///
/// The taxonomy is what keeps a genetic producer from composing nonsense:
/// every operator slot declares the tag it accepts, and [`SemanticType::assignable`]
/// is the single compatibility relation checked at construction.
///
/// Tags are stable identifiers. Renaming one is a schema migration, because
/// persisted rules reference them indirectly through node names.
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
pub enum SemanticType {
    Price,
    Momentum,
    Trend,
    Boolean,
    Numerical,
    DecisionSignal,
    RiskLevel,
    OpportunityRating,
    Sentiment,
    Volatility,
    Volume,
    ForecastProb,
    Percentage,
    FinancialRatio,
    /// Wildcard for STGP convenience. `ANY` acts as both top and bottom of
    /// the taxonomy: it may flow into every slot and every tag may flow
    /// into an `ANY` slot.
    Any,
}

impl SemanticType {
    /// May a value tagged `self` flow into a slot declared as `slot`?
    pub fn assignable(self, slot: SemanticType) -> bool {
        self == slot || slot == SemanticType::Any || self == SemanticType::Any
    }

    /// Tags that arithmetic and comparison operators accept in a slot
    /// declared `NUMERICAL`. Each of them is silently widened to
    /// `NUMERICAL` when it crosses such a slot.
    pub fn is_numeric_compatible(self) -> bool {
        use SemanticType::*;
        matches!(
            self,
            Numerical
                | Price
                | Percentage
                | FinancialRatio
                | Momentum
                | Trend
                | Volatility
                | Volume
                | Sentiment
                | ForecastProb
        )
    }

    /// Widens a numeric-compatible tag to `NUMERICAL`; every other tag is
    /// returned unchanged.
    pub fn widen_numeric(self) -> SemanticType {
        if self.is_numeric_compatible() {
            SemanticType::Numerical
        } else {
            self
        }
    }

    /// The join of two tags for branch arms: equal tags join to themselves
    /// and `ANY` yields to the concrete side. Diverging concrete tags have
    /// no join.
    pub fn join(self, other: SemanticType) -> Option<SemanticType> {
        if self == other {
            Some(self)
        } else if self == SemanticType::Any {
            Some(other)
        } else if other == SemanticType::Any {
            Some(self)
        } else {
            None
        }
    }

    /// The three tags a rule root may carry.
    pub fn is_purpose(self) -> bool {
        matches!(
            self,
            SemanticType::DecisionSignal | SemanticType::RiskLevel | SemanticType::OpportunityRating
        )
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn assignable_requires_equality_or_any() {
        // ANY is top and bottom at once.
        for tag in SemanticType::iter() {
            assert!(tag.assignable(tag), "{tag} must assign to itself");
            assert!(tag.assignable(SemanticType::Any), "{tag} must flow into ANY");
            assert!(SemanticType::Any.assignable(tag), "ANY must flow into {tag}");
        }

        assert!(!SemanticType::Price.assignable(SemanticType::Boolean));
        assert!(!SemanticType::Trend.assignable(SemanticType::Momentum));
        assert!(!SemanticType::RiskLevel.assignable(SemanticType::DecisionSignal));
    }

    #[test]
    fn numeric_compatible_set_is_exact() {
        use SemanticType::*;

        let expected = [
            Numerical,
            Price,
            Percentage,
            FinancialRatio,
            Momentum,
            Trend,
            Volatility,
            Volume,
            Sentiment,
            ForecastProb,
        ];

        for tag in SemanticType::iter() {
            assert_eq!(
                tag.is_numeric_compatible(),
                expected.contains(&tag),
                "numeric compatibility wrong for {tag}"
            );
        }
    }

    #[test]
    fn widening_collapses_numerics_only() {
        assert_eq!(SemanticType::Price.widen_numeric(), SemanticType::Numerical);
        assert_eq!(SemanticType::Trend.widen_numeric(), SemanticType::Numerical);
        assert_eq!(SemanticType::Boolean.widen_numeric(), SemanticType::Boolean);
        assert_eq!(
            SemanticType::DecisionSignal.widen_numeric(),
            SemanticType::DecisionSignal
        );
    }

    #[test]
    fn join_resolves_any_and_rejects_divergence() {
        assert_eq!(
            SemanticType::Price.join(SemanticType::Price),
            Some(SemanticType::Price)
        );
        assert_eq!(
            SemanticType::Any.join(SemanticType::RiskLevel),
            Some(SemanticType::RiskLevel)
        );
        assert_eq!(
            SemanticType::Momentum.join(SemanticType::Any),
            Some(SemanticType::Momentum)
        );
        assert_eq!(SemanticType::Price.join(SemanticType::Trend), None);
    }

    #[test]
    fn tags_round_trip_their_wire_names() {
        let cases = [
            (SemanticType::DecisionSignal, "DECISION_SIGNAL"),
            (SemanticType::RiskLevel, "RISK_LEVEL"),
            (SemanticType::OpportunityRating, "OPPORTUNITY_RATING"),
            (SemanticType::ForecastProb, "FORECAST_PROB"),
            (SemanticType::Any, "ANY"),
        ];

        for (tag, name) in cases {
            assert_eq!(tag.to_string(), name);
            assert_eq!(name.parse::<SemanticType>().unwrap(), tag);
        }
    }
}
