use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::{impl_arith_primitive, impl_from_primitive};

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// A scalar rule signal.
///
/// Decision signals live in `[-1, 1]`; risk and opportunity ratings live in
/// `[0, 1]`. The engine never clamps a rule output (authors close their
/// trees with a bounding operator), so a `Score` outside those ranges is a
/// rule-authoring defect, not an engine state.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Score(pub f64);
impl_from_primitive!(Score, f64);
impl_arith_primitive!(Score, f64);

impl Score {
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    pub fn clamp(self, lo: f64, hi: f64) -> Self {
        Self(self.0.clamp(lo, hi))
    }
}

/// Stable, globally unique rule identifier.
///
/// Rules are never mutated in place: any change to a rule requires a new
/// `(rule_id, version)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub Arc<String>);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::new(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Exchange ticker symbol of the instrument under analysis (e.g., "AAPL").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticker(pub Arc<String>);

impl Ticker {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self(Arc::new(ticker.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Ticker {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_arithmetic_matches_raw_floats() {
        let a = Score(0.6);
        let b = Score(0.2);

        assert_eq!((a + b).0, 0.8);
        assert_eq!((a - b).0, 0.6 - 0.2);
        assert_eq!((a * 0.5).0, 0.3);
        assert_eq!((-a).0, -0.6);
    }

    #[test]
    fn score_clamp_bounds_the_signal() {
        assert_eq!(Score(1.7).clamp(-1.0, 1.0).0, 1.0);
        assert_eq!(Score(-3.0).clamp(-1.0, 1.0).0, -1.0);
        assert_eq!(Score(0.25).clamp(-1.0, 1.0).0, 0.25);
    }

    #[test]
    fn rule_ids_order_lexicographically() {
        let mut ids = vec![RuleId::new("r-10"), RuleId::new("r-02"), RuleId::new("r-01")];
        ids.sort();

        let as_str: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(as_str, vec!["r-01", "r-02", "r-10"]);
    }
}
