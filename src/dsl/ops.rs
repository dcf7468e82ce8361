use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

// ================================================================================================
// Boolean Encoding
// ================================================================================================

/// Wire encoding of logical truth. Fixed to `{-1.0, +1.0}` across the whole
/// engine; a predicate value is treated as true iff it is strictly positive.
pub const BOOL_TRUE: f64 = 1.0;
pub const BOOL_FALSE: f64 = -1.0;

#[inline]
pub fn encode_bool(value: bool) -> f64 {
    if value { BOOL_TRUE } else { BOOL_FALSE }
}

#[inline]
pub fn truthy(value: f64) -> bool {
    value > 0.0
}

// ================================================================================================
// Functional Operators
// ================================================================================================

/// The closed set of pure functional operators.
///
/// Every operator is a deterministic function of its argument values. None
/// reads the clock, random state, or any global. An operator that needs
/// randomness must take its seed as a constant child.
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
pub enum OpKind {
    // === Arithmetic ===
    Add,
    Sub,
    Mul,
    /// `DIV_SAFE(a, b) = a / b` when `|b| >= epsilon`, else `0`.
    DivSafe,

    // === Comparison (encode to BOOLEAN) ===
    Gt,
    Lt,
    Geq,
    Leq,
    Eq,

    // === Logical (over BOOLEAN encodings) ===
    And,
    Or,
    Not,

    // === Aggregation (variadic, polymorphic over numerics) ===
    Min,
    Max,
    Mean,
    /// Alternating `(value, weight)` children: `WEIGHTED_SUM(v1, w1, v2, w2, …) = Σ vᵢ·wᵢ`.
    WeightedSum,

    // === Smoothing / bounding ===
    Clamp,
    Sign,
    Tanh,

    // === Purpose adapters (bound a free combination into a signal range) ===
    /// `DECISION(x) = clamp(x, -1, 1)`, typed `DECISION_SIGNAL`.
    Decision,
    /// `RISK(x) = clamp(x, 0, 1)`, typed `RISK_LEVEL`.
    Risk,
    /// `OPPORTUNITY(x) = clamp(x, 0, 1)`, typed `OPPORTUNITY_RATING`.
    Opportunity,
}

impl OpKind {
    /// Applies the operator to already-evaluated child values.
    ///
    /// `epsilon` is the configured `DIV_SAFE` guard; other operators ignore
    /// it. Callers guarantee the argument count matches the registered
    /// arity; the factory enforces it at construction.
    pub fn apply(self, args: &[f64], epsilon: f64) -> f64 {
        use OpKind::*;

        match self {
            Add => args[0] + args[1],
            Sub => args[0] - args[1],
            Mul => args[0] * args[1],
            DivSafe => {
                if args[1].abs() >= epsilon {
                    args[0] / args[1]
                } else {
                    0.0
                }
            }

            Gt => encode_bool(args[0] > args[1]),
            Lt => encode_bool(args[0] < args[1]),
            Geq => encode_bool(args[0] >= args[1]),
            Leq => encode_bool(args[0] <= args[1]),
            Eq => encode_bool(args[0] == args[1]),

            And => args[0].min(args[1]),
            Or => args[0].max(args[1]),
            Not => -args[0],

            Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Mean => args.iter().sum::<f64>() / args.len() as f64,
            WeightedSum => args.chunks_exact(2).map(|pair| pair[0] * pair[1]).sum(),

            Clamp => args[0].clamp(args[1], args[2]),
            Sign => {
                if args[0] == 0.0 {
                    0.0
                } else {
                    args[0].signum()
                }
            }
            Tanh => args[0].tanh(),

            Decision => args[0].clamp(-1.0, 1.0),
            Risk | Opportunity => args[0].clamp(0.0, 1.0),
        }
    }

    /// True for operators whose result is bitwise reproducible on one
    /// platform. `TANH` is the only non-exact builtin; its round-trip
    /// tolerance is 1 ULP.
    pub fn is_exact(self) -> bool {
        !matches!(self, OpKind::Tanh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn arithmetic_over_two_args() {
        assert_eq!(OpKind::Add.apply(&[2.0, 3.0], EPS), 5.0);
        assert_eq!(OpKind::Sub.apply(&[2.0, 3.0], EPS), -1.0);
        assert_eq!(OpKind::Mul.apply(&[2.0, 3.0], EPS), 6.0);
    }

    #[test]
    fn div_safe_guards_small_denominators() {
        assert_eq!(OpKind::DivSafe.apply(&[10.0, 4.0], EPS), 2.5);
        assert_eq!(OpKind::DivSafe.apply(&[10.0, 0.0], EPS), 0.0);
        assert_eq!(OpKind::DivSafe.apply(&[10.0, 1e-12], EPS), 0.0);
        // Exactly at epsilon the division proceeds.
        assert_eq!(OpKind::DivSafe.apply(&[1e-9, 1e-9], EPS), 1.0);
    }

    #[test]
    fn comparisons_encode_to_signed_booleans() {
        let cases = [
            (OpKind::Gt, 60.0, 50.0, BOOL_TRUE),
            (OpKind::Gt, 50.0, 50.0, BOOL_FALSE),
            (OpKind::Lt, 1.0, 2.0, BOOL_TRUE),
            (OpKind::Geq, 2.0, 2.0, BOOL_TRUE),
            (OpKind::Leq, 3.0, 2.0, BOOL_FALSE),
            (OpKind::Eq, 0.5, 0.5, BOOL_TRUE),
            (OpKind::Eq, 0.5, 0.6, BOOL_FALSE),
        ];

        for (op, a, b, expected) in cases {
            assert_eq!(op.apply(&[a, b], EPS), expected, "{op}({a}, {b})");
        }
    }

    #[test]
    fn logic_is_min_max_negate() {
        assert_eq!(OpKind::And.apply(&[BOOL_TRUE, BOOL_FALSE], EPS), BOOL_FALSE);
        assert_eq!(OpKind::And.apply(&[BOOL_TRUE, BOOL_TRUE], EPS), BOOL_TRUE);
        assert_eq!(OpKind::Or.apply(&[BOOL_FALSE, BOOL_TRUE], EPS), BOOL_TRUE);
        assert_eq!(OpKind::Or.apply(&[BOOL_FALSE, BOOL_FALSE], EPS), BOOL_FALSE);
        assert_eq!(OpKind::Not.apply(&[BOOL_TRUE], EPS), BOOL_FALSE);
        assert_eq!(OpKind::Not.apply(&[BOOL_FALSE], EPS), BOOL_TRUE);
    }

    #[test]
    fn aggregations_over_variadic_args() {
        assert_eq!(OpKind::Min.apply(&[3.0, 1.0, 2.0], EPS), 1.0);
        assert_eq!(OpKind::Max.apply(&[3.0, 1.0, 2.0], EPS), 3.0);
        assert_eq!(OpKind::Mean.apply(&[1.0, 2.0, 3.0, 4.0], EPS), 2.5);
        // (0.5 * 2) + (1.0 * -1) = 0.0
        assert_eq!(OpKind::WeightedSum.apply(&[0.5, 2.0, 1.0, -1.0], EPS), 0.0);
    }

    #[test]
    fn bounding_operators() {
        assert_eq!(OpKind::Clamp.apply(&[5.0, -1.0, 1.0], EPS), 1.0);
        assert_eq!(OpKind::Clamp.apply(&[-5.0, -1.0, 1.0], EPS), -1.0);
        assert_eq!(OpKind::Clamp.apply(&[0.3, -1.0, 1.0], EPS), 0.3);

        assert_eq!(OpKind::Sign.apply(&[10.0], EPS), 1.0);
        assert_eq!(OpKind::Sign.apply(&[-0.2], EPS), -1.0);
        assert_eq!(OpKind::Sign.apply(&[0.0], EPS), 0.0);

        assert!(OpKind::Tanh.apply(&[1e6], EPS) <= 1.0);
        assert_eq!(OpKind::Tanh.apply(&[0.0], EPS), 0.0);
    }

    #[test]
    fn purpose_adapters_bound_their_ranges() {
        assert_eq!(OpKind::Decision.apply(&[3.0], EPS), 1.0);
        assert_eq!(OpKind::Decision.apply(&[-3.0], EPS), -1.0);
        assert_eq!(OpKind::Risk.apply(&[-0.5], EPS), 0.0);
        assert_eq!(OpKind::Risk.apply(&[0.9], EPS), 0.9);
        assert_eq!(OpKind::Opportunity.apply(&[1.4], EPS), 1.0);
    }

    #[test]
    fn wire_names_are_screaming_snake() {
        assert_eq!(OpKind::DivSafe.to_string(), "DIV_SAFE");
        assert_eq!(OpKind::WeightedSum.to_string(), "WEIGHTED_SUM");
        assert!("IF".parse::<OpKind>().is_err());
        assert_eq!("GT".parse::<OpKind>().unwrap(), OpKind::Gt);
    }
}
