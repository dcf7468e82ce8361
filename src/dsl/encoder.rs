use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dsl::ops::{BOOL_FALSE, BOOL_TRUE};

// ================================================================================================
// Variable Encoders
// ================================================================================================

/// Turns the raw report leaf under a variable's path into a float.
///
/// Contracts shared by every encoder:
/// - an absent or null leaf yields the variable's declared neutral value,
///   never an error (forward compatibility with partial reports);
/// - a leaf of the wrong JSON kind is treated as absent;
/// - the output is always finite and bounded by [`Encoder::bound`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Encoder {
    /// Passes a numeric leaf through, clamped into `[lo, hi]`.
    Identity { lo: f64, hi: f64 },

    /// Maps a categorical leaf from a known finite set to declared numbers.
    /// Unknown categories fall back to the neutral value.
    CategoryMap { map: BTreeMap<String, f64> },

    /// Encodes a boolean leaf as `+1.0` / `-1.0`.
    Boolean,

    /// Projects a numeric leaf into per-interval values: the leaf lands in
    /// the bucket of the first cut it does not exceed; `values` has one
    /// entry more than `cuts`.
    Bucketized { cuts: Vec<f64>, values: Vec<f64> },

    /// `-1 / 0 / +1` from the sign of a numeric leaf.
    Sign,

    /// Compresses an unbounded count or magnitude into `(-1, 1)` via
    /// `tanh(sign(x) · ln(1 + |x| / scale))`.
    SignedLog { scale: f64 },
}

impl Encoder {
    /// Encodes a resolved leaf. `None` means the path was absent.
    pub fn encode(&self, leaf: Option<&Value>, neutral: f64) -> f64 {
        let Some(leaf) = leaf else { return neutral };
        if leaf.is_null() {
            return neutral;
        }

        match self {
            Encoder::Identity { lo, hi } => match leaf.as_f64() {
                Some(x) => x.clamp(*lo, *hi),
                None => neutral,
            },

            Encoder::CategoryMap { map } => leaf
                .as_str()
                .and_then(|category| map.get(category).copied())
                .unwrap_or(neutral),

            Encoder::Boolean => match leaf.as_bool() {
                Some(true) => BOOL_TRUE,
                Some(false) => BOOL_FALSE,
                None => neutral,
            },

            Encoder::Bucketized { cuts, values } => match leaf.as_f64() {
                Some(x) => {
                    let bucket = cuts.iter().position(|cut| x <= *cut).unwrap_or(cuts.len());
                    values.get(bucket).copied().unwrap_or(neutral)
                }
                None => neutral,
            },

            Encoder::Sign => match leaf.as_f64() {
                Some(x) if x > 0.0 => 1.0,
                Some(x) if x < 0.0 => -1.0,
                Some(_) => 0.0,
                None => neutral,
            },

            Encoder::SignedLog { scale } => match leaf.as_f64() {
                Some(x) => {
                    let magnitude = (1.0 + x.abs() / scale).ln();
                    (x.signum() * magnitude).tanh()
                }
                None => neutral,
            },
        }
    }

    /// The declared output bound `B_e`: `|encode(x)| <= B_e` for every
    /// defined input.
    pub fn bound(&self) -> f64 {
        match self {
            Encoder::Identity { lo, hi } => lo.abs().max(hi.abs()),
            Encoder::CategoryMap { map } => map
                .values()
                .fold(0.0_f64, |acc, v| acc.max(v.abs())),
            Encoder::Boolean | Encoder::Sign | Encoder::SignedLog { .. } => 1.0,
            Encoder::Bucketized { values, .. } => {
                values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
            }
        }
    }
}
