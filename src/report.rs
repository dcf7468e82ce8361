use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{
    domain::Ticker,
    error::{AugurError, DataError},
};

// ================================================================================================
// Report Paths
// ================================================================================================

/// One accessor in a report path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed path into the analysis report document.
///
/// The textual form is dotted keys with bracketed indices, e.g.
/// `technical_report.daily_report.key_indicators.rsi_14` or
/// `forecasting_report.forecasts[0].prediction[2]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportPath(Arc<[PathSegment]>);

impl ReportPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// The schema lookup key: index positions are erased, so
    /// `forecasts[0].prediction[2]` and `forecasts[7].prediction[0]` both
    /// declare against `forecasts[].prediction[]`.
    pub fn schema_key(&self) -> String {
        let mut out = String::new();
        for segment in self.0.iter() {
            match segment {
                PathSegment::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSegment::Index(_) => out.push_str("[]"),
            }
        }
        out
    }
}

impl fmt::Display for ReportPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in self.0.iter() {
            match segment {
                PathSegment::Key(key) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{key}")?;
                }
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

impl FromStr for ReportPath {
    type Err = AugurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |msg: &str| {
            AugurError::from(DataError::InvalidPath {
                path: s.to_string(),
                msg: msg.to_string(),
            })
        };

        if s.is_empty() {
            return Err(invalid("empty path"));
        }

        let mut segments = Vec::new();
        for part in s.split('.') {
            let (key, rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };

            if key.is_empty() {
                return Err(invalid("empty key segment"));
            }
            segments.push(PathSegment::Key(key.to_string()));

            let mut rest = rest;
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(end) = stripped.find(']') else {
                    return Err(invalid("unterminated index bracket"));
                };
                let index: usize = stripped[..end]
                    .parse()
                    .map_err(|_| invalid("non-numeric index"))?;
                segments.push(PathSegment::Index(index));
                rest = &stripped[end + 1..];
            }
            if !rest.is_empty() {
                return Err(invalid("trailing characters after index"));
            }
        }

        Ok(ReportPath(segments.into()))
    }
}

impl Serialize for ReportPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReportPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ================================================================================================
// Analysis Report
// ================================================================================================

/// The single fact input of a rule evaluation: a frozen, nested document of
/// technical, forecasting and news findings for one ticker at one moment.
///
/// The engine treats it as read-only and addressable by [`ReportPath`];
/// absent paths are not an error, the variable's encoder decides the
/// neutral fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisReport {
    doc: Value,
}

impl AnalysisReport {
    /// Wraps a JSON document. Only the top-level shape is enforced here;
    /// leaf access is lenient by design (schema evolution is additive).
    pub fn from_value(doc: Value) -> Result<Self, AugurError> {
        if !doc.is_object() {
            return Err(DataError::MalformedReport(
                "analysis report root must be an object".to_string(),
            )
            .into());
        }
        Ok(Self { doc })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, AugurError> {
        let doc: Value =
            serde_json::from_str(raw).map_err(|e| DataError::MalformedReport(e.to_string()))?;
        Self::from_value(doc)
    }

    /// Resolves `path` against the document. `None` for any missing hop.
    pub fn get(&self, path: &ReportPath) -> Option<&Value> {
        let mut current = &self.doc;
        for segment in path.segments() {
            current = match segment {
                PathSegment::Key(key) => current.get(key.as_str())?,
                PathSegment::Index(index) => current.get(index)?,
            };
        }
        Some(current)
    }

    pub fn ticker(&self) -> Option<Ticker> {
        self.doc
            .get("ticker")
            .and_then(Value::as_str)
            .map(Ticker::from)
    }

    pub fn generated_at_utc(&self) -> Option<DateTime<Utc>> {
        self.doc
            .get("generated_at_utc")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn generated_timestamp(&self) -> Option<i64> {
        self.doc.get("generated_timestamp").and_then(Value::as_i64)
    }

    pub fn as_value(&self) -> &Value {
        &self.doc
    }
}

// ================================================================================================
// Schema Descriptor
// ================================================================================================

/// Kind of a declared report leaf, used to validate variable registrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Numeric,
    Integer,
    Boolean,
    Categorical { variants: Vec<String> },
    Text,
}

/// Declares the addressable leaves of the analysis report.
///
/// Every path a builtin variable references is validated against this
/// descriptor when the registry is built. Schema evolution is additive:
/// new leaves may appear; removing one is a breaking change that requires
/// rule migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSchema {
    fields: BTreeMap<String, FieldKind>,
}

impl ReportSchema {
    pub fn declare(mut self, key: &str, kind: FieldKind) -> Self {
        self.fields.insert(key.to_string(), kind);
        self
    }

    pub fn declares(&self, path: &ReportPath) -> bool {
        self.fields.contains_key(&path.schema_key())
    }

    pub fn kind(&self, path: &ReportPath) -> Option<&FieldKind> {
        self.fields.get(&path.schema_key())
    }

    /// The descriptor of the analysis service's current report layout.
    pub fn standard() -> Self {
        ReportSchema::default()
            .declare("ticker", FieldKind::Text)
            .declare("generated_at_utc", FieldKind::Text)
            .declare("generated_timestamp", FieldKind::Integer)
            .declare(
                "technical_report.daily_report.key_indicators.rsi_14",
                FieldKind::Numeric,
            )
            .declare(
                "technical_report.daily_report.trend_report.midterm_report.ma_direction",
                FieldKind::Categorical {
                    variants: vec![
                        "uptrend".to_string(),
                        "downtrend".to_string(),
                        "sideways".to_string(),
                    ],
                },
            )
            .declare(
                "technical_report.daily_report.trend_report.overall_strength.value",
                FieldKind::Numeric,
            )
            .declare(
                "technical_report.intraday_report.momentum_report.macd_crossover",
                FieldKind::Categorical {
                    variants: vec!["bull".to_string(), "bear".to_string(), "none".to_string()],
                },
            )
            .declare(
                "forecasting_report.forecasts[].task_metadata.problem_id",
                FieldKind::Categorical {
                    variants: vec![
                        "triple-barrier".to_string(),
                        "ndays-distribution".to_string(),
                    ],
                },
            )
            .declare(
                "forecasting_report.forecasts[].prediction[]",
                FieldKind::Numeric,
            )
            .declare(
                "news_report.summary.num_positive_sentiment",
                FieldKind::Integer,
            )
            .declare(
                "news_report.summary.num_negative_sentiment",
                FieldKind::Integer,
            )
            .declare("news_report.summary.num_high_impact", FieldKind::Integer)
    }
}
