use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};

use crate::{
    domain::{RuleId, Score},
    dsl::{
        codec::{parse_tree, serialize_tree},
        node::TreeNode,
        registry::NodeRegistry,
        semantic::SemanticType,
    },
    error::{AugurResult, ConstructionError, EvaluationError},
    report::AnalysisReport,
};

// ================================================================================================
// Rule Lifecycle
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
pub enum RuleStatus {
    /// Eligible for live evaluation.
    Ready,
    /// Still being shaped by the evolutionary producer.
    Evolving,
    /// Kept for audit; never evaluated.
    Deprecated,
}

/// The persisted form of a rule: metadata plus the serialized tree.
///
/// This is exactly what the repository stores; the tree is opaque
/// structured data to the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub rule_id: RuleId,
    pub name: String,
    pub description: String,
    pub version: String,
    pub purpose: SemanticType,
    pub rule_status: RuleStatus,
    /// UTC seconds.
    pub created_at_ts: i64,
    /// Free-form selection labels (sectors, themes). The engine never
    /// interprets them; the personalization selector filters on them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Historical performance snapshot. Opaque to the engine apart from
    /// an optional `confidence` used by weighted-mean aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    pub tree: Value,
}

// ================================================================================================
// Rule
// ================================================================================================

/// A named, versioned expression tree with a decision, risk or opportunity
/// purpose.
///
/// Rules are immutable once constructed; any change requires a new
/// `(rule_id, version)` pair. The purpose is not stored separately: it is
/// the root's return type, validated against the record at load time.
#[derive(Debug, Clone)]
pub struct Rule {
    rule_id: RuleId,
    name: String,
    description: String,
    version: String,
    rule_status: RuleStatus,
    created_at_ts: i64,
    tags: Vec<String>,
    metrics: Option<Value>,
    root: TreeNode,
}

impl Rule {
    /// Reconstructs a rule from its persisted record.
    ///
    /// Fails if the tree references unknown vocabulary, if the root is not
    /// typed as one of the three purposes (a BOOLEAN-rooted rule is a
    /// rejected registration, not a degenerate signal), or if the declared
    /// purpose disagrees with the root.
    pub fn from_record(registry: &NodeRegistry, record: &RuleRecord) -> AugurResult<Self> {
        let root = parse_tree(registry, &record.tree)?;

        if !root.return_type().is_purpose() {
            return Err(ConstructionError::InvalidPurpose {
                rule_id: record.rule_id.to_string(),
                actual: root.return_type(),
            }
            .into());
        }
        if root.return_type() != record.purpose {
            return Err(ConstructionError::PurposeMismatch {
                rule_id: record.rule_id.to_string(),
                declared: record.purpose,
                actual: root.return_type(),
            }
            .into());
        }

        Ok(Self {
            rule_id: record.rule_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            version: record.version.clone(),
            rule_status: record.rule_status,
            created_at_ts: record.created_at_ts,
            tags: record.tags.clone(),
            metrics: record.metrics.clone(),
            root,
        })
    }

    /// Serializes back into the persisted form.
    pub fn to_record(&self) -> RuleRecord {
        RuleRecord {
            rule_id: self.rule_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            purpose: self.purpose(),
            rule_status: self.rule_status,
            created_at_ts: self.created_at_ts,
            tags: self.tags.clone(),
            metrics: self.metrics.clone(),
            tree: serialize_tree(&self.root),
        }
    }

    /// Evaluates the tree against a report. Pure: same `(rule, report)`,
    /// same float, on every call and on every thread.
    pub fn execute(&self, report: &AnalysisReport) -> Result<Score, EvaluationError> {
        match self.root.evaluate(report) {
            Ok(value) => Ok(Score(value)),
            Err(EvaluationError::Node { node_path, cause }) => Err(EvaluationError::Rule {
                rule_id: self.rule_id.to_string(),
                node_path,
                cause,
            }),
            Err(other) => Err(other),
        }
    }

    /// How this rule's output participates in aggregation: always the
    /// root's return type.
    pub fn purpose(&self) -> SemanticType {
        self.root.return_type()
    }

    /// Historical confidence weight for weighted-mean aggregation; 1.0
    /// when the metrics snapshot does not carry one.
    pub fn confidence(&self) -> f64 {
        self.metrics
            .as_ref()
            .and_then(|m| m.get("confidence"))
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite() && *c >= 0.0)
            .unwrap_or(1.0)
    }

    pub fn rule_id(&self) -> &RuleId {
        &self.rule_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn rule_status(&self) -> RuleStatus {
        self.rule_status
    }

    pub fn created_at_ts(&self) -> i64 {
        self.created_at_ts
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }
}
