use serde::{Deserialize, Serialize};

use crate::{
    domain::{RuleId, Score},
    dsl::{node::NodeTrace, semantic::SemanticType},
    error::EvaluationError,
    report::AnalysisReport,
    rule::Rule,
};

// ================================================================================================
// Trigger Evidence
// ================================================================================================

/// The fact that a rule executed successfully and contributed a score.
///
/// These records are the whole explanation substrate: the downstream
/// natural-language layer renders prose from them, the engine never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub rule_id: RuleId,
    pub name: String,
    pub score: Score,
    pub purpose: SemanticType,
}

/// A per-rule failure, absorbed by the orchestrator and kept as evidence
/// next to (not inside) the scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFailureInfo {
    pub rule_id: String,
    pub node_path: String,
    pub cause: String,
}

impl From<&EvaluationError> for EvaluationFailureInfo {
    fn from(error: &EvaluationError) -> Self {
        match error {
            EvaluationError::Rule {
                rule_id,
                node_path,
                cause,
            } => Self {
                rule_id: rule_id.clone(),
                node_path: node_path.clone(),
                cause: cause.clone(),
            },
            EvaluationError::Node { node_path, cause } => Self {
                rule_id: String::new(),
                node_path: node_path.clone(),
                cause: cause.clone(),
            },
        }
    }
}

// ================================================================================================
// Structural Rule Trace
// ================================================================================================

/// A full structural trace of one rule evaluation: per evaluated node its
/// name, semantic type and value, in tree shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTrace {
    pub rule_id: RuleId,
    pub name: String,
    pub purpose: SemanticType,
    pub root: NodeTrace,
}

/// Re-evaluates a rule with tracing enabled.
///
/// Off the aggregation hot path by construction: callers request a trace
/// for the handful of rules they want explained, after the advisor run.
pub fn trace_rule(rule: &Rule, report: &AnalysisReport) -> Result<RuleTrace, EvaluationError> {
    let root = rule.root().evaluate_traced(report)?;
    Ok(RuleTrace {
        rule_id: rule.rule_id().clone(),
        name: rule.name().to_string(),
        purpose: rule.purpose(),
        root,
    })
}
