use std::fmt;

use thiserror::Error;

use crate::dsl::semantic::SemanticType;

pub type AugurResult<T> = Result<T, AugurError>;

/// One child slot whose value type cannot flow into the declared slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMismatch {
    pub index: usize,
    pub actual: SemanticType,
    pub declared: SemanticType,
}

impl fmt::Display for SlotMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "child {} returns {} but the slot declares {}",
            self.index, self.actual, self.declared
        )
    }
}

fn fmt_mismatches(mismatches: &[SlotMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum AugurError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Advisor(#[from] AdvisorError),
}

/// Errors raised by the node factory and the tree parser.
///
/// These are fatal to rule loading and must never occur on the evaluation
/// hot path: rules are validated when they enter the repository.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("duplicate node '{0}'")]
    DuplicateNode(String),

    #[error("arity mismatch for '{node_name}': expected {expected} children, got {actual}")]
    ArityMismatch {
        node_name: String,
        expected: String,
        actual: usize,
    },

    /// Every offending slot is reported, not just the first one the
    /// check happened to visit.
    #[error("type mismatch for '{node_name}': {}", fmt_mismatches(.mismatches))]
    TypeMismatch {
        node_name: String,
        mismatches: Vec<SlotMismatch>,
    },

    #[error("tree depth {depth} exceeds the construction cap of {cap}")]
    DepthExceeded { depth: usize, cap: usize },

    #[error("registry is frozen; '{0}' can no longer be registered")]
    RegistryFrozen(String),

    #[error("invalid param '{param}' for '{node_name}': {msg}")]
    InvalidParam {
        node_name: String,
        param: String,
        msg: String,
    },

    #[error("variable '{node_name}' reads report path '{path}' which the schema does not declare")]
    UndeclaredPath { node_name: String, path: String },

    #[error("rule '{rule_id}' root returns {actual}, which is not a recognized purpose")]
    InvalidPurpose { rule_id: String, actual: SemanticType },

    #[error("rule '{rule_id}' declares purpose {declared} but its root returns {actual}")]
    PurposeMismatch {
        rule_id: String,
        declared: SemanticType,
        actual: SemanticType,
    },

    #[error("malformed tree document at {path}: {msg}")]
    MalformedTree { path: String, msg: String },

    #[error("at {path}: {source}")]
    At {
        path: String,
        #[source]
        source: Box<ConstructionError>,
    },
}

impl ConstructionError {
    /// Wraps the error with the serialized-tree path of the offending node.
    pub fn at(self, path: impl Into<String>) -> Self {
        ConstructionError::At {
            path: path.into(),
            source: Box::new(self),
        }
    }
}

/// Per-rule evaluation failures.
///
/// The rules orchestrator absorbs these, records them as evidence, and
/// excludes the failing rule from aggregation.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("evaluation failed at {node_path}: {cause}")]
    Node { node_path: String, cause: String },

    #[error("rule '{rule_id}' failed at {node_path}: {cause}")]
    Rule {
        rule_id: String,
        node_path: String,
        cause: String,
    },
}

/// Errors raised by the rule repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("rule '{0}' not found")]
    RuleNotFound(String),

    #[error("rule repository unavailable: {0}")]
    Unavailable(String),
}

/// Errors on the analysis-report boundary. Fatal to an advisor request;
/// the core never falls back to stale data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("analysis report unavailable for '{ticker}': {msg}")]
    AnalysisReportUnavailable { ticker: String, msg: String },

    #[error("malformed analysis report: {0}")]
    MalformedReport(String),

    #[error("invalid report path '{path}': {msg}")]
    InvalidPath { path: String, msg: String },
}

/// Errors raised by the advisor composition itself.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor deadline of {deadline_ms}ms expired before any complete purpose run")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("meta weights must sum to a positive value, got {sum}")]
    InvalidMetaWeights { sum: f64 },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}
