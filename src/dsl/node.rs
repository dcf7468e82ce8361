use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    dsl::{
        encoder::Encoder,
        ops::{self, OpKind},
        registry::Params,
        semantic::SemanticType,
    },
    error::EvaluationError,
    report::{AnalysisReport, ReportPath},
};

/// Depth cap enforced at construction. Evaluation recurses once per level,
/// so this also bounds the evaluation stack.
pub const MAX_TREE_DEPTH: usize = 64;

// ================================================================================================
// Constant Normalization
// ================================================================================================

/// How a constant's stored literal is projected into the `[-1, 1]` working
/// space at construction.
///
/// Values already inside `[-1, 1]` are canonical and pass through
/// unchanged, which makes every normalization idempotent: a serialized
/// (already normalized) constant re-normalizes to itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "norm", rename_all = "snake_case")]
pub enum Normalization {
    /// Keeps the literal as-is (thresholds compared against raw readings).
    Raw,
    /// Percent figure: `70` becomes `0.7`.
    Percent,
    /// Price threshold, made scale-free against a configured reference.
    Price { reference: f64 },
    /// Free ratio squashed through `tanh`.
    Ratio,
}

impl Normalization {
    pub fn apply(self, x: f64) -> f64 {
        if x.abs() <= 1.0 {
            return x;
        }
        match self {
            Normalization::Raw => x,
            Normalization::Percent => (x / 100.0).clamp(-1.0, 1.0),
            Normalization::Price { reference } => (x / reference).clamp(-1.0, 1.0),
            Normalization::Ratio => x.tanh(),
        }
    }
}

// ================================================================================================
// Tree Nodes
// ================================================================================================

/// Variant-specific payload of a node, resolved at construction time.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A literal, already normalized. Never reads the report.
    Constant { value: f64 },

    /// Reads the leaf under `path` from the analysis report and encodes it.
    Variable {
        path: ReportPath,
        encoder: Encoder,
        neutral: f64,
    },

    /// A pure function of the child values, applied in declaration order.
    Functional { op: OpKind, epsilon: f64 },

    /// `IF_THEN_ELSE(pred, a, b)`: evaluates the predicate, then only the
    /// selected arm.
    Branch,
}

/// One node of a rule expression tree.
///
/// Nodes are immutable values; the registry factory is the only
/// construction path, which is what makes the type discipline (and with it
/// genetic mutation/crossover of trees) safe.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    name: Arc<str>,
    return_type: SemanticType,
    /// The explicit construction params, persisted verbatim by the codec.
    params: Params,
    children: Vec<TreeNode>,
    kind: NodeKind,
}

impl TreeNode {
    pub(crate) fn new(
        name: Arc<str>,
        return_type: SemanticType,
        params: Params,
        children: Vec<TreeNode>,
        kind: NodeKind,
    ) -> Self {
        Self {
            name,
            return_type,
            params,
            children,
            kind,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> SemanticType {
        self.return_type
    }

    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Number of levels, counting this node.
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(TreeNode::depth)
            .max()
            .unwrap_or(0)
    }

    /// Number of nodes in the subtree, counting this node.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }

    /// Evaluates the tree against a report.
    ///
    /// Pure and deterministic: for a fixed `(tree, report)` the result is
    /// the same float on every call. The result is always finite; a
    /// non-finite intermediate is reported as an evaluation failure with
    /// the path to the offending node.
    pub fn evaluate(&self, report: &AnalysisReport) -> Result<f64, EvaluationError> {
        self.eval_inner(report).map_err(|failure| {
            let mut names = failure.trail;
            names.reverse();
            EvaluationError::Node {
                node_path: names.join("/"),
                cause: failure.cause,
            }
        })
    }

    /// Evaluates the tree while recording the structural trace the
    /// explainer consumes: per evaluated node, its name, type and value.
    /// Unevaluated branch arms are absent from the trace.
    ///
    /// Single pass, like [`TreeNode::evaluate`]: each node's value is
    /// derived from its children's already-traced values, never from a
    /// second walk of the subtree.
    pub fn evaluate_traced(&self, report: &AnalysisReport) -> Result<NodeTrace, EvaluationError> {
        self.trace_inner(report).map_err(|failure| {
            let mut names = failure.trail;
            names.reverse();
            EvaluationError::Node {
                node_path: names.join("/"),
                cause: failure.cause,
            }
        })
    }

    fn eval_inner(&self, report: &AnalysisReport) -> Result<f64, EvalFailure> {
        let value = match &self.kind {
            NodeKind::Constant { value } => *value,

            NodeKind::Variable {
                path,
                encoder,
                neutral,
            } => encoder.encode(report.get(path), *neutral),

            NodeKind::Functional { op, epsilon } => {
                let mut args: SmallVec<[f64; 4]> = SmallVec::with_capacity(self.children.len());
                for (index, child) in self.children.iter().enumerate() {
                    args.push(child.eval_inner(report).map_err(|f| f.via(self, index))?);
                }
                op.apply(&args, *epsilon)
            }

            NodeKind::Branch => {
                let pred = self.children[0]
                    .eval_inner(report)
                    .map_err(|f| f.via(self, 0))?;
                let arm_index = if ops::truthy(pred) { 1 } else { 2 };
                self.children[arm_index]
                    .eval_inner(report)
                    .map_err(|f| f.via(self, arm_index))?
            }
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalFailure::at(self, format!("non-finite result {value}")))
        }
    }

    /// Mirror of [`TreeNode::eval_inner`] that keeps the per-node values
    /// it computes along the way.
    fn trace_inner(&self, report: &AnalysisReport) -> Result<NodeTrace, EvalFailure> {
        let (value, children) = match &self.kind {
            NodeKind::Constant { value } => (*value, Vec::new()),

            NodeKind::Variable {
                path,
                encoder,
                neutral,
            } => (encoder.encode(report.get(path), *neutral), Vec::new()),

            NodeKind::Functional { op, epsilon } => {
                let mut traces = Vec::with_capacity(self.children.len());
                let mut args: SmallVec<[f64; 4]> = SmallVec::with_capacity(self.children.len());
                for (index, child) in self.children.iter().enumerate() {
                    let trace = child.trace_inner(report).map_err(|f| f.via(self, index))?;
                    args.push(trace.value);
                    traces.push(trace);
                }
                (op.apply(&args, *epsilon), traces)
            }

            NodeKind::Branch => {
                let pred = self.children[0]
                    .trace_inner(report)
                    .map_err(|f| f.via(self, 0))?;
                let arm_index = if ops::truthy(pred.value) { 1 } else { 2 };
                let arm = self.children[arm_index]
                    .trace_inner(report)
                    .map_err(|f| f.via(self, arm_index))?;
                let value = arm.value;
                (value, vec![pred, arm])
            }
        };

        if value.is_finite() {
            Ok(NodeTrace {
                node_name: self.name.to_string(),
                return_type: self.return_type,
                value,
                children,
            })
        } else {
            Err(EvalFailure::at(self, format!("non-finite result {value}")))
        }
    }
}

/// Internal unwind record; the trail collects node names leaf-to-root and
/// is reversed into a readable path at the public boundary.
struct EvalFailure {
    trail: Vec<String>,
    cause: String,
}

impl EvalFailure {
    fn at(node: &TreeNode, cause: String) -> Self {
        Self {
            trail: vec![node.name.to_string()],
            cause,
        }
    }

    fn via(mut self, node: &TreeNode, child_index: usize) -> Self {
        self.trail
            .push(format!("{}[{child_index}]", node.name));
        self
    }
}

// ================================================================================================
// Structural Trace
// ================================================================================================

/// Structural evidence for one evaluated node.
///
/// This is the substrate the natural-language explainer works from; the
/// engine itself never renders prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTrace {
    pub node_name: String,
    pub return_type: SemanticType,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeTrace>,
}
