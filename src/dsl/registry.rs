use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    dsl::{
        encoder::Encoder,
        node::{MAX_TREE_DEPTH, NodeKind, Normalization, TreeNode},
        ops::OpKind,
        semantic::SemanticType,
    },
    error::{ConstructionError, SlotMismatch},
    report::{ReportPath, ReportSchema},
};

// ================================================================================================
// Node Params
// ================================================================================================

/// Construction parameters: primitive scalars keyed by name, merged over
/// the spec defaults by the factory.
pub type Params = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Bool(_) | ParamValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

// ================================================================================================
// Node Specs
// ================================================================================================

/// Coarse classification of a registered node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeCategory {
    Constant,
    Variable,
    Operator,
}

/// Declared child slots of an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgsSpec {
    /// Exactly these slots, in order.
    Fixed(Vec<SemanticType>),
    /// `min` or more children of one element tag; the count must be a
    /// multiple of `multiple_of` (e.g. 2 for value/weight pairs).
    Variadic {
        elem: SemanticType,
        min: usize,
        multiple_of: usize,
    },
}

impl ArgsSpec {
    fn accepts_len(&self, n: usize) -> bool {
        match self {
            ArgsSpec::Fixed(slots) => n == slots.len(),
            ArgsSpec::Variadic {
                min, multiple_of, ..
            } => {
                let step = (*multiple_of).max(1);
                n >= *min && n % step == 0
            }
        }
    }

    fn slot(&self, index: usize) -> SemanticType {
        match self {
            ArgsSpec::Fixed(slots) => slots[index],
            ArgsSpec::Variadic { elem, .. } => *elem,
        }
    }

    fn expected_label(&self) -> String {
        match self {
            ArgsSpec::Fixed(slots) => slots.len().to_string(),
            ArgsSpec::Variadic {
                min, multiple_of, ..
            } if *multiple_of > 1 => format!("at least {min}, in groups of {multiple_of}"),
            ArgsSpec::Variadic { min, .. } => format!("at least {min}"),
        }
    }
}

/// How the effective return type of a node is determined.
///
/// Polymorphic operators (`MIN`, `MAX`, branch joins, …) carry a resolver,
/// a pure function of the children's return types; everything else is
/// fixed at registration.
#[derive(Clone)]
pub enum ReturnSpec {
    Fixed(SemanticType),
    Resolver(fn(&str, &[SemanticType]) -> Result<SemanticType, ConstructionError>),
}

impl std::fmt::Debug for ReturnSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnSpec::Fixed(tag) => write!(f, "Fixed({tag})"),
            ReturnSpec::Resolver(_) => write!(f, "Resolver(..)"),
        }
    }
}

/// Instantiation recipe stored in the spec.
#[derive(Debug, Clone)]
pub enum NodeBlueprint {
    Constant {
        value: f64,
        norm: Normalization,
    },
    Variable {
        path: ReportPath,
        encoder: Encoder,
        neutral: f64,
    },
    Functional {
        op: OpKind,
    },
    Branch,
}

/// A registered node kind: the single source of truth for what may be
/// constructed under a given name.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub node_name: Arc<str>,
    pub category: NodeCategory,
    pub return_spec: ReturnSpec,
    /// `None` for leaves. An operator with `Some(Fixed(vec![]))` is an
    /// explicitly 0-arity operator; plain operators never accept zero
    /// children.
    pub args: Option<ArgsSpec>,
    /// Default params, overridable per construction.
    pub params: Params,
    pub description: Arc<str>,
    pub blueprint: NodeBlueprint,
}

// ================================================================================================
// Registry & Factory
// ================================================================================================

/// The process-wide vocabulary of constructible nodes.
///
/// Populated once at startup, then frozen and shared read-only
/// (`Arc<NodeRegistry>`); `create_node` is the only legal construction
/// path for trees, for hand-written seeds and for the evolutionary
/// producer alike.
#[derive(Debug)]
pub struct NodeRegistry {
    specs: HashMap<Arc<str>, NodeSpec>,
    schema: ReportSchema,
    frozen: bool,
}

impl NodeRegistry {
    pub fn new(schema: ReportSchema) -> Self {
        Self {
            specs: HashMap::new(),
            schema,
            frozen: false,
        }
    }

    /// Registers a spec. Variable paths are validated against the report
    /// schema here, at build time, never during evaluation.
    pub fn register(&mut self, spec: NodeSpec) -> Result<(), ConstructionError> {
        if self.frozen {
            return Err(ConstructionError::RegistryFrozen(
                spec.node_name.to_string(),
            ));
        }
        if self.specs.contains_key(&spec.node_name) {
            return Err(ConstructionError::DuplicateNode(spec.node_name.to_string()));
        }

        match &spec.blueprint {
            NodeBlueprint::Variable { path, .. } => {
                if !self.schema.declares(path) {
                    return Err(ConstructionError::UndeclaredPath {
                        node_name: spec.node_name.to_string(),
                        path: path.to_string(),
                    });
                }
            }
            NodeBlueprint::Constant { value, norm } => {
                if !value.is_finite() {
                    return Err(ConstructionError::InvalidParam {
                        node_name: spec.node_name.to_string(),
                        param: "value".to_string(),
                        msg: "default must be finite".to_string(),
                    });
                }
                if let Normalization::Price { reference } = norm
                    && *reference <= 0.0
                {
                    return Err(ConstructionError::InvalidParam {
                        node_name: spec.node_name.to_string(),
                        param: "reference".to_string(),
                        msg: "price reference must be positive".to_string(),
                    });
                }
            }
            NodeBlueprint::Functional { .. } | NodeBlueprint::Branch => {}
        }

        self.specs.insert(spec.node_name.clone(), spec);
        Ok(())
    }

    /// Publishes the registry: registration is rejected from here on.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn lookup(&self, node_name: &str) -> Result<&NodeSpec, ConstructionError> {
        self.specs
            .get(node_name)
            .ok_or_else(|| ConstructionError::UnknownNode(node_name.to_string()))
    }

    pub fn schema(&self) -> &ReportSchema {
        &self.schema
    }

    /// Iterates registered node names; the vocabulary surface a genetic
    /// producer samples from.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(|name| name.as_ref())
    }

    pub fn specs_in(&self, category: NodeCategory) -> impl Iterator<Item = &NodeSpec> {
        self.specs
            .values()
            .filter(move |spec| spec.category == category)
    }

    /// The central constructor.
    ///
    /// Checks arity and slot assignability (numeric-compatible tags widen
    /// into `NUMERICAL` slots), resolves the effective return type, and
    /// instantiates the node. Everything a tree can violate is rejected
    /// here, which is what keeps evaluation total.
    pub fn create_node(
        &self,
        node_name: &str,
        children: Vec<TreeNode>,
        params: Params,
    ) -> Result<TreeNode, ConstructionError> {
        let spec = self.lookup(node_name)?;

        // Merge explicit params over the registered defaults.
        let mut effective = spec.params.clone();
        effective.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        match &spec.args {
            None => {
                if !children.is_empty() {
                    return Err(ConstructionError::ArityMismatch {
                        node_name: node_name.to_string(),
                        expected: "0".to_string(),
                        actual: children.len(),
                    });
                }
            }
            Some(args) => {
                if !args.accepts_len(children.len()) {
                    return Err(ConstructionError::ArityMismatch {
                        node_name: node_name.to_string(),
                        expected: args.expected_label(),
                        actual: children.len(),
                    });
                }
                let mismatches: Vec<SlotMismatch> = children
                    .iter()
                    .enumerate()
                    .filter_map(|(index, child)| {
                        let declared = args.slot(index);
                        (!slot_accepts(child.return_type(), declared)).then(|| SlotMismatch {
                            index,
                            actual: child.return_type(),
                            declared,
                        })
                    })
                    .collect();
                if !mismatches.is_empty() {
                    return Err(ConstructionError::TypeMismatch {
                        node_name: node_name.to_string(),
                        mismatches,
                    });
                }
            }
        }

        let child_types: Vec<SemanticType> =
            children.iter().map(TreeNode::return_type).collect();
        let return_type = match &spec.return_spec {
            ReturnSpec::Fixed(tag) => *tag,
            ReturnSpec::Resolver(resolve) => resolve(node_name, &child_types)?,
        };

        let depth = 1 + children.iter().map(TreeNode::depth).max().unwrap_or(0);
        if depth > MAX_TREE_DEPTH {
            return Err(ConstructionError::DepthExceeded {
                depth,
                cap: MAX_TREE_DEPTH,
            });
        }

        let kind = match &spec.blueprint {
            NodeBlueprint::Constant { value, norm } => {
                let raw = match effective.get("value") {
                    Some(param) => param.as_f64().ok_or_else(|| {
                        ConstructionError::InvalidParam {
                            node_name: node_name.to_string(),
                            param: "value".to_string(),
                            msg: "must be numeric".to_string(),
                        }
                    })?,
                    None => *value,
                };
                if !raw.is_finite() {
                    return Err(ConstructionError::InvalidParam {
                        node_name: node_name.to_string(),
                        param: "value".to_string(),
                        msg: "must be finite".to_string(),
                    });
                }
                NodeKind::Constant {
                    value: norm.apply(raw),
                }
            }

            NodeBlueprint::Variable {
                path,
                encoder,
                neutral,
            } => NodeKind::Variable {
                path: path.clone(),
                encoder: encoder.clone(),
                neutral: *neutral,
            },

            NodeBlueprint::Functional { op } => {
                let epsilon = match effective.get("epsilon") {
                    Some(param) => param.as_f64().ok_or_else(|| {
                        ConstructionError::InvalidParam {
                            node_name: node_name.to_string(),
                            param: "epsilon".to_string(),
                            msg: "must be numeric".to_string(),
                        }
                    })?,
                    None => crate::config::DEFAULT_DIV_SAFE_EPSILON,
                };
                NodeKind::Functional { op: *op, epsilon }
            }

            NodeBlueprint::Branch => NodeKind::Branch,
        };

        Ok(TreeNode::new(
            spec.node_name.clone(),
            return_type,
            params,
            children,
            kind,
        ))
    }
}

/// Slot acceptance: plain assignability plus the silent widening of
/// numeric-compatible tags into `NUMERICAL` slots.
fn slot_accepts(child: SemanticType, declared: SemanticType) -> bool {
    child.assignable(declared)
        || (declared == SemanticType::Numerical && child.is_numeric_compatible())
}
