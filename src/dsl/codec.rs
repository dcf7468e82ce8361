use serde_json::{Map, Value};

use crate::{
    dsl::{
        node::TreeNode,
        registry::{NodeRegistry, ParamValue, Params},
    },
    error::ConstructionError,
};

// ================================================================================================
// Serializer
// ================================================================================================

/// Serializes a tree into the neutral tagged-dictionary form:
///
/// ```json
/// { "node_name": "SUB",
///   "params":    { "value": 50.0 },
///   "children":  [ … ] }
/// ```
///
/// `params` and `children` are omitted when empty. Neither the return type
/// nor the node class is encoded: both are re-derived from the registry
/// on parse, which is what keeps persisted rules portable across engine
/// versions that only widen the vocabulary.
pub fn serialize_tree(tree: &TreeNode) -> Value {
    let mut doc = Map::new();
    doc.insert(
        "node_name".to_string(),
        Value::String(tree.node_name().to_string()),
    );

    if !tree.params().is_empty() {
        let params: Map<String, Value> = tree
            .params()
            .iter()
            .map(|(key, value)| (key.clone(), param_to_value(value)))
            .collect();
        doc.insert("params".to_string(), Value::Object(params));
    }

    if !tree.children().is_empty() {
        let children: Vec<Value> = tree.children().iter().map(serialize_tree).collect();
        doc.insert("children".to_string(), Value::Array(children));
    }

    Value::Object(doc)
}

fn param_to_value(param: &ParamValue) -> Value {
    match param {
        ParamValue::Bool(b) => Value::Bool(*b),
        ParamValue::Int(i) => Value::Number((*i).into()),
        ParamValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ParamValue::Str(s) => Value::String(s.clone()),
    }
}

// ================================================================================================
// Parser
// ================================================================================================

/// Reconstructs a tree from its serialized form.
///
/// Construction goes through [`NodeRegistry::create_node`] exclusively, so
/// every invariant the factory enforces holds for parsed trees too. A
/// node name that is no longer registered fails with `UnknownNode` at the
/// offending path, never a silent substitution; migrating such rules is
/// the repository layer's job.
pub fn parse_tree(registry: &NodeRegistry, doc: &Value) -> Result<TreeNode, ConstructionError> {
    parse_at(registry, doc, "root")
}

fn parse_at(
    registry: &NodeRegistry,
    doc: &Value,
    path: &str,
) -> Result<TreeNode, ConstructionError> {
    let malformed = |msg: &str| ConstructionError::MalformedTree {
        path: path.to_string(),
        msg: msg.to_string(),
    };

    let obj = doc.as_object().ok_or_else(|| malformed("node must be an object"))?;

    let node_name = obj
        .get("node_name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing or non-string 'node_name'"))?;

    let params: Params = match obj.get("params") {
        None | Some(Value::Null) => Params::new(),
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| malformed(&format!("invalid 'params': {e}")))?,
    };

    let children = match obj.get("children") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                parse_at(registry, item, &format!("{path}.children[{index}]"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(malformed("'children' must be an array")),
    };

    registry
        .create_node(node_name, children, params)
        .map_err(|e| match e {
            // Child errors already carry their own path.
            ConstructionError::At { .. } => e,
            other => other.at(path),
        })
}
