use std::{collections::BTreeMap, sync::Arc};

use crate::{
    config::EngineConfig,
    dsl::{
        encoder::Encoder,
        node::Normalization,
        ops::{BOOL_FALSE, BOOL_TRUE, OpKind},
        registry::{ArgsSpec, NodeBlueprint, NodeCategory, NodeRegistry, NodeSpec, ParamValue, Params, ReturnSpec},
        semantic::SemanticType,
    },
    error::{AugurResult, ConstructionError, SlotMismatch},
    report::ReportSchema,
};

// ================================================================================================
// Return-Type Resolvers
// ================================================================================================

/// `MIN`/`MAX`/`MEAN`: children of one tag keep it, mixed tags widen to
/// `NUMERICAL`.
fn resolve_polymorphic_numeric(
    _node_name: &str,
    child_types: &[SemanticType],
) -> Result<SemanticType, ConstructionError> {
    let first = child_types[0];
    if child_types.iter().all(|tag| *tag == first) {
        Ok(first)
    } else {
        Ok(SemanticType::Numerical)
    }
}

/// `CLAMP`: bounding keeps the bounded child's tag.
fn resolve_first_child(
    _node_name: &str,
    child_types: &[SemanticType],
) -> Result<SemanticType, ConstructionError> {
    Ok(child_types[0])
}

/// `IF_THEN_ELSE`: the predicate must be BOOLEAN or numeric (truthy when
/// `> 0`); the result is the join of the two arms.
fn resolve_branch(
    node_name: &str,
    child_types: &[SemanticType],
) -> Result<SemanticType, ConstructionError> {
    let pred = child_types[0];
    let pred_ok =
        pred == SemanticType::Boolean || pred == SemanticType::Any || pred.is_numeric_compatible();
    if !pred_ok {
        return Err(ConstructionError::TypeMismatch {
            node_name: node_name.to_string(),
            mismatches: vec![SlotMismatch {
                index: 0,
                actual: pred,
                declared: SemanticType::Boolean,
            }],
        });
    }

    child_types[1]
        .join(child_types[2])
        .ok_or_else(|| ConstructionError::TypeMismatch {
            node_name: node_name.to_string(),
            mismatches: vec![SlotMismatch {
                index: 2,
                actual: child_types[2],
                declared: child_types[1],
            }],
        })
}

// ================================================================================================
// Spec Builders
// ================================================================================================

fn constant(
    name: &str,
    description: &str,
    value: f64,
    norm: Normalization,
    tag: SemanticType,
) -> NodeSpec {
    NodeSpec {
        node_name: name.into(),
        category: NodeCategory::Constant,
        return_spec: ReturnSpec::Fixed(tag),
        args: None,
        params: Params::new(),
        description: description.into(),
        blueprint: NodeBlueprint::Constant { value, norm },
    }
}

fn variable(
    name: &str,
    description: &str,
    path: &str,
    encoder: Encoder,
    neutral: f64,
    tag: SemanticType,
) -> AugurResult<NodeSpec> {
    Ok(NodeSpec {
        node_name: name.into(),
        category: NodeCategory::Variable,
        return_spec: ReturnSpec::Fixed(tag),
        args: None,
        params: Params::new(),
        description: description.into(),
        blueprint: NodeBlueprint::Variable {
            path: path.parse()?,
            encoder,
            neutral,
        },
    })
}

fn operator(
    name: &str,
    description: &str,
    op: OpKind,
    args: ArgsSpec,
    return_spec: ReturnSpec,
) -> NodeSpec {
    NodeSpec {
        node_name: name.into(),
        category: NodeCategory::Operator,
        return_spec,
        args: Some(args),
        params: Params::new(),
        description: description.into(),
        blueprint: NodeBlueprint::Functional { op },
    }
}

fn binary_numeric(name: &str, description: &str, op: OpKind, returns: SemanticType) -> NodeSpec {
    operator(
        name,
        description,
        op,
        ArgsSpec::Fixed(vec![SemanticType::Numerical, SemanticType::Numerical]),
        ReturnSpec::Fixed(returns),
    )
}

fn variadic_numeric(name: &str, description: &str, op: OpKind, min: usize, multiple_of: usize) -> NodeSpec {
    operator(
        name,
        description,
        op,
        ArgsSpec::Variadic {
            elem: SemanticType::Numerical,
            min,
            multiple_of,
        },
        ReturnSpec::Resolver(resolve_polymorphic_numeric),
    )
}

fn category_map(pairs: &[(&str, f64)]) -> Encoder {
    Encoder::CategoryMap {
        map: pairs
            .iter()
            .map(|(category, value)| (category.to_string(), *value))
            .collect(),
    }
}

// ================================================================================================
// Builtin Vocabulary
// ================================================================================================

/// Builds, populates and freezes the standard node registry.
///
/// This is the single initialization point of the engine's process-wide
/// vocabulary; it runs before any rule is loaded and the returned registry
/// is shared read-only from then on.
pub fn builtin_registry(config: &EngineConfig) -> AugurResult<Arc<NodeRegistry>> {
    let mut registry = NodeRegistry::new(ReportSchema::standard());

    register_constants(&mut registry)?;
    register_variables(&mut registry)?;
    register_operators(&mut registry, config)?;

    registry.freeze();
    tracing::debug!(nodes = registry.names().count(), "node registry published");
    Ok(Arc::new(registry))
}

fn register_constants(registry: &mut NodeRegistry) -> AugurResult<()> {
    let specs = [
        constant(
            "NUM_CONST",
            "Free numeric literal; the `value` param carries the figure.",
            0.0,
            Normalization::Raw,
            SemanticType::Numerical,
        ),
        constant(
            "PCT_CONST",
            "Percent figure, normalized so 70 reads as 0.7.",
            0.0,
            Normalization::Percent,
            SemanticType::Percentage,
        ),
        constant(
            "PRICE_CONST",
            "Price threshold, made scale-free against a 100.0 reference.",
            0.0,
            Normalization::Price { reference: 100.0 },
            SemanticType::Price,
        ),
        constant(
            "RATIO_CONST",
            "Financial ratio squashed into the working space.",
            0.0,
            Normalization::Ratio,
            SemanticType::FinancialRatio,
        ),
        constant(
            "PROB_CONST",
            "Probability literal in [0, 1].",
            0.5,
            Normalization::Raw,
            SemanticType::ForecastProb,
        ),
        constant("TRUE", "Boolean true.", BOOL_TRUE, Normalization::Raw, SemanticType::Boolean),
        constant(
            "FALSE",
            "Boolean false.",
            BOOL_FALSE,
            Normalization::Raw,
            SemanticType::Boolean,
        ),
        constant(
            "RSI_OVERBOUGHT",
            "Conventional RSI overbought threshold.",
            70.0,
            Normalization::Raw,
            SemanticType::Momentum,
        ),
        constant(
            "RSI_OVERSOLD",
            "Conventional RSI oversold threshold.",
            30.0,
            Normalization::Raw,
            SemanticType::Momentum,
        ),
    ];

    for spec in specs {
        registry.register(spec)?;
    }
    Ok(())
}

fn register_variables(registry: &mut NodeRegistry) -> AugurResult<()> {
    let specs = [
        variable(
            "RSI_14",
            "Daily 14-period RSI reading.",
            "technical_report.daily_report.key_indicators.rsi_14",
            Encoder::Identity { lo: 0.0, hi: 100.0 },
            50.0,
            SemanticType::Momentum,
        )?,
        variable(
            "MA_DIRECTION_MIDTERM",
            "Mid-term moving-average direction.",
            "technical_report.daily_report.trend_report.midterm_report.ma_direction",
            category_map(&[("uptrend", 1.0), ("sideways", 0.0), ("downtrend", -1.0)]),
            0.0,
            SemanticType::Trend,
        )?,
        variable(
            "TREND_STRENGTH",
            "Overall trend strength in [0, 1].",
            "technical_report.daily_report.trend_report.overall_strength.value",
            Encoder::Identity { lo: 0.0, hi: 1.0 },
            0.0,
            SemanticType::Trend,
        )?,
        variable(
            "MACD_CROSSOVER_INTRADAY",
            "Intraday MACD crossover state.",
            "technical_report.intraday_report.momentum_report.macd_crossover",
            category_map(&[("bull", 1.0), ("none", 0.0), ("bear", -1.0)]),
            0.0,
            SemanticType::Momentum,
        )?,
        variable(
            "TRIPLE_BARRIER_PROB_UP",
            "Model probability of the upper barrier being hit first.",
            "forecasting_report.forecasts[0].prediction[0]",
            Encoder::Identity { lo: 0.0, hi: 1.0 },
            0.5,
            SemanticType::ForecastProb,
        )?,
        variable(
            "NEWS_POSITIVE_COUNT",
            "Positive-sentiment headline count, log-compressed.",
            "news_report.summary.num_positive_sentiment",
            Encoder::SignedLog { scale: 1.0 },
            0.0,
            SemanticType::Sentiment,
        )?,
        variable(
            "NEWS_NEGATIVE_COUNT",
            "Negative-sentiment headline count, log-compressed.",
            "news_report.summary.num_negative_sentiment",
            Encoder::SignedLog { scale: 1.0 },
            0.0,
            SemanticType::Sentiment,
        )?,
        variable(
            "NEWS_HIGH_IMPACT_COUNT",
            "High-impact headline count, log-compressed.",
            "news_report.summary.num_high_impact",
            Encoder::SignedLog { scale: 1.0 },
            0.0,
            SemanticType::Volatility,
        )?,
    ];

    for spec in specs {
        registry.register(spec)?;
    }
    Ok(())
}

fn register_operators(registry: &mut NodeRegistry, config: &EngineConfig) -> AugurResult<()> {
    let num = SemanticType::Numerical;
    let boolean = SemanticType::Boolean;

    let mut div_safe = binary_numeric(
        "DIV_SAFE",
        "Division guarded against small denominators.",
        OpKind::DivSafe,
        num,
    );
    div_safe.params = BTreeMap::from([(
        "epsilon".to_string(),
        ParamValue::Float(config.div_safe_epsilon),
    )]);

    let specs = [
        binary_numeric("ADD", "Sum of two numerics.", OpKind::Add, num),
        binary_numeric("SUB", "Difference of two numerics.", OpKind::Sub, num),
        binary_numeric("MUL", "Product of two numerics.", OpKind::Mul, num),
        div_safe,
        binary_numeric("GT", "Strictly greater-than.", OpKind::Gt, boolean),
        binary_numeric("LT", "Strictly less-than.", OpKind::Lt, boolean),
        binary_numeric("GEQ", "Greater-or-equal.", OpKind::Geq, boolean),
        binary_numeric("LEQ", "Less-or-equal.", OpKind::Leq, boolean),
        binary_numeric("EQ", "Exact equality.", OpKind::Eq, boolean),
        operator(
            "AND",
            "Fuzzy conjunction: the weaker operand wins.",
            OpKind::And,
            ArgsSpec::Fixed(vec![boolean, boolean]),
            ReturnSpec::Fixed(boolean),
        ),
        operator(
            "OR",
            "Fuzzy disjunction: the stronger operand wins.",
            OpKind::Or,
            ArgsSpec::Fixed(vec![boolean, boolean]),
            ReturnSpec::Fixed(boolean),
        ),
        operator(
            "NOT",
            "Negation of a boolean encoding.",
            OpKind::Not,
            ArgsSpec::Fixed(vec![boolean]),
            ReturnSpec::Fixed(boolean),
        ),
        variadic_numeric("MIN", "Smallest of the operands.", OpKind::Min, 2, 1),
        variadic_numeric("MAX", "Largest of the operands.", OpKind::Max, 2, 1),
        variadic_numeric("MEAN", "Arithmetic mean of the operands.", OpKind::Mean, 2, 1),
        operator(
            "WEIGHTED_SUM",
            "Alternating (value, weight) pairs summed as Σ value·weight.",
            OpKind::WeightedSum,
            ArgsSpec::Variadic {
                elem: num,
                min: 2,
                multiple_of: 2,
            },
            ReturnSpec::Fixed(num),
        ),
        operator(
            "CLAMP",
            "Bounds the first operand into [lo, hi].",
            OpKind::Clamp,
            ArgsSpec::Fixed(vec![num, num, num]),
            ReturnSpec::Resolver(resolve_first_child),
        ),
        operator(
            "SIGN",
            "-1, 0 or +1 from the operand's sign.",
            OpKind::Sign,
            ArgsSpec::Fixed(vec![num]),
            ReturnSpec::Fixed(num),
        ),
        operator(
            "TANH",
            "Squashes a free combination into (-1, 1).",
            OpKind::Tanh,
            ArgsSpec::Fixed(vec![num]),
            ReturnSpec::Fixed(num),
        ),
        NodeSpec {
            node_name: "IF_THEN_ELSE".into(),
            category: NodeCategory::Operator,
            return_spec: ReturnSpec::Resolver(resolve_branch),
            args: Some(ArgsSpec::Fixed(vec![
                SemanticType::Any,
                SemanticType::Any,
                SemanticType::Any,
            ])),
            params: Params::new(),
            description: "Evaluates the predicate, then only the selected arm.".into(),
            blueprint: NodeBlueprint::Branch,
        },
        operator(
            "DECISION",
            "Closes a tree as a decision signal in [-1, 1].",
            OpKind::Decision,
            ArgsSpec::Fixed(vec![num]),
            ReturnSpec::Fixed(SemanticType::DecisionSignal),
        ),
        operator(
            "RISK",
            "Closes a tree as a risk level in [0, 1].",
            OpKind::Risk,
            ArgsSpec::Fixed(vec![num]),
            ReturnSpec::Fixed(SemanticType::RiskLevel),
        ),
        operator(
            "OPPORTUNITY",
            "Closes a tree as an opportunity rating in [0, 1].",
            OpKind::Opportunity,
            ArgsSpec::Fixed(vec![num]),
            ReturnSpec::Fixed(SemanticType::OpportunityRating),
        ),
    ];

    for spec in specs {
        registry.register(spec)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{dsl::registry::Params, report::AnalysisReport};

    fn registry() -> Arc<NodeRegistry> {
        builtin_registry(&EngineConfig::default()).unwrap()
    }

    fn num_const(registry: &NodeRegistry, value: f64) -> crate::dsl::node::TreeNode {
        registry
            .create_node(
                "NUM_CONST",
                vec![],
                Params::from([("value".to_string(), ParamValue::Float(value))]),
            )
            .unwrap()
    }

    #[test]
    fn registry_is_frozen_after_build() {
        let registry = registry();
        assert!(registry.is_frozen());
        assert!(registry.lookup("RSI_14").is_ok());
        assert!(registry.lookup("DIV_SAFE").is_ok());
        assert!(registry.lookup("IF_THEN_ELSE").is_ok());
    }

    #[test]
    fn numeric_widening_admits_mixed_domain_comparisons() {
        // GT declares [NUMERICAL, NUMERICAL]; TREND and PRICE both widen.
        let registry = registry();
        let trend = registry
            .create_node("TREND_STRENGTH", vec![], Params::new())
            .unwrap();
        let price = registry.create_node("PRICE_CONST", vec![], Params::new()).unwrap();

        let gt = registry
            .create_node("GT", vec![trend, price], Params::new())
            .unwrap();
        assert_eq!(gt.return_type(), SemanticType::Boolean);
    }

    #[test]
    fn boolean_slots_reject_price_operands_at_every_position() {
        // AND declares [BOOLEAN, BOOLEAN]; PRICE does not widen into it,
        // and both offending slots are reported in one error.
        let registry = registry();
        let lhs = registry.create_node("PRICE_CONST", vec![], Params::new()).unwrap();
        let rhs = registry.create_node("PRICE_CONST", vec![], Params::new()).unwrap();

        let err = registry
            .create_node("AND", vec![lhs, rhs], Params::new())
            .unwrap_err();
        match &err {
            ConstructionError::TypeMismatch { mismatches, .. } => {
                let positions: Vec<usize> = mismatches.iter().map(|m| m.index).collect();
                assert_eq!(positions, vec![0, 1], "{err}");
                for mismatch in mismatches {
                    assert_eq!(mismatch.actual, SemanticType::Price);
                    assert_eq!(mismatch.declared, SemanticType::Boolean);
                }
            }
            other => panic!("expected TypeMismatch, got {other}"),
        }

        // A single bad slot reports exactly its own position.
        let good = registry.create_node("TRUE", vec![], Params::new()).unwrap();
        let bad = registry.create_node("PRICE_CONST", vec![], Params::new()).unwrap();
        let err = registry
            .create_node("AND", vec![good, bad], Params::new())
            .unwrap_err();
        match &err {
            ConstructionError::TypeMismatch { mismatches, .. } => {
                assert_eq!(mismatches.len(), 1, "{err}");
                assert_eq!(mismatches[0].index, 1);
            }
            other => panic!("expected TypeMismatch, got {other}"),
        }
    }

    #[test]
    fn polymorphic_aggregates_keep_uniform_tags() {
        let registry = registry();

        let a = registry.create_node("PRICE_CONST", vec![], Params::new()).unwrap();
        let b = registry.create_node("PRICE_CONST", vec![], Params::new()).unwrap();
        let same = registry.create_node("MAX", vec![a, b], Params::new()).unwrap();
        assert_eq!(same.return_type(), SemanticType::Price);

        let p = registry.create_node("PRICE_CONST", vec![], Params::new()).unwrap();
        let t = registry
            .create_node("TREND_STRENGTH", vec![], Params::new())
            .unwrap();
        let mixed = registry.create_node("MAX", vec![p, t], Params::new()).unwrap();
        assert_eq!(mixed.return_type(), SemanticType::Numerical);
    }

    #[test]
    fn branch_joins_arms_and_checks_predicates() {
        let registry = registry();

        let pred = registry.create_node("TRUE", vec![], Params::new()).unwrap();
        let a = num_const(&registry, 1.0);
        let b = num_const(&registry, -1.0);
        let branch = registry
            .create_node("IF_THEN_ELSE", vec![pred, a, b], Params::new())
            .unwrap();
        assert_eq!(branch.return_type(), SemanticType::Numerical);

        // Numeric predicates are allowed (truthy when > 0)…
        let pred = registry
            .create_node("TREND_STRENGTH", vec![], Params::new())
            .unwrap();
        let a = num_const(&registry, 1.0);
        let b = num_const(&registry, -1.0);
        assert!(registry
            .create_node("IF_THEN_ELSE", vec![pred, a, b], Params::new())
            .is_ok());

        // …but diverging arms are not.
        let pred = registry.create_node("TRUE", vec![], Params::new()).unwrap();
        let a = registry.create_node("PRICE_CONST", vec![], Params::new()).unwrap();
        let b = registry
            .create_node("TREND_STRENGTH", vec![], Params::new())
            .unwrap();
        let err = registry
            .create_node("IF_THEN_ELSE", vec![pred, a, b], Params::new())
            .unwrap_err();
        match err {
            ConstructionError::TypeMismatch { mismatches, .. } => {
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].index, 2);
            }
            other => panic!("expected TypeMismatch, got {other}"),
        }
    }

    #[test]
    fn weighted_sum_requires_pairs() {
        let registry = registry();
        let odd = vec![
            num_const(&registry, 1.0),
            num_const(&registry, 0.5),
            num_const(&registry, 2.0),
        ];
        let err = registry
            .create_node("WEIGHTED_SUM", odd, Params::new())
            .unwrap_err();
        assert!(matches!(err, ConstructionError::ArityMismatch { .. }));
    }

    #[test]
    fn div_safe_epsilon_follows_the_engine_config() {
        let config = EngineConfig::default().with_div_safe_epsilon(0.5);
        let registry = builtin_registry(&config).unwrap();

        let tree = registry
            .create_node(
                "DIV_SAFE",
                vec![num_const(&registry, 1.0), num_const(&registry, 0.25)],
                Params::new(),
            )
            .unwrap();

        // |0.25| < ε=0.5, so the guarded division yields 0.
        let report = AnalysisReport::from_value(json!({})).unwrap();
        assert_eq!(tree.evaluate(&report).unwrap(), 0.0);
    }

    #[test]
    fn overbought_rule_tree_evaluates_to_full_signal() {
        // DECISION(CLAMP(SIGN(SUB(RSI_14, 50)), -1, 1)) against rsi = 60.
        let registry = registry();

        let rsi = registry.create_node("RSI_14", vec![], Params::new()).unwrap();
        let fifty = num_const(&registry, 50.0);
        let sub = registry.create_node("SUB", vec![rsi, fifty], Params::new()).unwrap();
        let sign = registry.create_node("SIGN", vec![sub], Params::new()).unwrap();
        let clamp = registry
            .create_node(
                "CLAMP",
                vec![sign, num_const(&registry, -1.0), num_const(&registry, 1.0)],
                Params::new(),
            )
            .unwrap();
        let decision = registry.create_node("DECISION", vec![clamp], Params::new()).unwrap();

        assert_eq!(decision.return_type(), SemanticType::DecisionSignal);

        let report = AnalysisReport::from_value(json!({
            "technical_report": { "daily_report": { "key_indicators": { "rsi_14": 60.0 } } }
        }))
        .unwrap();
        assert_eq!(decision.evaluate(&report).unwrap(), 1.0);
    }

    #[test]
    fn every_builtin_variable_is_bounded() {
        let registry = registry();
        for spec in registry.specs_in(NodeCategory::Variable) {
            let NodeBlueprint::Variable { encoder, .. } = &spec.blueprint else {
                panic!("variable spec without variable blueprint: {}", spec.node_name);
            };
            assert!(
                encoder.bound().is_finite(),
                "{} must declare a finite bound",
                spec.node_name
            );
        }
    }
}
