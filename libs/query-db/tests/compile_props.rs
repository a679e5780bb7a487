//! The compiler and the in-memory evaluator accept and reject the same
//! parameter sets.

mod common;

use proptest::prelude::*;
use query_core::{BoolOp, Condition, Operator, ParameterSet, Value};
use query_db::{Query, Repository, Target};

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<i32>().prop_map(Value::Int),
        (-1000.0f64..1000.0).prop_map(Value::Double),
        "[a-z %_]{0,6}".prop_map(Value::String),
        any::<bool>().prop_map(Value::Bool),
    ]
}

fn operator() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Eq),
        Just(Operator::NotEq),
        Just(Operator::Like),
        Just(Operator::Gt),
        Just(Operator::Geq),
        Just(Operator::Lt),
        Just(Operator::Leq),
        Just(Operator::Between),
        Just(Operator::In),
        Just(Operator::NotIn),
        Just(Operator::IsNull),
        Just(Operator::IsNotNull),
    ]
}

fn condition() -> impl Strategy<Value = (String, Condition)> {
    (
        prop_oneof![
            Just("hits"),
            Just("name"),
            Just("score"),
            Just("other.name"),
            Just("other.rank")
        ],
        operator(),
        proptest::collection::vec(value(), 0..3),
        any::<bool>(),
    )
        .prop_map(|(field, op, values, or)| {
            let c = Condition::new(op, values);
            (field.to_string(), if or { c.or() } else { c })
        })
}

fn parameter_set() -> impl Strategy<Value = ParameterSet> {
    let leaf = proptest::collection::vec(condition(), 0..4).prop_map(|cs| {
        cs.into_iter()
            .fold(ParameterSet::new(), |set, (name, c)| set.param(name, c))
    });
    leaf.prop_recursive(2, 12, 3, |inner| {
        (
            proptest::collection::vec(condition(), 0..3),
            proptest::collection::vec((inner, any::<bool>()), 0..2),
        )
            .prop_map(|(cs, groups)| {
                let mut set = cs
                    .into_iter()
                    .fold(ParameterSet::new(), |set, (name, c)| set.param(name, c));
                for (g, or) in groups {
                    set.add_group(g, if or { BoolOp::Or } else { BoolOp::And });
                }
                set
            })
    })
}

proptest! {
    #[test]
    fn compiler_and_evaluator_agree_on_validity(params in parameter_set()) {
        let repo = common::seeded();
        let compiled = Query::select(Target::new("Account", "a")).filter(params.clone()).compile();
        let evaluated = repo.find_by(&params);
        prop_assert_eq!(compiled.is_ok(), evaluated.is_ok(), "compiled: {:?}", compiled);
    }

    #[test]
    fn placeholders_are_unique_and_referenced(params in parameter_set()) {
        if let Ok(stmt) = Query::select(Target::new("Account", "a")).filter(params).compile() {
            let mut names: Vec<&str> = stmt.params.names().collect();
            for name in &names {
                let needle = format!(":{name}");
                prop_assert!(stmt.sql.contains(&needle));
            }
            let before = names.len();
            names.sort_unstable();
            names.dedup();
            prop_assert_eq!(before, names.len());
        }
    }
}
