//! Property tests for the wire protocol: marshaling stays single-line and
//! lossless, and the trailing-unit scan survives incidental output.

use offload::protocol::{parse_trailing, ResultUnit};
use offload::{Expr, TaskUnit};
use proptest::prelude::*;
use serde_json::Value;

/// Arbitrary printable values: JSON scalars and nested arrays. Floats are
/// excluded up front (NaN and infinities have no JSON representation).
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 :=-]{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Value::Array)
    })
}

proptest! {
    #[test]
    fn task_units_survive_the_wire(value in arb_value()) {
        let task = TaskUnit::new(Expr::Value(value));
        let line = task.to_line().unwrap();
        prop_assert!(!line.contains('\n'));
        prop_assert_eq!(TaskUnit::from_line(&line).unwrap(), task);
    }

    #[test]
    fn literal_tasks_evaluate_to_themselves(value in arb_value()) {
        let task = TaskUnit::new(Expr::Value(value.clone()));
        let result = task.body.eval(&task.environment()).unwrap();
        prop_assert_eq!(result, value);
    }

    #[test]
    fn trailing_scan_ignores_incidental_output(
        value in arb_value(),
        noise in prop::collection::vec("[a-z ]{1,20}", 0..4),
    ) {
        let unit = ResultUnit::Value(value);
        let mut wire = String::new();
        for line in &noise {
            wire.push_str(line);
            wire.push('\n');
        }
        wire.push_str(&unit.to_line().unwrap());
        wire.push('\n');

        prop_assert_eq!(parse_trailing(wire.as_bytes()), Some(unit));
    }

    #[test]
    fn signal_units_keep_category_and_payload(
        category in "[a-z][a-z-]{0,12}",
        payload in arb_value(),
    ) {
        let unit = ResultUnit::Signal {
            category: category.clone(),
            payload: payload.clone(),
        };
        let line = unit.to_line().unwrap();
        match parse_trailing(line.as_bytes()) {
            Some(ResultUnit::Signal { category: c, payload: p }) => {
                prop_assert_eq!(c, category);
                prop_assert_eq!(p, payload);
            },
            other => prop_assert!(false, "expected signal, got {:?}", other),
        }
    }
}
