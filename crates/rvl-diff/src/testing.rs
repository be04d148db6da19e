use proptest::prelude::*;
use rvl_types::Attributes;
use serde_json::Value;

pub(crate) fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
        prop::collection::vec(any::<i32>(), 0..3).prop_map(Value::from),
    ]
}

pub(crate) fn arb_attributes() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map("[a-f]", arb_value(), 0..6)
}
