//! Property tests for scalar assignment across the full declared range of
//! each integer kind.

use std::sync::Arc;

use proptest::prelude::*;
use relaywire_types::{FieldSpec, Message, MessageSpec, ScalarKind, TypeDescriptor, Value};

fn spec_for(kind: ScalarKind) -> Arc<MessageSpec> {
    Arc::new(MessageSpec::new("Scalar", vec![FieldSpec::new("v", TypeDescriptor::Scalar(kind))]))
}

proptest! {
    #[test]
    fn int32_round_trips_within_range(v in i32::MIN..=i32::MAX) {
        let mut msg = Message::new(spec_for(ScalarKind::Int32));
        msg.assign("v", v).expect("in-range i32 assigns");
        prop_assert_eq!(msg.get("v").expect("v was assigned"), Value::Int(i128::from(v)));
    }

    #[test]
    fn uint8_round_trips_within_range(v in 0u8..=u8::MAX) {
        let mut msg = Message::new(spec_for(ScalarKind::Uint8));
        msg.assign("v", v).expect("in-range u8 assigns");
        prop_assert_eq!(msg.get("v").expect("v was assigned"), Value::Int(i128::from(v)));
    }

    #[test]
    fn int8_rejects_values_outside_its_range(v in (i8::MAX as i128 + 1)..(i8::MAX as i128 + 1000)) {
        let mut msg = Message::new(spec_for(ScalarKind::Int8));
        prop_assert!(msg.assign("v", Value::Int(v)).is_err());
    }
}
