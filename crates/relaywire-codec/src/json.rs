//! JSON codec for text interop.
//!
//! Canonical form already matches `serde_json::Value`'s shape closely
//! (scalars as numbers/strings/bools, arrays as lists, dicts as
//! objects keyed by field name), so encode/decode is a structural
//! conversion between [`Value`] and `serde_json::Value` with the type
//! system doing all range/shape validation on the way back in.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use relaywire_types::{Message, MessageSpec, SchemaRegistry, TypeDescriptor, Value};
use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::error::CodecError;
use crate::Serializer;

/// Self-describing text codec; accepts `Map` and `Variant` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Serializer for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn is_self_describing(&self) -> bool {
        true
    }

    fn encode(&self, registry: &SchemaRegistry, message: &Message) -> Result<Vec<u8>, CodecError> {
        let reduced = message.reduce(registry)?;
        let json = value_to_json(&reduced);
        Ok(serde_json::to_vec(&json)?)
    }

    fn decode(&self, registry: &SchemaRegistry, spec: &Arc<MessageSpec>, bytes: &[u8]) -> Result<Message, CodecError> {
        let json: Json = serde_json::from_slice(bytes)?;
        let Json::Object(object) = json else {
            return Err(CodecError::UnsupportedShape { codec: "json", shape: "top-level value is not an object" });
        };
        let fields = object
            .into_iter()
            .map(|(k, v)| {
                let value = match spec.field(&k) {
                    Some(field) => json_to_value_typed(&field.ty, registry, v),
                    None => json_to_value(v),
                };
                (k, value)
            })
            .collect();
        Message::construct(spec, registry, fields).map_err(CodecError::from)
    }
}

impl JsonCodec {
    /// Encode a schema-free [`Value`] tree directly, bypassing a
    /// `Message`'s field validation — the `Variant` interop path used for
    /// HTTP bodies (out of scope transport, in-scope codec).
    #[must_use]
    pub fn encode_variant(value: &Value) -> Vec<u8> {
        serde_json::to_vec(&value_to_json(value)).unwrap_or_default()
    }

    /// Inverse of [`JsonCodec::encode_variant`].
    ///
    /// # Errors
    /// Returns [`CodecError::Json`] if `bytes` is not valid JSON.
    pub fn decode_variant(bytes: &[u8]) -> Result<Value, CodecError> {
        let json: Json = serde_json::from_slice(bytes)?;
        Ok(json_to_value(json))
    }
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Number::from_i128(*i).map_or_else(|| Json::String(i.to_string()), Json::Number),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::String(BASE64.encode(b)),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(entries) => {
            let mut object = JsonMap::with_capacity(entries.len());
            for (k, v) in entries {
                let key = match k {
                    Value::Text(s) => s.clone(),
                    other => other.to_string(),
                };
                object.insert(key, value_to_json(v));
            }
            Json::Object(object)
        }
        Value::Message(nested) => {
            let mut object = JsonMap::with_capacity(nested.spec().fields.len());
            for field in &nested.spec().fields {
                if let Ok(v) = nested.get(&field.name) {
                    object.insert(field.name.clone(), value_to_json(&v));
                }
            }
            Json::Object(object)
        }
    }
}

fn json_to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i128::from(i))
            } else if let Some(u) = n.as_u64() {
                Value::Int(i128::from(u))
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => Value::Text(s),
        Json::Array(items) => Value::Array(items.into_iter().map(json_to_value).collect()),
        Json::Object(object) => Value::Map(object.into_iter().map(|(k, v)| (Value::Text(k), json_to_value(v))).collect()),
    }
}

/// Schema-aware counterpart of [`json_to_value`]: a `Buffer` field's JSON
/// string is base64, not literal text, so it must be decoded back to
/// bytes here rather than left for [`relaywire_types::Message::construct`]'s
/// generic text-as-bytes coercion (which exists for the user-convenience
/// path of assigning a string literal directly, not for base64).
fn json_to_value_typed(ty: &TypeDescriptor, registry: &SchemaRegistry, json: Json) -> Value {
    match (ty, json) {
        (TypeDescriptor::Buffer(_), Json::String(s)) => Value::Bytes(BASE64.decode(s).unwrap_or_default()),
        (TypeDescriptor::Array(elem, _), Json::Array(items)) => {
            Value::Array(items.into_iter().map(|item| json_to_value_typed(elem, registry, item)).collect())
        }
        (TypeDescriptor::Map(_, val_ty), Json::Object(object)) => {
            Value::Map(object.into_iter().map(|(k, v)| (Value::Text(k), json_to_value_typed(val_ty, registry, v))).collect())
        }
        (TypeDescriptor::Dict(dict_name), Json::Object(object)) => {
            let Some(nested_spec) = registry.get(dict_name) else {
                return Value::Map(object.into_iter().map(|(k, v)| (Value::Text(k), json_to_value(v))).collect());
            };
            Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| {
                        let value = match nested_spec.field(&k) {
                            Some(field) => json_to_value_typed(&field.ty, registry, v),
                            None => json_to_value(v),
                        };
                        (Value::Text(k), value)
                    })
                    .collect(),
            )
        }
        (_, json) => json_to_value(json),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use relaywire_types::{FieldSpec, ScalarKind, SizeSource, TypeDescriptor};

    fn point_spec() -> Arc<MessageSpec> {
        Arc::new(MessageSpec::new(
            "Point",
            vec![
                FieldSpec::new("x", TypeDescriptor::Scalar(ScalarKind::Int32)),
                FieldSpec::new("y", TypeDescriptor::Scalar(ScalarKind::Int32)),
                FieldSpec::new("label", TypeDescriptor::Str(SizeSource::SelfDescribing)).optional(),
            ],
        ))
    }

    #[test]
    fn round_trips_through_json_text() {
        let spec = point_spec();
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(Arc::clone(&spec));
        msg.assign("x", 3i32).unwrap();
        msg.assign("y", -4i32).unwrap();
        let codec = JsonCodec;
        let bytes = codec.encode(&registry, &msg).expect("encodes");
        assert!(String::from_utf8(bytes.clone()).unwrap().contains("\"x\":3"));
        let decoded = codec.decode(&registry, &spec, &bytes).expect("decodes");
        assert_eq!(decoded.get("x").unwrap(), Value::Int(3));
        assert_eq!(decoded.get("y").unwrap(), Value::Int(-4));
    }

    #[test]
    fn variant_round_trips_without_a_schema() {
        let value = Value::Map(vec![(Value::Text("k".into()), Value::Array(vec![Value::Int(1), Value::Bool(true), Value::Null]))]);
        let bytes = JsonCodec::encode_variant(&value);
        let back = JsonCodec::decode_variant(&bytes).expect("decodes");
        assert_eq!(back, value);
    }

    #[test]
    fn buffer_field_round_trips_as_base64_not_literal_text() {
        let spec = Arc::new(MessageSpec::new("Blob", vec![FieldSpec::new("data", TypeDescriptor::Buffer(SizeSource::SelfDescribing))]));
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(Arc::clone(&spec));
        let payload = vec![0u8, 255, 16, 1, 2, 3];
        msg.assign("data", payload.clone()).unwrap();

        let codec = JsonCodec;
        let bytes = codec.encode(&registry, &msg).expect("encodes");
        let as_text = String::from_utf8(bytes.clone()).unwrap();
        assert!(!as_text.contains('\u{0}'), "buffer bytes must be base64, not embedded raw");

        let decoded = codec.decode(&registry, &spec, &bytes).expect("decodes");
        assert_eq!(decoded.get("data").unwrap(), Value::Bytes(payload));
    }
}
