//! Transparent passthrough codec.
//!
//! Materializes a [`Message`]'s canonical form — filling defaults and
//! enforcing required-field constraints exactly like `Binary`/
//! `TagBinary` — without ever turning it into bytes. Used for
//! pretty-printing and for tests that want `construct`/`reduce`
//! validation without committing to a wire format.

use std::sync::Arc;

use relaywire_types::{Message, MessageSpec, SchemaRegistry};

use crate::error::CodecError;
use crate::Serializer;

/// A codec that never produces bytes; `encode`/`decode` always fail.
///
/// Use [`PassthroughCodec::materialize`]/[`PassthroughCodec::rehydrate`]
/// instead, which stay within the `Message`/canonical-form domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl PassthroughCodec {
    /// Run `message` through `reduce`, validating required fields and
    /// filling defaults, without encoding anything.
    ///
    /// # Errors
    /// Propagates [`relaywire_types::SchemaError`] from `reduce`.
    pub fn materialize(message: &Message, registry: &SchemaRegistry) -> Result<relaywire_types::Value, CodecError> {
        Ok(message.reduce(registry)?)
    }

    /// Rebuild a `Message` from a canonical `(field, value)` list already
    /// in hand — the inverse of [`PassthroughCodec::materialize`] for a
    /// `Value::Map`.
    ///
    /// # Errors
    /// [`CodecError::UnsupportedShape`] if `canonical` is not a `Map`;
    /// otherwise propagates `Message::construct`'s `SchemaError`.
    pub fn rehydrate(spec: &Arc<MessageSpec>, registry: &SchemaRegistry, canonical: relaywire_types::Value) -> Result<Message, CodecError> {
        let relaywire_types::Value::Map(entries) = canonical else {
            return Err(CodecError::UnsupportedShape { codec: "passthrough", shape: "non-map canonical form" });
        };
        let fields = entries
            .into_iter()
            .map(|(k, v)| match k {
                relaywire_types::Value::Text(name) => Ok((name, v)),
                other => Err(CodecError::Schema(relaywire_types::SchemaError::TypeMismatch {
                    field: "<canonical key>".into(),
                    expected: "text field name",
                    found: other.kind_name(),
                })),
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Message::construct(spec, registry, fields).map_err(CodecError::from)
    }
}

impl Serializer for PassthroughCodec {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn is_self_describing(&self) -> bool {
        true
    }

    fn encode(&self, _registry: &SchemaRegistry, _message: &Message) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::UnsupportedShape { codec: "passthrough", shape: "any — this codec never produces bytes" })
    }

    fn decode(&self, _registry: &SchemaRegistry, _spec: &Arc<MessageSpec>, _bytes: &[u8]) -> Result<Message, CodecError> {
        Err(CodecError::UnsupportedShape { codec: "passthrough", shape: "any — this codec never consumes bytes" })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use relaywire_types::{FieldSpec, ScalarKind, TypeDescriptor};

    #[test]
    fn materialize_fills_defaults_and_rehydrate_recovers_them() {
        let spec = Arc::new(MessageSpec::new(
            "Counter",
            vec![FieldSpec::new("n", TypeDescriptor::Scalar(ScalarKind::Int32)).with_default(7i32)],
        ));
        let registry = SchemaRegistry::new();
        let msg = Message::new(Arc::clone(&spec));
        let canonical = PassthroughCodec::materialize(&msg, &registry).expect("materializes with default");
        let rebuilt = PassthroughCodec::rehydrate(&spec, &registry, canonical).expect("rehydrates");
        assert_eq!(rebuilt.get("n").unwrap(), relaywire_types::Value::Int(7));
    }

    #[test]
    fn encode_and_decode_are_refused() {
        let spec = Arc::new(MessageSpec::new("Empty", vec![]));
        let registry = SchemaRegistry::new();
        let msg = Message::new(Arc::clone(&spec));
        let codec = PassthroughCodec;
        assert!(codec.encode(&registry, &msg).is_err());
        assert!(codec.decode(&registry, &spec, &[]).is_err());
    }
}
