//! Runtime message instances built against a [`MessageSpec`].

use std::sync::Arc;

use crate::error::SchemaError;
use crate::scalar::ScalarKind;
use crate::schema::{MessageSpec, SchemaRegistry, TypeDescriptor};
use crate::value::Value;

/// A live instance of a [`MessageSpec`]: a named, ordered set of field
/// slots, each either unset, defaulted, or assigned.
///
/// Field storage is a flat `Vec` aligned with `spec.fields` rather than a
/// name-keyed map — field counts are small and fixed per schema, so a
/// linear `field_index` scan is both simpler and faster than hashing.
#[derive(Debug, Clone)]
pub struct Message {
    spec: Arc<MessageSpec>,
    values: Vec<Option<Value>>,
}

impl PartialEq for Message {
    /// Field-wise equality by schema name and currently stored slots
    /// (unset vs. unset counts as equal; defaults are not filled in
    /// first). Lets [`Value`] derive `PartialEq` without forcing every
    /// comparison through [`Message::reduce`], which needs a registry.
    fn eq(&self, other: &Self) -> bool {
        self.spec.name == other.spec.name && self.values == other.values
    }
}

impl Message {
    /// A new instance of `spec` with every field unset.
    #[must_use]
    pub fn new(spec: Arc<MessageSpec>) -> Self {
        let len = spec.fields.len();
        Self { spec, values: vec![None; len] }
    }

    /// The schema this instance was built from.
    #[must_use]
    pub fn spec(&self) -> &Arc<MessageSpec> {
        &self.spec
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.spec.fields.iter().position(|f| f.name == name || f.accessor_name() == name)
    }

    /// Assign `value` to `field`, type- and range-checking it against the
    /// field's declared [`TypeDescriptor`].
    ///
    /// For a `Dict` field, `value` must already be a built
    /// [`Value::Message`] with a matching schema name — use
    /// [`Message::construct`] to build a whole tree from raw canonical
    /// values in one pass instead.
    pub fn assign(&mut self, field: &str, value: impl Into<Value>) -> Result<(), SchemaError> {
        let idx = self.field_index(field).ok_or_else(|| SchemaError::NoSuchField {
            message: self.spec.name.clone(),
            field: field.to_owned(),
        })?;
        let spec_field = &self.spec.fields[idx];
        let value = value.into();
        if value.is_null() {
            if !spec_field.allow_none {
                return Err(SchemaError::NullNotAllowed(spec_field.name.clone()));
            }
            self.values[idx] = Some(Value::Null);
            return Ok(());
        }
        let coerced = coerce_value(&spec_field.ty, &spec_field.name, value, None)?;
        self.values[idx] = Some(coerced);
        Ok(())
    }

    /// Read `field`'s effective value: the assigned value if set, else its
    /// default, else [`Value::Null`] if optional.
    ///
    /// # Errors
    /// Returns [`SchemaError::UninitializedRequiredField`] if `field` is
    /// required, unset, and has no default.
    pub fn get(&self, field: &str) -> Result<Value, SchemaError> {
        let idx = self.field_index(field).ok_or_else(|| SchemaError::NoSuchField {
            message: self.spec.name.clone(),
            field: field.to_owned(),
        })?;
        let spec_field = &self.spec.fields[idx];
        if let Some(value) = &self.values[idx] {
            return Ok(value.clone());
        }
        if let Some(default) = &spec_field.default {
            return Ok(default.clone());
        }
        if spec_field.required {
            return Err(SchemaError::UninitializedRequiredField {
                message: self.spec.name.clone(),
                field: spec_field.name.clone(),
            });
        }
        Ok(Value::Null)
    }

    /// Whether `field` currently holds an assigned value (ignores defaults).
    #[must_use]
    pub fn is_set(&self, field: &str) -> bool {
        self.field_index(field).is_some_and(|idx| self.values[idx].is_some())
    }

    /// Build a whole message tree from a codec's canonical decoded form: a
    /// list of `(field name, raw value)` pairs, with nested `Dict` fields
    /// given as raw `Value::Map` pairs rather than pre-built
    /// [`Value::Message`]s — those are resolved against `registry`
    /// recursively.
    pub fn construct(
        spec: &Arc<MessageSpec>,
        registry: &SchemaRegistry,
        fields: Vec<(String, Value)>,
    ) -> Result<Self, SchemaError> {
        let mut message = Self::new(Arc::clone(spec));
        for (name, raw) in fields {
            let idx = message.field_index(&name).ok_or_else(|| SchemaError::UnknownField {
                message: spec.name.clone(),
                field: name.clone(),
            })?;
            let spec_field = &spec.fields[idx];
            if raw.is_null() {
                if !spec_field.allow_none {
                    return Err(SchemaError::NullNotAllowed(spec_field.name.clone()));
                }
                message.values[idx] = Some(Value::Null);
                continue;
            }
            let coerced = coerce_value(&spec_field.ty, &spec_field.name, raw, Some(registry))?;
            message.values[idx] = Some(coerced);
        }
        Ok(message)
    }

    /// Flatten this instance back to canonical `(field name, value)` pairs
    /// in declaration order, ready for a codec to encode. Unset fields
    /// fall back to their default, or fail if required.
    pub fn reduce(&self, registry: &SchemaRegistry) -> Result<Value, SchemaError> {
        let mut out = Vec::with_capacity(self.spec.fields.len());
        for (idx, field) in self.spec.fields.iter().enumerate() {
            let value = match &self.values[idx] {
                Some(v) => v.clone(),
                None => match &field.default {
                    Some(default) => default.clone(),
                    None if field.required => {
                        return Err(SchemaError::UninitializedRequiredField {
                            message: self.spec.name.clone(),
                            field: field.name.clone(),
                        });
                    }
                    None => Value::Null,
                },
            };
            let reduced = reduce_value(&field.ty, &field.name, value, registry)?;
            out.push((Value::Text(field.name.clone()), reduced));
        }
        Ok(Value::Map(out))
    }
}

/// Coerce and validate `raw` against `ty`, recursing into containers and,
/// when `registry` is supplied, constructing nested `Dict`s from raw
/// `Value::Map`s. With `registry = None` (plain [`Message::assign`]),
/// nested `Dict` fields must already be a [`Value::Message`].
fn coerce_value(
    ty: &TypeDescriptor,
    name: &str,
    raw: Value,
    registry: Option<&SchemaRegistry>,
) -> Result<Value, SchemaError> {
    match ty {
        TypeDescriptor::Scalar(kind) => coerce_scalar(*kind, name, raw),
        TypeDescriptor::Str(_) => match raw {
            Value::Text(_) => Ok(raw),
            Value::Bytes(bytes) => String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|_| type_mismatch(name, "utf-8 text", "non-utf8 bytes")),
            other => Err(type_mismatch(name, "text", other.kind_name())),
        },
        TypeDescriptor::Buffer(_) => match raw {
            Value::Bytes(_) => Ok(raw),
            Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(type_mismatch(name, "bytes", other.kind_name())),
        },
        TypeDescriptor::Array(elem, _) => match raw {
            Value::Array(items) => {
                let coerced = items
                    .into_iter()
                    .map(|item| coerce_value(elem, name, item, registry))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(coerced))
            }
            other => Err(type_mismatch(name, "array", other.kind_name())),
        },
        TypeDescriptor::Map(key_ty, val_ty) => match raw {
            Value::Map(entries) => {
                let coerced = entries
                    .into_iter()
                    .map(|(k, v)| {
                        let key = coerce_value(key_ty, name, k, registry)?;
                        let value = coerce_value(val_ty, name, v, registry)?;
                        Ok((key, value))
                    })
                    .collect::<Result<Vec<_>, SchemaError>>()?;
                Ok(Value::Map(coerced))
            }
            other => Err(type_mismatch(name, "map", other.kind_name())),
        },
        TypeDescriptor::Dict(dict_name) => match raw {
            Value::Message(nested) if &nested.spec.name == dict_name => Ok(Value::Message(nested)),
            Value::Message(nested) => Err(type_mismatch(name, dict_name.as_str(), nested.spec.name.as_str())),
            Value::Map(entries) => {
                let registry = registry
                    .ok_or_else(|| SchemaError::UnknownMessage(dict_name.clone()))?;
                let nested_spec = registry
                    .get(dict_name)
                    .ok_or_else(|| SchemaError::UnknownMessage(dict_name.clone()))?;
                let keyed = entries
                    .into_iter()
                    .map(|(k, v)| match k {
                        Value::Text(key) => Ok((key, v)),
                        other => Err(type_mismatch(name, "text map key", other.kind_name())),
                    })
                    .collect::<Result<Vec<_>, SchemaError>>()?;
                let nested = Message::construct(&nested_spec, registry, keyed)?;
                Ok(Value::Message(Box::new(nested)))
            }
            other => Err(type_mismatch(name, "message", other.kind_name())),
        },
        TypeDescriptor::Variant => Ok(raw),
    }
}

fn coerce_scalar(kind: ScalarKind, name: &str, raw: Value) -> Result<Value, SchemaError> {
    match kind {
        ScalarKind::Bool => match raw {
            Value::Bool(_) => Ok(raw),
            other => Err(type_mismatch(name, "bool", other.kind_name())),
        },
        ScalarKind::Float | ScalarKind::Double => match raw {
            Value::Float(_) => Ok(raw),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            other => Err(type_mismatch(name, "float", other.kind_name())),
        },
        _ => match raw {
            Value::Int(i) => {
                let Some((lo, hi)) = kind.int_range() else {
                    return Err(type_mismatch(name, kind.name(), "int"));
                };
                if i < lo || i > hi {
                    return Err(SchemaError::RangeOverflow {
                        field: name.to_owned(),
                        value: i.to_string(),
                        kind: kind.name(),
                    });
                }
                Ok(Value::Int(i))
            }
            other => Err(type_mismatch(name, kind.name(), other.kind_name())),
        },
    }
}

fn reduce_value(ty: &TypeDescriptor, name: &str, value: Value, registry: &SchemaRegistry) -> Result<Value, SchemaError> {
    match (ty, value) {
        (TypeDescriptor::Array(elem, _), Value::Array(items)) => {
            let reduced = items
                .into_iter()
                .map(|item| reduce_value(elem, name, item, registry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(reduced))
        }
        (TypeDescriptor::Map(key_ty, val_ty), Value::Map(entries)) => {
            let reduced = entries
                .into_iter()
                .map(|(k, v)| {
                    let key = reduce_value(key_ty, name, k, registry)?;
                    let val = reduce_value(val_ty, name, v, registry)?;
                    Ok((key, val))
                })
                .collect::<Result<Vec<_>, SchemaError>>()?;
            Ok(Value::Map(reduced))
        }
        (TypeDescriptor::Dict(_), Value::Message(nested)) => nested.reduce(registry),
        (_, value) => Ok(value),
    }
}

fn type_mismatch(field: &str, expected: &'static str, found: &'static str) -> SchemaError {
    SchemaError::TypeMismatch { field: field.to_owned(), expected, found }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, SizeSource};

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
    fn assign_and_get_roundtrip() {
        let mut msg = Message::new(point_spec());
        msg.assign("x", 3i32).expect("x assigns");
        msg.assign("y", -4i32).expect("y assigns");
        assert_eq!(msg.get("x").expect("x readable"), Value::Int(3));
        assert_eq!(msg.get("label").expect("label defaults to null"), Value::Null);
    }

    #[test]
    fn required_field_without_default_errors() {
        let msg = Message::new(point_spec());
        let err = msg.get("x").expect_err("x is required and unset");
        assert!(matches!(err, SchemaError::UninitializedRequiredField { .. }));
    }

    #[test]
    fn range_overflow_is_rejected() {
        let mut msg = Message::new(point_spec());
        let err = msg.assign("x", Value::Int(i128::from(i32::MAX) + 1)).expect_err("out of range");
        assert!(matches!(err, SchemaError::RangeOverflow { .. }));
    }

    #[test]
    fn construct_and_reduce_nested_dict() {
        let mut registry = SchemaRegistry::new();
        let point = registry.register((*point_spec()).clone()).expect("point registers");
        let line = registry
            .register(MessageSpec::new(
                "Line",
                vec![
                    FieldSpec::new("start", TypeDescriptor::Dict("Point".into())),
                    FieldSpec::new("end", TypeDescriptor::Dict("Point".into())),
                ],
            ))
            .expect("line registers");
        let _ = point;

        let raw = vec![
            ("start".to_owned(), Value::Map(vec![(Value::Text("x".into()), Value::Int(0)), (Value::Text("y".into()), Value::Int(0))])),
            ("end".to_owned(), Value::Map(vec![(Value::Text("x".into()), Value::Int(1)), (Value::Text("y".into()), Value::Int(1))])),
        ];
        let built = Message::construct(&line, &registry, raw).expect("construct succeeds");
        let reduced = built.reduce(&registry).expect("reduce succeeds");
        match reduced {
            Value::Map(fields) => assert_eq!(fields.len(), 2),
            other => panic!("expected a map, got {other}"),
        }
    }
}
