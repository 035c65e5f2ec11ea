//! Fixed-layout binary codec: every field is written in schema-declared
//! order with no inline type tags, matching the wire layout the framer's
//! `offset_of`/`field_size_of` computations assume.

use std::collections::HashMap;
use std::sync::Arc;

use relaywire_types::{FieldSpec, Message, MessageSpec, ScalarKind, SchemaRegistry, SizeRefHook, SizeSource, TypeDescriptor, Value};

use crate::cursor::Cursor;
use crate::error::CodecError;
use crate::Serializer;

/// Byte order `Binary` writes multi-byte scalars in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Network byte order.
    #[default]
    Big,
    /// Host byte order on little-endian machines.
    Little,
}

/// Fixed-layout, non-self-describing binary codec.
///
/// `Map` and `Variant` fields are rejected outright — there is no wire
/// convention for them without a type tag, and `Binary` carries none.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec {
    order: ByteOrder,
}

impl BinaryCodec {
    /// A codec writing big-endian (network byte order) scalars.
    #[must_use]
    pub const fn new(order: ByteOrder) -> Self {
        Self { order }
    }
}

impl Serializer for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn is_self_describing(&self) -> bool {
        false
    }

    fn encode(&self, registry: &SchemaRegistry, message: &Message) -> Result<Vec<u8>, CodecError> {
        encode_fields(self.order, message.spec(), message, registry)
    }

    fn decode(&self, registry: &SchemaRegistry, spec: &Arc<MessageSpec>, bytes: &[u8]) -> Result<Message, CodecError> {
        let mut cursor = Cursor::new(bytes);
        decode_fields(self.order, spec, registry, &mut cursor)
    }
}

fn encode_fields(order: ByteOrder, spec: &MessageSpec, message: &Message, registry: &SchemaRegistry) -> Result<Vec<u8>, CodecError> {
    // Pass 1: pre-encode every field that is the *target* of a sibling's
    // `SizeRef`, so pass 2 can substitute the computed length/count in
    // place of whatever (if anything) is actually assigned to the size
    // field itself.
    let mut computed_sizes: HashMap<&str, i128> = HashMap::new();
    for field in &spec.fields {
        let size_source = size_source_of(&field.ty);
        if let Some(SizeSource::SizeRef(target)) = size_source {
            let value = message.get(&field.name)?;
            let natural_len = natural_length(&field.ty, &value)? as u64;
            let hook = field.size_ref_hook.unwrap_or_else(SizeRefHook::identity);
            computed_sizes.insert(target.as_str(), i128::from((hook.forward)(natural_len)));
        }
    }

    let mut out = Vec::new();
    for field in &spec.fields {
        let value = if let Some(&computed) = computed_sizes.get(field.name.as_str()) {
            Value::Int(computed)
        } else {
            message.get(&field.name)?
        };
        out.extend(encode_value(order, &field.ty, &field.name, &value, registry)?);
    }
    Ok(out)
}

fn size_source_of(ty: &TypeDescriptor) -> Option<&SizeSource> {
    match ty {
        TypeDescriptor::Str(s) | TypeDescriptor::Buffer(s) | TypeDescriptor::Array(_, s) => Some(s),
        _ => None,
    }
}

fn natural_length(ty: &TypeDescriptor, value: &Value) -> Result<usize, CodecError> {
    match (ty, value) {
        (TypeDescriptor::Str(_), Value::Text(s)) => Ok(s.len()),
        (TypeDescriptor::Buffer(_), Value::Bytes(b)) => Ok(b.len()),
        (TypeDescriptor::Array(_, _), Value::Array(items)) => Ok(items.len()),
        _ => Err(CodecError::UnsupportedShape { codec: "binary", shape: "size-ref source" }),
    }
}

fn encode_value(order: ByteOrder, ty: &TypeDescriptor, name: &str, value: &Value, registry: &SchemaRegistry) -> Result<Vec<u8>, CodecError> {
    match ty {
        TypeDescriptor::Scalar(kind) => encode_scalar(order, *kind, value),
        TypeDescriptor::Str(size) => {
            let Value::Text(text) = value else {
                return Err(CodecError::UnsupportedShape { codec: "binary", shape: "non-text in String field" });
            };
            encode_sized_bytes(name, size, text.as_bytes())
        }
        TypeDescriptor::Buffer(size) => {
            let Value::Bytes(bytes) = value else {
                return Err(CodecError::UnsupportedShape { codec: "binary", shape: "non-bytes in Buffer field" });
            };
            encode_sized_bytes(name, size, bytes)
        }
        TypeDescriptor::Array(elem, size) => {
            let Value::Array(items) = value else {
                return Err(CodecError::UnsupportedShape { codec: "binary", shape: "non-array in Array field" });
            };
            if let SizeSource::Fixed(n) = size {
                if *n != 0 && items.len() != *n as usize {
                    return Err(CodecError::FixedSizeMismatch { field: name.to_owned(), expected: *n as usize, actual: items.len() });
                }
            }
            let mut out = Vec::new();
            for item in items {
                out.extend(encode_value(order, elem, name, item, registry)?);
            }
            Ok(out)
        }
        TypeDescriptor::Dict(dict_name) => {
            let Value::Message(nested) = value else {
                return Err(CodecError::UnsupportedShape { codec: "binary", shape: "non-message in Dict field" });
            };
            if nested.spec().name != *dict_name {
                return Err(CodecError::Schema(relaywire_types::SchemaError::UnknownMessage(dict_name.clone())));
            }
            encode_fields(order, nested.spec(), nested, registry)
        }
        TypeDescriptor::Map(_, _) => Err(CodecError::UnsupportedShape { codec: "binary", shape: "map" }),
        TypeDescriptor::Variant => Err(CodecError::UnsupportedShape { codec: "binary", shape: "variant" }),
    }
}

fn encode_sized_bytes(name: &str, size: &SizeSource, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if let SizeSource::Fixed(n) = size {
        if *n != 0 && bytes.len() != *n as usize {
            return Err(CodecError::FixedSizeMismatch { field: name.to_owned(), expected: *n as usize, actual: bytes.len() });
        }
    }
    Ok(bytes.to_vec())
}

fn encode_scalar(order: ByteOrder, kind: ScalarKind, value: &Value) -> Result<Vec<u8>, CodecError> {
    macro_rules! int_bytes {
        ($t:ty, $v:expr) => {
            match order {
                ByteOrder::Big => ($v as $t).to_be_bytes().to_vec(),
                ByteOrder::Little => ($v as $t).to_le_bytes().to_vec(),
            }
        };
    }
    Ok(match (kind, value) {
        (ScalarKind::Bool, Value::Bool(b)) => vec![u8::from(*b)],
        (ScalarKind::Int8, Value::Int(i)) => int_bytes!(i8, *i),
        (ScalarKind::Uint8, Value::Int(i)) => int_bytes!(u8, *i),
        (ScalarKind::Int16, Value::Int(i)) => int_bytes!(i16, *i),
        (ScalarKind::Uint16, Value::Int(i)) => int_bytes!(u16, *i),
        (ScalarKind::Int32, Value::Int(i)) => int_bytes!(i32, *i),
        (ScalarKind::Uint32, Value::Int(i)) => int_bytes!(u32, *i),
        (ScalarKind::Int64, Value::Int(i)) => int_bytes!(i64, *i),
        (ScalarKind::Uint64, Value::Int(i)) => int_bytes!(u64, *i),
        (ScalarKind::Float, Value::Float(f)) => match order {
            ByteOrder::Big => (*f as f32).to_be_bytes().to_vec(),
            ByteOrder::Little => (*f as f32).to_le_bytes().to_vec(),
        },
        (ScalarKind::Double, Value::Float(f)) => match order {
            ByteOrder::Big => f.to_be_bytes().to_vec(),
            ByteOrder::Little => f.to_le_bytes().to_vec(),
        },
        _ => return Err(CodecError::UnsupportedShape { codec: "binary", shape: "scalar/value mismatch" }),
    })
}

fn decode_fields(order: ByteOrder, spec: &Arc<MessageSpec>, registry: &SchemaRegistry, cursor: &mut Cursor<'_>) -> Result<Message, CodecError> {
    let mut decoded: HashMap<String, Value> = HashMap::new();
    for field in &spec.fields {
        let value = decode_value(order, &field.ty, field, &decoded, registry, cursor)?;
        decoded.insert(field.name.clone(), value);
    }
    let fields = spec.fields.iter().filter_map(|f| decoded.remove(&f.name).map(|v| (f.name.clone(), v))).collect();
    Message::construct(spec, registry, fields).map_err(CodecError::from)
}

fn decode_value(
    order: ByteOrder,
    ty: &TypeDescriptor,
    field: &FieldSpec,
    decoded: &HashMap<String, Value>,
    registry: &SchemaRegistry,
    cursor: &mut Cursor<'_>,
) -> Result<Value, CodecError> {
    match ty {
        TypeDescriptor::Scalar(kind) => decode_scalar(order, *kind, cursor),
        TypeDescriptor::Str(size) => {
            let raw = match resolve_len(size, field, decoded, cursor)? {
                Some(len) => cursor.take(len)?.to_vec(),
                None => cursor.rest().to_vec(),
            };
            String::from_utf8(raw).map(Value::Text).map_err(|_| CodecError::InvalidUtf8 { field: field.name.clone() })
        }
        TypeDescriptor::Buffer(size) => {
            let raw = match resolve_len(size, field, decoded, cursor)? {
                Some(len) => cursor.take(len)?.to_vec(),
                None => cursor.rest().to_vec(),
            };
            Ok(Value::Bytes(raw))
        }
        TypeDescriptor::Array(elem, size) => {
            let count = resolve_len(size, field, decoded, cursor)?;
            let mut items = Vec::new();
            match count {
                Some(count) => {
                    for _ in 0..count {
                        items.push(decode_value(order, elem, field, decoded, registry, cursor)?);
                    }
                }
                None => {
                    while !cursor.is_eof() {
                        items.push(decode_value(order, elem, field, decoded, registry, cursor)?);
                    }
                }
            }
            Ok(Value::Array(items))
        }
        TypeDescriptor::Dict(dict_name) => {
            let nested_spec = registry
                .get(dict_name)
                .ok_or_else(|| CodecError::Schema(relaywire_types::SchemaError::UnknownMessage(dict_name.clone())))?;
            let nested = decode_fields(order, &nested_spec, registry, cursor)?;
            Ok(Value::Message(Box::new(nested)))
        }
        TypeDescriptor::Map(_, _) => Err(CodecError::UnsupportedShape { codec: "binary", shape: "map" }),
        TypeDescriptor::Variant => Err(CodecError::UnsupportedShape { codec: "binary", shape: "variant" }),
    }
}

/// Resolve a field's byte/element count. `None` means "consume the rest
/// of the buffer" (`Fixed(0)`, already validated to be the last field).
///
/// A `SizeRef` target's raw decoded value went through the forward half of
/// the `size_ref_hook` at encode time, so recovering the byte count here
/// requires applying the *inverse* half — never the same function used to
/// fill the field.
fn resolve_len(size: &SizeSource, field: &FieldSpec, decoded: &HashMap<String, Value>, _cursor: &Cursor<'_>) -> Result<Option<usize>, CodecError> {
    match size {
        SizeSource::Fixed(0) => Ok(None),
        SizeSource::Fixed(n) => Ok(Some(*n as usize)),
        SizeSource::SizeRef(target) => {
            let value = decoded
                .get(target)
                .ok_or_else(|| CodecError::UnsupportedShape { codec: "binary", shape: "size-ref referencing an undecoded field" })?;
            match value {
                Value::Int(i) => {
                    let hook = field.size_ref_hook.unwrap_or_else(SizeRefHook::identity);
                    let natural = (hook.inverse)(*i as u64);
                    Ok(Some(natural as usize))
                }
                _ => Err(CodecError::UnsupportedShape { codec: "binary", shape: "non-integer size-ref target" }),
            }
        }
        SizeSource::SelfDescribing => Err(CodecError::UnsupportedShape { codec: "binary", shape: "self-describing size on a non-self-describing codec" })
            .map_err(|e: CodecError| {
                tracing::warn!(field = field.name.as_str(), "binary codec asked to decode a self-describing size source");
                e
            }),
    }
}

/// Copy exactly `N` bytes out of `cursor` into a fixed array. `take`
/// guarantees the returned slice has length `N`, so the copy cannot panic.
fn read_array<const N: usize>(cursor: &mut Cursor<'_>) -> Result<[u8; N], CodecError> {
    let bytes = cursor.take(N)?;
    let mut array = [0u8; N];
    array.copy_from_slice(bytes);
    Ok(array)
}

fn decode_scalar(order: ByteOrder, kind: ScalarKind, cursor: &mut Cursor<'_>) -> Result<Value, CodecError> {
    macro_rules! read_int {
        ($t:ty) => {{
            let array: [u8; std::mem::size_of::<$t>()] = read_array(cursor)?;
            i128::from(match order {
                ByteOrder::Big => <$t>::from_be_bytes(array),
                ByteOrder::Little => <$t>::from_le_bytes(array),
            })
        }};
    }
    Ok(match kind {
        ScalarKind::Bool => Value::Bool(cursor.take_u8()? != 0),
        ScalarKind::Int8 => Value::Int(read_int!(i8)),
        ScalarKind::Uint8 => Value::Int(read_int!(u8)),
        ScalarKind::Int16 => Value::Int(read_int!(i16)),
        ScalarKind::Uint16 => Value::Int(read_int!(u16)),
        ScalarKind::Int32 => Value::Int(read_int!(i32)),
        ScalarKind::Uint32 => Value::Int(read_int!(u32)),
        ScalarKind::Int64 => Value::Int(read_int!(i64)),
        ScalarKind::Uint64 => Value::Int(read_int!(u64)),
        ScalarKind::Float => {
            let bytes: [u8; 4] = read_array(cursor)?;
            Value::Float(f64::from(match order {
                ByteOrder::Big => f32::from_be_bytes(bytes),
                ByteOrder::Little => f32::from_le_bytes(bytes),
            }))
        }
        ScalarKind::Double => {
            let bytes: [u8; 8] = read_array(cursor)?;
            Value::Float(match order {
                ByteOrder::Big => f64::from_be_bytes(bytes),
                ByteOrder::Little => f64::from_le_bytes(bytes),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaywire_types::{FieldSpec, MessageSpec};
    use std::sync::Arc;

    fn length_prefixed_spec() -> Arc<MessageSpec> {
        Arc::new(MessageSpec::new(
            "Packet",
            vec![
                FieldSpec::new("len", TypeDescriptor::Scalar(ScalarKind::Uint32)),
                FieldSpec::new("payload", TypeDescriptor::Buffer(SizeSource::SizeRef("len".into()))),
            ],
        ))
    }

    #[test]
    fn size_ref_length_is_computed_not_assigned() {
        let spec = length_prefixed_spec();
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(Arc::clone(&spec));
        msg.assign("payload", b"hello".to_vec()).expect("payload assigns");
        let codec = BinaryCodec::new(ByteOrder::Big);
        let bytes = codec.encode(&registry, &msg).expect("encodes");
        assert_eq!(&bytes[0..4], &5u32.to_be_bytes());
        assert_eq!(&bytes[4..], b"hello");

        let decoded = codec.decode(&registry, &spec, &bytes).expect("decodes");
        assert_eq!(decoded.get("payload").expect("payload"), Value::Bytes(b"hello".to_vec()));
    }

    #[test]
    fn s2_binary_size_ref_with_hook() {
        let hook = SizeRefHook { forward: |n| n + 4, inverse: |n| n - 4 };
        let spec = Arc::new(MessageSpec::new(
            "Buf",
            vec![
                FieldSpec::new("buf_len", TypeDescriptor::Scalar(ScalarKind::Uint32)),
                FieldSpec::new("buf", TypeDescriptor::Buffer(SizeSource::SizeRef("buf_len".into()))).with_size_ref_hook(hook),
                FieldSpec::new("a", TypeDescriptor::Scalar(ScalarKind::Float)),
            ],
        ));
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(Arc::clone(&spec));
        msg.assign("buf", b"abcdefg".to_vec()).expect("buf assigns");
        msg.assign("a", 3.141_592_6_f32).expect("a assigns");

        let codec = BinaryCodec::new(ByteOrder::Big);
        let bytes = codec.encode(&registry, &msg).expect("encodes");
        assert_eq!(u32::from_be_bytes(bytes[0..4].try_into().expect("4 bytes")), 11, "buf_len must carry the hooked (+4) length");
        assert_eq!(bytes.len(), 15, "4 (buf_len) + 7 (buf) + 4 (a)");

        let decoded = codec.decode(&registry, &spec, &bytes).expect("decodes");
        assert_eq!(decoded.get("buf").expect("buf"), Value::Bytes(b"abcdefg".to_vec()));
        let Value::Float(a) = decoded.get("a").expect("a") else { panic!("a must decode as float") };
        assert!((a - 3.141_592_6_f64).abs() < 1e-5);
    }

    #[test]
    fn fixed_size_mismatch_is_rejected() {
        let spec = Arc::new(MessageSpec::new("Fixed", vec![FieldSpec::new("tag", TypeDescriptor::Buffer(SizeSource::Fixed(4)))]));
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(spec);
        msg.assign("tag", b"ab".to_vec()).expect("assigns");
        let codec = BinaryCodec::new(ByteOrder::Big);
        let err = codec.encode(&registry, &msg).expect_err("length mismatch rejected");
        assert!(matches!(err, CodecError::FixedSizeMismatch { .. }));
    }
}
