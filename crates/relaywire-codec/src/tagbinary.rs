//! Self-describing tag+type codec.
//!
//! Every encoded value is preceded by a one-byte head packing
//! `(tag << 4) | type` for tags `0..=14`; tag `15` is the extension
//! marker, followed by a full tag byte. This lets a decoder skip values
//! for tags it does not recognize (schema evolution) and is the only
//! codec besides JSON that accepts `Map` and `Variant` fields.

use std::sync::Arc;

use relaywire_types::{FieldSpec, Message, MessageSpec, ScalarKind, SchemaRegistry, TypeDescriptor, Value};

use crate::cursor::Cursor;
use crate::error::CodecError;
use crate::Serializer;

/// The fixed wire type enumeration, in the low nibble
/// of every head byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum WireType {
    Int8 = 0,
    Int16 = 1,
    Int32 = 2,
    Int64 = 3,
    Float = 4,
    Double = 5,
    String1 = 6,
    String4 = 7,
    Map = 8,
    List = 9,
    StructBegin = 10,
    StructEnd = 11,
    Zero = 12,
    Bytes = 13,
}

impl WireType {
    const fn from_nibble(n: u8) -> Option<Self> {
        Some(match n {
            0 => Self::Int8,
            1 => Self::Int16,
            2 => Self::Int32,
            3 => Self::Int64,
            4 => Self::Float,
            5 => Self::Double,
            6 => Self::String1,
            7 => Self::String4,
            8 => Self::Map,
            9 => Self::List,
            10 => Self::StructBegin,
            11 => Self::StructEnd,
            12 => Self::Zero,
            13 => Self::Bytes,
            _ => return None,
        })
    }

    const fn int_width(self) -> Option<usize> {
        Some(match self {
            Self::Zero => 0,
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 => 4,
            Self::Int64 => 8,
            _ => return None,
        })
    }
}

/// How an unrecognized field tag is handled while decoding a struct body.
/// Unrecognized tags default to "skip with log".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTagPolicy {
    /// Skip the value (structurally, using its wire type) and log a warning.
    #[default]
    Skip,
    /// Fail decoding with [`CodecError::UnknownTag`].
    Reject,
}

/// Self-describing tag-prefixed binary codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagBinaryCodec {
    unknown_tag: UnknownTagPolicy,
}

impl TagBinaryCodec {
    /// A codec with the given unknown-tag policy.
    #[must_use]
    pub const fn new(unknown_tag: UnknownTagPolicy) -> Self {
        Self { unknown_tag }
    }

    /// Encode `message` wrapped in a single outer `(tag=0, StructBegin)` /
    /// `StructEnd` pair.
    ///
    /// An auxiliary variant wraps outer values with a single `(tag=0)`
    /// header, used by some peers' framing convention — kept as an
    /// opt-in method rather than the default `encode` so plain top-level
    /// messages are unaffected.
    ///
    /// # Errors
    /// As [`Serializer::encode`].
    pub fn encode_wrapped(&self, registry: &SchemaRegistry, message: &Message) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        write_head(&mut out, 0, WireType::StructBegin);
        out.extend(self.encode(registry, message)?);
        write_head(&mut out, 0, WireType::StructEnd);
        Ok(out)
    }

    /// Inverse of [`TagBinaryCodec::encode_wrapped`].
    ///
    /// # Errors
    /// As [`Serializer::decode`], plus [`CodecError::UnsupportedShape`] if
    /// the buffer does not open with a `(tag=0, StructBegin)` head.
    pub fn decode_wrapped(&self, registry: &SchemaRegistry, spec: &Arc<MessageSpec>, bytes: &[u8]) -> Result<Message, CodecError> {
        let mut cursor = Cursor::new(bytes);
        let (tag, ty) = read_head(&mut cursor)?;
        if tag != 0 || ty != WireType::StructBegin {
            return Err(CodecError::UnsupportedShape { codec: "tagbinary", shape: "expected outer (tag=0) wrapper" });
        }
        let message = decode_struct_body(self.unknown_tag, spec, registry, &mut cursor)?;
        let (end_tag, end_ty) = read_head(&mut cursor)?;
        if end_tag != 0 || end_ty != WireType::StructEnd {
            return Err(CodecError::UnsupportedShape { codec: "tagbinary", shape: "missing outer StructEnd" });
        }
        Ok(message)
    }
}

impl Serializer for TagBinaryCodec {
    fn name(&self) -> &'static str {
        "tagbinary"
    }

    fn is_self_describing(&self) -> bool {
        true
    }

    fn encode(&self, registry: &SchemaRegistry, message: &Message) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        for field in &message.spec().fields {
            let tag = field.tag.ok_or_else(|| missing_tag(&field.name))?;
            let value = message.get(&field.name)?;
            if value.is_null() {
                continue;
            }
            encode_value(&mut out, tag, &field.ty, &field.name, &value, registry)?;
        }
        Ok(out)
    }

    fn decode(&self, registry: &SchemaRegistry, spec: &Arc<MessageSpec>, bytes: &[u8]) -> Result<Message, CodecError> {
        let mut cursor = Cursor::new(bytes);
        decode_struct_body(self.unknown_tag, spec, registry, &mut cursor)
    }
}

fn missing_tag(field: &str) -> CodecError {
    CodecError::MissingTag { field: field.to_owned() }
}

fn write_head(out: &mut Vec<u8>, tag: u8, ty: WireType) {
    if tag < 15 {
        out.push((tag << 4) | (ty as u8));
    } else {
        out.push((15 << 4) | (ty as u8));
        out.push(tag);
    }
}

fn read_head(cursor: &mut Cursor<'_>) -> Result<(u8, WireType), CodecError> {
    let byte = cursor.take_u8()?;
    let nibble = byte & 0x0F;
    let ty = WireType::from_nibble(nibble).ok_or_else(|| CodecError::UnknownTag { message: "<tagbinary head>".into(), tag: u16::from(nibble) })?;
    let hi = byte >> 4;
    let tag = if hi == 15 { cursor.take_u8()? } else { hi };
    Ok((tag, ty))
}

const fn is_unsigned(kind: ScalarKind) -> bool {
    matches!(kind, ScalarKind::Uint8 | ScalarKind::Uint16 | ScalarKind::Uint32 | ScalarKind::Uint64)
}

/// Smallest wire integer width that round-trips `value` when later
/// reinterpreted per `kind`'s signedness.
fn int_wire_type(kind: ScalarKind, value: i128) -> WireType {
    if value == 0 {
        return WireType::Zero;
    }
    let fits = |bits: u32| -> bool {
        if is_unsigned(kind) {
            value >= 0 && value < (1i128 << bits)
        } else {
            let half = 1i128 << (bits - 1);
            value >= -half && value < half
        }
    };
    if fits(8) {
        WireType::Int8
    } else if fits(16) {
        WireType::Int16
    } else if fits(32) {
        WireType::Int32
    } else {
        WireType::Int64
    }
}

fn encode_int_bytes(out: &mut Vec<u8>, kind: ScalarKind, width: usize, value: i128) {
    macro_rules! push_as {
        ($t:ty) => {
            out.extend((value as $t).to_be_bytes())
        };
    }
    match (is_unsigned(kind), width) {
        (_, 0) => {}
        (false, 1) => push_as!(i8),
        (true, 1) => push_as!(u8),
        (false, 2) => push_as!(i16),
        (true, 2) => push_as!(u16),
        (false, 4) => push_as!(i32),
        (true, 4) => push_as!(u32),
        (false, 8) => push_as!(i64),
        (true, 8) => push_as!(u64),
        _ => unreachable!("int_wire_type only returns widths 0/1/2/4/8"),
    }
}

fn encode_int(out: &mut Vec<u8>, tag: u8, kind: ScalarKind, value: i128) {
    let ty = int_wire_type(kind, value);
    write_head(out, tag, ty);
    #[allow(clippy::expect_used)]
    let width = ty.int_width().expect("int_wire_type only returns integer wire types");
    encode_int_bytes(out, kind, width, value);
}

fn decode_int(kind: ScalarKind, ty: WireType, cursor: &mut Cursor<'_>) -> Result<i128, CodecError> {
    let width = ty.int_width().ok_or(CodecError::UnsupportedShape { codec: "tagbinary", shape: "non-integer wire type for scalar field" })?;
    if width == 0 {
        return Ok(0);
    }
    let bytes = cursor.take(width)?;
    Ok(if is_unsigned(kind) {
        match width {
            1 => i128::from(bytes[0]),
            2 => i128::from(u16::from_be_bytes([bytes[0], bytes[1]])),
            4 => i128::from(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            _ => i128::from(u64::from_be_bytes(bytes.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 8, available: bytes.len() })?)),
        }
    } else {
        match width {
            1 => i128::from(bytes[0] as i8),
            2 => i128::from(i16::from_be_bytes([bytes[0], bytes[1]])),
            4 => i128::from(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            _ => i128::from(i64::from_be_bytes(bytes.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 8, available: bytes.len() })?)),
        }
    })
}

/// Writes the length-as-integer prefix used ahead of `List`/`Map`
/// elements and `Bytes` payloads: always `tag = 0`, auto-downcast the
/// same as any other integer.
fn encode_count(out: &mut Vec<u8>, count: usize) {
    encode_int(out, 0, ScalarKind::Uint32, count as i128);
}

fn decode_count(cursor: &mut Cursor<'_>) -> Result<usize, CodecError> {
    let (_, ty) = read_head(cursor)?;
    let value = decode_int(ScalarKind::Uint32, ty, cursor)?;
    Ok(value as usize)
}

fn encode_value(out: &mut Vec<u8>, tag: u8, ty: &TypeDescriptor, name: &str, value: &Value, registry: &SchemaRegistry) -> Result<(), CodecError> {
    match ty {
        TypeDescriptor::Scalar(ScalarKind::Bool) => {
            let Value::Bool(b) = value else { return Err(shape_err(name, "bool")) };
            encode_int(out, tag, ScalarKind::Uint8, i128::from(*b));
        }
        TypeDescriptor::Scalar(ScalarKind::Float) => {
            let Value::Float(f) = value else { return Err(shape_err(name, "float")) };
            write_head(out, tag, WireType::Float);
            out.extend((*f as f32).to_be_bytes());
        }
        TypeDescriptor::Scalar(ScalarKind::Double) => {
            let Value::Float(f) = value else { return Err(shape_err(name, "double")) };
            write_head(out, tag, WireType::Double);
            out.extend(f.to_be_bytes());
        }
        TypeDescriptor::Scalar(kind) => {
            let Value::Int(i) = value else { return Err(shape_err(name, "int")) };
            encode_int(out, tag, *kind, *i);
        }
        TypeDescriptor::Str(_) => {
            let Value::Text(s) = value else { return Err(shape_err(name, "text")) };
            let bytes = s.as_bytes();
            if bytes.len() <= usize::from(u8::MAX) {
                write_head(out, tag, WireType::String1);
                out.push(bytes.len() as u8);
            } else {
                write_head(out, tag, WireType::String4);
                out.extend((bytes.len() as u32).to_be_bytes());
            }
            out.extend(bytes);
        }
        TypeDescriptor::Buffer(_) => {
            let Value::Bytes(bytes) = value else { return Err(shape_err(name, "bytes")) };
            write_head(out, tag, WireType::Bytes);
            encode_count(out, bytes.len());
            out.extend(bytes);
        }
        TypeDescriptor::Array(elem, _) => {
            let Value::Array(items) = value else { return Err(shape_err(name, "array")) };
            write_head(out, tag, WireType::List);
            encode_count(out, items.len());
            for item in items {
                encode_value(out, 0, elem, name, item, registry)?;
            }
        }
        TypeDescriptor::Map(key_ty, val_ty) => {
            let Value::Map(entries) = value else { return Err(shape_err(name, "map")) };
            write_head(out, tag, WireType::Map);
            encode_count(out, entries.len());
            for (k, v) in entries {
                encode_value(out, 0, key_ty, name, k, registry)?;
                encode_value(out, 1, val_ty, name, v, registry)?;
            }
        }
        TypeDescriptor::Dict(dict_name) => {
            let Value::Message(nested) = value else { return Err(shape_err(name, "message")) };
            if nested.spec().name != *dict_name {
                return Err(CodecError::Schema(relaywire_types::SchemaError::UnknownMessage(dict_name.clone())));
            }
            write_head(out, tag, WireType::StructBegin);
            encode_struct_fields(out, nested, registry)?;
            write_head(out, 0, WireType::StructEnd);
        }
        TypeDescriptor::Variant => encode_variant(out, tag, value, registry)?,
    }
    Ok(())
}

fn encode_struct_fields(out: &mut Vec<u8>, message: &Message, registry: &SchemaRegistry) -> Result<(), CodecError> {
    for field in &message.spec().fields {
        let tag = field.tag.ok_or_else(|| missing_tag(&field.name))?;
        let value = message.get(&field.name)?;
        if value.is_null() {
            continue;
        }
        encode_value(out, tag, &field.ty, &field.name, &value, registry)?;
    }
    Ok(())
}

/// `Variant` has no schema of its own, so its wire type is picked from
/// the dynamic shape of `value` rather than a [`TypeDescriptor`].
fn encode_variant(out: &mut Vec<u8>, tag: u8, value: &Value, registry: &SchemaRegistry) -> Result<(), CodecError> {
    match value {
        Value::Null => write_head(out, tag, WireType::Zero),
        Value::Bool(b) => encode_int(out, tag, ScalarKind::Uint8, i128::from(*b)),
        Value::Int(i) => encode_int(out, tag, ScalarKind::Int64, *i),
        Value::Float(f) => {
            write_head(out, tag, WireType::Double);
            out.extend(f.to_be_bytes());
        }
        Value::Text(s) => {
            let bytes = s.as_bytes();
            if bytes.len() <= usize::from(u8::MAX) {
                write_head(out, tag, WireType::String1);
                out.push(bytes.len() as u8);
            } else {
                write_head(out, tag, WireType::String4);
                out.extend((bytes.len() as u32).to_be_bytes());
            }
            out.extend(bytes);
        }
        Value::Bytes(bytes) => {
            write_head(out, tag, WireType::Bytes);
            encode_count(out, bytes.len());
            out.extend(bytes);
        }
        Value::Array(items) => {
            write_head(out, tag, WireType::List);
            encode_count(out, items.len());
            for item in items {
                encode_variant(out, 0, item, registry)?;
            }
        }
        Value::Map(entries) => {
            write_head(out, tag, WireType::Map);
            encode_count(out, entries.len());
            for (k, v) in entries {
                encode_variant(out, 0, k, registry)?;
                encode_variant(out, 1, v, registry)?;
            }
        }
        Value::Message(nested) => {
            write_head(out, tag, WireType::StructBegin);
            encode_struct_fields(out, nested, registry)?;
            write_head(out, 0, WireType::StructEnd);
        }
    }
    Ok(())
}

fn shape_err(field: &str, expected: &'static str) -> CodecError {
    CodecError::Schema(relaywire_types::SchemaError::TypeMismatch { field: field.to_owned(), expected, found: "a mismatched Value shape" })
}

fn decode_struct_body(policy: UnknownTagPolicy, spec: &Arc<MessageSpec>, registry: &SchemaRegistry, cursor: &mut Cursor<'_>) -> Result<Message, CodecError> {
    let mut fields = Vec::new();
    while !cursor.is_eof() {
        let (tag, ty) = read_head(cursor)?;
        if ty == WireType::StructEnd {
            // Only reachable when this body is itself nested inside a
            // parent struct; top-level decode consumes the whole buffer.
            break;
        }
        let Some(field) = spec.fields.iter().find(|f| f.tag == Some(tag)) else {
            match policy {
                UnknownTagPolicy::Skip => {
                    tracing::warn!(tag, message = %spec.name, "tagbinary: skipping unknown tag");
                    skip_value(ty, cursor)?;
                    continue;
                }
                UnknownTagPolicy::Reject => {
                    return Err(CodecError::UnknownTag { message: spec.name.clone(), tag: u16::from(tag) });
                }
            }
        };
        let value = decode_value(&field.ty, field, ty, registry, cursor)?;
        fields.push((field.name.clone(), value));
    }
    Message::construct(spec, registry, fields).map_err(CodecError::from)
}

fn decode_value(ty: &TypeDescriptor, field: &FieldSpec, wire_ty: WireType, registry: &SchemaRegistry, cursor: &mut Cursor<'_>) -> Result<Value, CodecError> {
    match ty {
        TypeDescriptor::Scalar(ScalarKind::Bool) => Ok(Value::Bool(decode_int(ScalarKind::Uint8, wire_ty, cursor)? != 0)),
        TypeDescriptor::Scalar(ScalarKind::Float) => {
            let bytes: [u8; 4] = cursor.take(4)?.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 4, available: 0 })?;
            Ok(Value::Float(f64::from(f32::from_be_bytes(bytes))))
        }
        TypeDescriptor::Scalar(ScalarKind::Double) => {
            let bytes: [u8; 8] = cursor.take(8)?.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 8, available: 0 })?;
            Ok(Value::Float(f64::from_be_bytes(bytes)))
        }
        TypeDescriptor::Scalar(kind) => Ok(Value::Int(decode_int(*kind, wire_ty, cursor)?)),
        TypeDescriptor::Str(_) => {
            let len = match wire_ty {
                WireType::String1 => usize::from(cursor.take_u8()?),
                WireType::String4 => u32::from_be_bytes(cursor.take(4)?.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 4, available: 0 })?) as usize,
                _ => return Err(CodecError::UnsupportedShape { codec: "tagbinary", shape: "non-string wire type for String field" }),
            };
            let raw = cursor.take(len)?.to_vec();
            String::from_utf8(raw).map(Value::Text).map_err(|_| CodecError::InvalidUtf8 { field: field.name.clone() })
        }
        TypeDescriptor::Buffer(_) => {
            if wire_ty != WireType::Bytes {
                return Err(CodecError::UnsupportedShape { codec: "tagbinary", shape: "non-bytes wire type for Buffer field" });
            }
            let len = decode_count(cursor)?;
            Ok(Value::Bytes(cursor.take(len)?.to_vec()))
        }
        TypeDescriptor::Array(elem, _) => {
            if wire_ty != WireType::List {
                return Err(CodecError::UnsupportedShape { codec: "tagbinary", shape: "non-list wire type for Array field" });
            }
            let count = decode_count(cursor)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let (_, elem_ty) = read_head(cursor)?;
                items.push(decode_value(elem, field, elem_ty, registry, cursor)?);
            }
            Ok(Value::Array(items))
        }
        TypeDescriptor::Map(key_ty, val_ty) => {
            if wire_ty != WireType::Map {
                return Err(CodecError::UnsupportedShape { codec: "tagbinary", shape: "non-map wire type for Map field" });
            }
            let count = decode_count(cursor)?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let (_, key_wire) = read_head(cursor)?;
                let key = decode_value(key_ty, field, key_wire, registry, cursor)?;
                let (_, val_wire) = read_head(cursor)?;
                let val = decode_value(val_ty, field, val_wire, registry, cursor)?;
                entries.push((key, val));
            }
            Ok(Value::Map(entries))
        }
        TypeDescriptor::Dict(dict_name) => {
            if wire_ty != WireType::StructBegin {
                return Err(CodecError::UnsupportedShape { codec: "tagbinary", shape: "non-struct wire type for Dict field" });
            }
            let nested_spec = registry.get(dict_name).ok_or_else(|| CodecError::Schema(relaywire_types::SchemaError::UnknownMessage(dict_name.clone())))?;
            let nested = decode_struct_body(UnknownTagPolicy::Skip, &nested_spec, registry, cursor)?;
            Ok(Value::Message(Box::new(nested)))
        }
        TypeDescriptor::Variant => decode_variant(wire_ty, cursor),
    }
}

/// Reconstructs a `Variant` value purely from the self-describing wire
/// type. Nested struct bodies decode their own tags generically (field
/// names are unavailable without a schema, so this is not meant to
/// recover a registered `Message` — only JSON-ish scalar/list/map trees,
/// matching the JSON-ish tree shape `Variant` is meant to carry.
fn decode_variant(wire_ty: WireType, cursor: &mut Cursor<'_>) -> Result<Value, CodecError> {
    Ok(match wire_ty {
        WireType::Zero => Value::Null,
        WireType::Int8 | WireType::Int16 | WireType::Int32 | WireType::Int64 => Value::Int(decode_int(ScalarKind::Int64, wire_ty, cursor)?),
        WireType::Float => Value::Float(f64::from(f32::from_be_bytes(cursor.take(4)?.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 4, available: 0 })?))),
        WireType::Double => Value::Float(f64::from_be_bytes(cursor.take(8)?.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 8, available: 0 })?)),
        WireType::String1 => {
            let len = usize::from(cursor.take_u8()?);
            String::from_utf8(cursor.take(len)?.to_vec()).map(Value::Text).map_err(|_| CodecError::InvalidUtf8 { field: "<variant>".into() })?
        }
        WireType::String4 => {
            let len = u32::from_be_bytes(cursor.take(4)?.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 4, available: 0 })?) as usize;
            String::from_utf8(cursor.take(len)?.to_vec()).map(Value::Text).map_err(|_| CodecError::InvalidUtf8 { field: "<variant>".into() })?
        }
        WireType::Bytes => {
            let len = decode_count(cursor)?;
            Value::Bytes(cursor.take(len)?.to_vec())
        }
        WireType::List => {
            let count = decode_count(cursor)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let (_, elem_ty) = read_head(cursor)?;
                items.push(decode_variant(elem_ty, cursor)?);
            }
            Value::Array(items)
        }
        WireType::Map => {
            let count = decode_count(cursor)?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let (_, key_wire) = read_head(cursor)?;
                let key = decode_variant(key_wire, cursor)?;
                let (_, val_wire) = read_head(cursor)?;
                let val = decode_variant(val_wire, cursor)?;
                entries.push((key, val));
            }
            Value::Map(entries)
        }
        WireType::StructBegin | WireType::StructEnd => {
            return Err(CodecError::UnsupportedShape { codec: "tagbinary", shape: "nested struct inside an untyped Variant" });
        }
    })
}

/// Structurally skip one value of wire type `ty` without producing it,
/// for [`UnknownTagPolicy::Skip`].
fn skip_value(ty: WireType, cursor: &mut Cursor<'_>) -> Result<(), CodecError> {
    match ty {
        WireType::Zero | WireType::StructEnd => {}
        WireType::Int8 | WireType::Int16 | WireType::Int32 | WireType::Int64 => {
            #[allow(clippy::expect_used)]
            cursor.take(ty.int_width().expect("integer wire type"))?;
        }
        WireType::Float => {
            cursor.take(4)?;
        }
        WireType::Double => {
            cursor.take(8)?;
        }
        WireType::String1 => {
            let len = usize::from(cursor.take_u8()?);
            cursor.take(len)?;
        }
        WireType::String4 => {
            let len = u32::from_be_bytes(cursor.take(4)?.try_into().map_err(|_| CodecError::BufferUnderrun { needed: 4, available: 0 })?) as usize;
            cursor.take(len)?;
        }
        WireType::Bytes => {
            let len = decode_count(cursor)?;
            cursor.take(len)?;
        }
        WireType::List => {
            let count = decode_count(cursor)?;
            for _ in 0..count {
                let (_, elem_ty) = read_head(cursor)?;
                skip_value(elem_ty, cursor)?;
            }
        }
        WireType::Map => {
            let count = decode_count(cursor)?;
            for _ in 0..count {
                let (_, key_ty) = read_head(cursor)?;
                skip_value(key_ty, cursor)?;
                let (_, val_ty) = read_head(cursor)?;
                skip_value(val_ty, cursor)?;
            }
        }
        WireType::StructBegin => loop {
            let (_, inner_ty) = read_head(cursor)?;
            if inner_ty == WireType::StructEnd {
                break;
            }
            skip_value(inner_ty, cursor)?;
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use relaywire_types::{FieldSpec, SizeSource};

    fn demo_spec() -> Arc<MessageSpec> {
        Arc::new(MessageSpec::new(
            "Demo",
            vec![
                FieldSpec::new("id", TypeDescriptor::Scalar(ScalarKind::Int64)).with_tag(0),
                FieldSpec::new("name", TypeDescriptor::Str(SizeSource::SelfDescribing)).with_tag(1),
                FieldSpec::new("arr", TypeDescriptor::Array(Box::new(TypeDescriptor::Scalar(ScalarKind::Int32)), SizeSource::SelfDescribing)).with_tag(2),
                FieldSpec::new(
                    "mapping",
                    TypeDescriptor::Map(Box::new(TypeDescriptor::Str(SizeSource::SelfDescribing)), Box::new(TypeDescriptor::Scalar(ScalarKind::Int32))),
                )
                .with_tag(3),
            ],
        ))
    }

    /// A full round trip through an arbitrary nested message.
    #[test]
    fn s1_tagbinary_round_trip() {
        let spec = demo_spec();
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(Arc::clone(&spec));
        msg.assign("id", 2_424_323i64).unwrap();
        msg.assign("name", "demo_jce").unwrap();
        msg.assign("arr", vec![13i32, 24, 35]).unwrap();
        msg.assign("mapping", Value::Map(vec![(Value::Text("ooo".into()), Value::Int(1))])).unwrap();

        let codec = TagBinaryCodec::default();
        let bytes = codec.encode(&registry, &msg).expect("encodes");
        let decoded = codec.decode(&registry, &spec, &bytes).expect("decodes");

        assert_eq!(decoded.get("id").unwrap(), Value::Int(2_424_323));
        assert_eq!(decoded.get("name").unwrap(), Value::Text("demo_jce".into()));
        assert_eq!(decoded.get("arr").unwrap(), Value::Array(vec![Value::Int(13), Value::Int(24), Value::Int(35)]));
        assert_eq!(decoded.get("mapping").unwrap(), Value::Map(vec![(Value::Text("ooo".into()), Value::Int(1))]));
    }

    #[test]
    fn zero_value_uses_zero_width_payload() {
        let spec = Arc::new(MessageSpec::new("Z", vec![FieldSpec::new("n", TypeDescriptor::Scalar(ScalarKind::Int32)).with_tag(0)]));
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(Arc::clone(&spec));
        msg.assign("n", 0i32).unwrap();
        let bytes = TagBinaryCodec::default().encode(&registry, &msg).unwrap();
        assert_eq!(bytes, vec![(0u8 << 4) | WireType::Zero as u8]);
    }

    #[test]
    fn unknown_tag_is_skipped_by_default() {
        let producer = Arc::new(MessageSpec::new(
            "Wide",
            vec![FieldSpec::new("a", TypeDescriptor::Scalar(ScalarKind::Int32)).with_tag(0), FieldSpec::new("b", TypeDescriptor::Scalar(ScalarKind::Int32)).with_tag(1)],
        ));
        let consumer = Arc::new(MessageSpec::new("Narrow", vec![FieldSpec::new("a", TypeDescriptor::Scalar(ScalarKind::Int32)).with_tag(0)]));
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(Arc::clone(&producer));
        msg.assign("a", 7i32).unwrap();
        msg.assign("b", 9i32).unwrap();
        let bytes = TagBinaryCodec::default().encode(&registry, &msg).unwrap();
        let decoded = TagBinaryCodec::default().decode(&registry, &consumer, &bytes).expect("skips tag 1");
        assert_eq!(decoded.get("a").unwrap(), Value::Int(7));
    }

    #[test]
    fn unknown_tag_rejected_under_strict_policy() {
        let producer = Arc::new(MessageSpec::new(
            "Wide",
            vec![FieldSpec::new("a", TypeDescriptor::Scalar(ScalarKind::Int32)).with_tag(0), FieldSpec::new("b", TypeDescriptor::Scalar(ScalarKind::Int32)).with_tag(1)],
        ));
        let consumer = Arc::new(MessageSpec::new("Narrow", vec![FieldSpec::new("a", TypeDescriptor::Scalar(ScalarKind::Int32)).with_tag(0)]));
        let registry = SchemaRegistry::new();
        let mut msg = Message::new(Arc::clone(&producer));
        msg.assign("a", 7i32).unwrap();
        msg.assign("b", 9i32).unwrap();
        let bytes = TagBinaryCodec::default().encode(&registry, &msg).unwrap();
        let err = TagBinaryCodec::new(UnknownTagPolicy::Reject).decode(&registry, &consumer, &bytes).expect_err("rejects tag 1");
        assert!(matches!(err, CodecError::UnknownTag { .. }));
    }
}
