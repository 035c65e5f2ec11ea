//! Packet framer: decides where one packet ends and the next begins,
//! and computes per-field byte offsets/sizes over a declared layout.
//!
//! Two entry points cover the two things this crate is asked for:
//!
//! - [`next_packet_length`] — given a message's schema and a partial
//!   byte buffer, determine how many bytes the next complete packet
//!   occupies (or that more bytes are needed).
//! - [`field_size_of`]/[`offset_of`] — walk a schema (statically) or a
//!   schema+live `Message` (dynamically) to find a named field's byte
//!   size or its offset from the start of the encoding.
//!
//! Only [`relaywire_codec::binary::BinaryCodec`]-shaped layouts are
//! addressable this way: a fixed-layout, non-self-describing
//! concatenation of fields in declaration order. This crate does not
//! depend on `relaywire-codec` — it duplicates the small amount of
//! layout arithmetic it needs directly over `relaywire-types`, since
//! pulling in the codec crate just for that would invert the dependency
//! the workspace wants (`relaywire-channel` depends on both `-codec` and
//! `-framing` independently; see `DESIGN.md`).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;

pub use error::FramingError;

use relaywire_types::{Message, MessageSpec, ScalarKind, SchemaRegistry, SizeSource, TypeDescriptor, Value};

/// Byte order the framer reads a numeric `length_field` in.
///
/// Independent of `relaywire_codec::binary::ByteOrder` — this crate has
/// no dependency on the codec crate — but carries the same two variants
/// so a caller configuring a `Binary`-framed channel can mirror one
/// setting across both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Network byte order.
    #[default]
    Big,
    /// Host byte order on little-endian machines.
    Little,
}

/// The result of asking "how many bytes does the next packet occupy?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    /// The next complete packet is exactly this many bytes.
    Complete(usize),
    /// Not enough bytes have arrived yet to know.
    NeedMore,
}

/// Determine the length of the next complete packet of `spec`'s shape at
/// the front of `buf`.
///
/// If `spec` declares no `length_field`, the entire buffer is the
/// packet — the caller is assumed to already know packet boundaries
/// (e.g. one UDP datagram per packet). Otherwise the declared field is
/// located by its dotted path, read once enough bytes are present, and
/// returned as the total packet length.
///
/// # Errors
/// [`FramingError`] if the `length_field` path does not resolve, resolves
/// through a variable-width prefix, does not name a numeric scalar, or
/// decodes to a value smaller than the header it sits in (a declared
/// length that can't even cover its own length field is never a valid
/// packet — treat it as a desynced stream, not `NeedMore`).
pub fn next_packet_length(spec: &MessageSpec, registry: &SchemaRegistry, buf: &[u8], endianness: Endianness) -> Result<FrameDecision, FramingError> {
    let Some(path) = &spec.length_field else {
        return Ok(FrameDecision::Complete(buf.len()));
    };
    let (offset, width, kind) = locate(spec, registry, &path_components(path))?;
    let Some(kind) = kind else {
        return Err(FramingError::NonNumericLengthField { message: spec.name.clone(), path: path.clone() });
    };
    if buf.len() < offset + width {
        return Ok(FrameDecision::NeedMore);
    }
    let raw = &buf[offset..offset + width];
    let value = read_unsigned(raw, endianness);
    let _ = kind; // the length field's declared sign is irrelevant; lengths are always read as unsigned magnitudes.
    if (value as usize) < offset + width {
        return Err(FramingError::InconsistentLength { message: spec.name.clone(), declared: i128::from(value) });
    }
    Ok(FrameDecision::Complete(value as usize))
}

/// Static byte offset and width of the field at `path` within `spec`'s
/// fixed layout.
///
/// # Errors
/// [`FramingError::UnknownPath`]/[`FramingError::NotNested`] if `path`
/// does not resolve; [`FramingError::VariableWidthPrefix`] if any field
/// before the target (or the target's own container) has no statically
/// known width.
pub fn offset_of(spec: &MessageSpec, registry: &SchemaRegistry, path: &str) -> Result<(usize, usize), FramingError> {
    let (offset, width, _) = locate(spec, registry, &path_components(path))?;
    Ok((offset, width))
}

/// Dynamic byte size of the field at `path` as `message` currently holds
/// it — the codec-agnostic companion to [`offset_of`] that
/// calls `field_size_of(value, path)`, used by `Binary`'s `fill_size_ref`
/// pass to learn a size-ref target's actual encoded length.
///
/// Unlike [`offset_of`], this walks real values, so it tolerates
/// variable-width fields (`Str`/`Buffer` without a fixed size, `Array`
/// without a fixed count) — only `Map`/`Variant` remain unsupported,
/// since they have no `Binary`-codec byte representation at all.
///
/// # Errors
/// [`FramingError`] if `path` does not resolve against `message`, or
/// resolves to a `Map`/`Variant` field.
pub fn field_size_of(message: &Message, spec: &MessageSpec, registry: &SchemaRegistry, path: &str) -> Result<usize, FramingError> {
    let mut components = path_components(path).into_iter();
    let Some(head) = components.next() else {
        return Err(FramingError::UnknownPath { message: spec.name.clone(), path: path.to_owned() });
    };
    let rest: Vec<&str> = components.collect();
    let field = spec.field(head).ok_or_else(|| FramingError::UnknownPath { message: spec.name.clone(), path: path.to_owned() })?;
    let value = message
        .get(head)
        .map_err(|_| FramingError::UnknownPath { message: spec.name.clone(), path: path.to_owned() })?;

    if rest.is_empty() {
        return dynamic_size(&field.ty, &value, spec, &field.name);
    }
    let TypeDescriptor::Dict(dict_name) = &field.ty else {
        return Err(FramingError::NotNested { message: spec.name.clone(), field: field.name.clone(), path: path.to_owned() });
    };
    let Value::Message(nested_message) = value else {
        return Err(FramingError::NotNested { message: spec.name.clone(), field: field.name.clone(), path: path.to_owned() });
    };
    let nested_spec = registry.get(dict_name).ok_or_else(|| FramingError::UnknownMessage(dict_name.clone()))?;
    field_size_of(&nested_message, &nested_spec, registry, &rest.join("."))
}

fn path_components(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Recursive static resolution used by [`next_packet_length`]/[`offset_of`].
fn locate(spec: &MessageSpec, registry: &SchemaRegistry, path: &[&str]) -> Result<(usize, usize, Option<ScalarKind>), FramingError> {
    let (head, rest) = path.split_first().ok_or_else(|| FramingError::UnknownPath { message: spec.name.clone(), path: String::new() })?;
    let mut offset = 0usize;
    for field in &spec.fields {
        if field.name == *head {
            if rest.is_empty() {
                let width = static_width(&field.ty, registry, &spec.name, &field.name)?;
                let kind = match &field.ty {
                    TypeDescriptor::Scalar(k) => Some(*k),
                    _ => None,
                };
                return Ok((offset, width, kind));
            }
            let TypeDescriptor::Dict(dict_name) = &field.ty else {
                return Err(FramingError::NotNested { message: spec.name.clone(), field: field.name.clone(), path: path.join(".") });
            };
            let nested = registry.get(dict_name).ok_or_else(|| FramingError::UnknownMessage(dict_name.clone()))?;
            let (inner_offset, inner_width, inner_kind) = locate(&nested, registry, rest)?;
            return Ok((offset + inner_offset, inner_width, inner_kind));
        }
        offset += static_width(&field.ty, registry, &spec.name, &field.name)?;
    }
    Err(FramingError::UnknownPath { message: spec.name.clone(), path: path.join(".") })
}

/// Statically known byte width of `ty`, or an error if it depends on
/// runtime data (a size-ref/self-describing `Str`/`Buffer`/`Array`, or
/// `Map`/`Variant`, neither of which has a fixed `Binary` width at all).
fn static_width(ty: &TypeDescriptor, registry: &SchemaRegistry, message: &str, field: &str) -> Result<usize, FramingError> {
    match ty {
        TypeDescriptor::Scalar(kind) => Ok(kind.byte_width()),
        TypeDescriptor::Str(SizeSource::Fixed(n)) | TypeDescriptor::Buffer(SizeSource::Fixed(n)) if *n != 0 => Ok(*n as usize),
        TypeDescriptor::Array(elem, SizeSource::Fixed(n)) if *n != 0 => {
            let elem_width = static_width(elem, registry, message, field)?;
            Ok(elem_width * (*n as usize))
        }
        TypeDescriptor::Dict(dict_name) => {
            let nested = registry.get(dict_name).ok_or_else(|| FramingError::UnknownMessage(dict_name.clone()))?;
            let mut total = 0usize;
            for nested_field in &nested.fields {
                total += static_width(&nested_field.ty, registry, dict_name, &nested_field.name)?;
            }
            Ok(total)
        }
        _ => Err(FramingError::VariableWidthPrefix { message: message.to_owned(), field: field.to_owned() }),
    }
}

/// Actual encoded byte size of `value` under `ty`, for live data rather
/// than a static schema walk.
fn dynamic_size(ty: &TypeDescriptor, value: &Value, spec: &MessageSpec, field: &str) -> Result<usize, FramingError> {
    match (ty, value) {
        (TypeDescriptor::Scalar(kind), _) => Ok(kind.byte_width()),
        (TypeDescriptor::Str(_), Value::Text(s)) => Ok(s.len()),
        (TypeDescriptor::Buffer(_), Value::Bytes(b)) => Ok(b.len()),
        (TypeDescriptor::Array(elem, _), Value::Array(items)) => {
            let mut total = 0usize;
            for item in items {
                total += dynamic_size(elem, item, spec, field)?;
            }
            Ok(total)
        }
        (TypeDescriptor::Dict(_), Value::Message(nested)) => {
            let mut total = 0usize;
            for nested_field in &nested.spec().fields {
                let nested_value = nested.get(&nested_field.name).map_err(|_| FramingError::UnknownPath { message: nested.spec().name.clone(), path: nested_field.name.clone() })?;
                total += dynamic_size(&nested_field.ty, &nested_value, nested.spec(), &nested_field.name)?;
            }
            Ok(total)
        }
        _ => Err(FramingError::VariableWidthPrefix { message: spec.name.clone(), field: field.to_owned() }),
    }
}

fn read_unsigned(bytes: &[u8], endianness: Endianness) -> u64 {
    let mut padded = [0u8; 8];
    match endianness {
        Endianness::Big => padded[8 - bytes.len()..].copy_from_slice(bytes),
        Endianness::Little => padded[..bytes.len()].copy_from_slice(bytes),
    }
    match endianness {
        Endianness::Big => u64::from_be_bytes(padded),
        Endianness::Little => u64::from_le_bytes(padded),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use relaywire_types::{FieldSpec, MessageSpec};

    fn packet_spec() -> MessageSpec {
        MessageSpec::new(
            "Packet",
            vec![
                FieldSpec::new("len", TypeDescriptor::Scalar(ScalarKind::Uint32)),
                FieldSpec::new("seq", TypeDescriptor::Scalar(ScalarKind::Uint32)),
                FieldSpec::new("body", TypeDescriptor::Buffer(SizeSource::SizeRef("len".into()))),
            ],
        )
        .with_length_field("len")
    }

    /// Feed two back-to-back packets one byte at
    /// a time; the framer must return `NeedMore` until the length field
    /// itself is fully present, then the exact total packet length.
    #[test]
    fn s3_tcp_framing_via_length_field() {
        let spec = packet_spec();
        let registry = SchemaRegistry::new();

        let body = b"hello-world";
        let mut packet = Vec::new();
        let total_len = (4 + 4 + body.len()) as u32;
        packet.extend(total_len.to_be_bytes());
        packet.extend(7u32.to_be_bytes());
        packet.extend(body);

        let mut two = packet.clone();
        two.extend(&packet);

        for n in 0..8 {
            let decision = next_packet_length(&spec, &registry, &two[..n], Endianness::Big).expect("resolves");
            assert_eq!(decision, FrameDecision::NeedMore, "only {n} bytes available, length field needs 4");
        }
        for n in 8..packet.len() {
            let decision = next_packet_length(&spec, &registry, &two[..n], Endianness::Big).expect("resolves");
            assert_eq!(decision, FrameDecision::Complete(packet.len()));
        }
        let decision = next_packet_length(&spec, &registry, &two, Endianness::Big).expect("resolves");
        assert_eq!(decision, FrameDecision::Complete(packet.len()));
    }

    #[test]
    fn offset_of_sums_preceding_fixed_fields() {
        let spec = packet_spec();
        let registry = SchemaRegistry::new();
        assert_eq!(offset_of(&spec, &registry, "len").expect("len"), (0, 4));
        assert_eq!(offset_of(&spec, &registry, "seq").expect("seq"), (4, 4));
    }

    #[test]
    fn offset_of_rejects_a_variable_width_prefix() {
        let spec = MessageSpec::new(
            "Weird",
            vec![
                FieldSpec::new("name", TypeDescriptor::Str(SizeSource::Fixed(0))),
                FieldSpec::new("n", TypeDescriptor::Scalar(ScalarKind::Uint32)),
            ],
        );
        let registry = SchemaRegistry::new();
        let err = offset_of(&spec, &registry, "n").expect_err("name has no static width");
        assert!(matches!(err, FramingError::VariableWidthPrefix { .. }));
    }

    #[test]
    fn no_length_field_returns_whole_buffer() {
        let spec = MessageSpec::new("Datagram", vec![FieldSpec::new("payload", TypeDescriptor::Buffer(SizeSource::Fixed(0)))]);
        let registry = SchemaRegistry::new();
        let buf = b"arbitrary datagram bytes";
        let decision = next_packet_length(&spec, &registry, buf, Endianness::Big).expect("resolves");
        assert_eq!(decision, FrameDecision::Complete(buf.len()));
    }

    /// A declared length smaller than the header it sits in can never be a
    /// real packet; a desynced/malformed stream must be rejected rather
    /// than handed back as `Complete(0)` (which would never drain and spin
    /// the caller's framing loop forever).
    #[test]
    fn length_field_smaller_than_its_own_header_is_rejected() {
        let spec = packet_spec();
        let registry = SchemaRegistry::new();
        let mut buf = Vec::new();
        buf.extend(0u32.to_be_bytes());
        buf.extend(7u32.to_be_bytes());
        let err = next_packet_length(&spec, &registry, &buf, Endianness::Big).expect_err("zero length can't cover its own header");
        assert!(matches!(err, FramingError::InconsistentLength { declared: 0, .. }));
    }
}
