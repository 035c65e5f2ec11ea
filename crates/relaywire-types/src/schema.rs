//! Declarative schema nodes and the registry that lets
//! `Dict` fields refer to other messages by name instead of owning them,
//! which is what lets two messages reference each other.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::scalar::ScalarKind;
use crate::value::Value;

/// How the byte length (or element count, for `Array`) of a variable-sized
/// field is determined.
///
/// Carried on the type node itself (not just on [`FieldSpec`]) so that
/// nested occurrences — an `Array` of size-ref'd `Buffer`s, for instance —
/// resolve the same way a top-level field does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeSource {
    /// The named sibling field (resolved against the enclosing `Dict`)
    /// holds this field's encoded byte length, optionally transformed by
    /// a [`SizeRefHook`].
    SizeRef(String),
    /// A fixed byte count (`Str`/`Buffer`) or element count (`Array`).
    /// `0` is the "consume the rest of the buffer" sentinel, legal only
    /// for the last field of a message.
    Fixed(u32),
    /// The wire format is self-describing at this point (`TagBinary`'s
    /// `STRING1`/`STRING4`/`LIST` length prefixes, or JSON's structural
    /// delimiters); no sibling field is consulted.
    SelfDescribing,
}

impl SizeSource {
    /// `true` for the "rest of buffer" sentinel.
    #[must_use]
    pub const fn is_remainder(&self) -> bool {
        matches!(self, Self::Fixed(0))
    }
}

/// A pure, explicitly-paired transform between a field's encoded byte
/// length and the numeric value stored in its `size_ref` peer field.
///
/// A prior convention reused a single hook symbol in both directions;
/// carrying the pair as two named function pointers makes that
/// impossible to do by accident.
#[derive(Clone, Copy)]
pub struct SizeRefHook {
    /// `byte_count_of(field) -> value stored in the size-ref field`.
    pub forward: fn(u64) -> u64,
    /// `value stored in the size-ref field -> byte_count_of(field)`.
    pub inverse: fn(u64) -> u64,
}

impl SizeRefHook {
    /// The hook that stores the byte count unchanged.
    #[must_use]
    pub const fn identity() -> Self {
        Self { forward: |n| n, inverse: |n| n }
    }
}

impl std::fmt::Debug for SizeRefHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizeRefHook")
            .field("forward", &(self.forward as usize))
            .field("inverse", &(self.inverse as usize))
            .finish()
    }
}

/// A schema type node.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    /// A fixed-width numeric or boolean scalar.
    Scalar(ScalarKind),
    /// UTF-8 text.
    Str(SizeSource),
    /// Raw bytes.
    Buffer(SizeSource),
    /// A homogeneous ordered sequence of `element`.
    Array(Box<TypeDescriptor>, SizeSource),
    /// An unordered `key -> value` association; only self-describing
    /// codecs accept it.
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    /// A named record, resolved by name against a [`SchemaRegistry`] at
    /// use time rather than owned inline — this is what lets two `Dict`s
    /// reference each other.
    Dict(String),
    /// A dynamically-typed node; see [`crate::value::Value`]'s doc
    /// comment for why no separate `Variant` value type exists.
    Variant,
}

/// One field of a [`MessageSpec`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name, used as the canonical-form key and, by default, the
    /// user-facing accessor name.
    pub name: String,
    /// Declared type.
    pub ty: TypeDescriptor,
    /// `TagBinary` tag, `0..=14` directly, `15` reserved as the
    /// extension marker for tags needing a second byte.
    pub tag: Option<u8>,
    /// Whether encoding fails with `UninitializedRequiredField` if unset.
    pub required: bool,
    /// Value substituted when unset and not `required`, or when `required`
    /// but a default was declared anyway.
    pub default: Option<Value>,
    /// Alternate accessor name; purely cosmetic, never affects encoding.
    pub display: Option<String>,
    /// Whether assigning `Value::Null` to this field is legal.
    pub allow_none: bool,
    /// How this field's own size is resolved at encode/decode time. Only
    /// meaningful for `Str`/`Buffer`/`Array` fields — carried here (in
    /// addition to on [`TypeDescriptor`]) purely as the anchor
    /// `fill_size_ref` walks to find *referring* fields; see
    /// `relaywire-codec`.
    pub size_ref_hook: Option<SizeRefHook>,
    /// Codec override for this field alone.
    pub serializer_override: Option<String>,
}

impl FieldSpec {
    /// A required field with no further options set.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            tag: None,
            required: true,
            default: None,
            display: None,
            allow_none: false,
            size_ref_hook: None,
            serializer_override: None,
        }
    }

    /// Mark this field optional (absence is not an error at encode time).
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Attach a default value, materialized lazily on read or at `reduce`.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Assign a `TagBinary` tag.
    #[must_use]
    pub const fn with_tag(mut self, tag: u8) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Attach a display alias.
    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Permit `Value::Null` assignment.
    #[must_use]
    pub const fn allow_null(mut self) -> Self {
        self.allow_none = true;
        self
    }

    /// Attach a `size_ref_hook` pair.
    #[must_use]
    pub const fn with_size_ref_hook(mut self, hook: SizeRefHook) -> Self {
        self.size_ref_hook = Some(hook);
        self
    }

    /// The name a caller uses to address this field (the `display` alias
    /// if set, else [`FieldSpec::name`]).
    #[must_use]
    pub fn accessor_name(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.name)
    }
}

/// A named, ordered record type.
#[derive(Debug, Clone)]
pub struct MessageSpec {
    /// Schema name; also the key under which it is registered.
    pub name: String,
    /// Fields in declaration order — both the canonical form's field
    /// order and, for `Binary`, the wire layout order.
    pub fields: Vec<FieldSpec>,
    /// Dotted path (`"head.len"`) to the field the framer reads to learn
    /// a packet's total length, if this message declares outer framing.
    pub length_field: Option<String>,
    /// Name of the codec to use absent a field-level override or a
    /// caller-supplied codec.
    pub default_serializer: Option<String>,
    /// Names this spec was built by extending, oldest first, used only
    /// for cycle detection in [`SchemaRegistry::extend`].
    bases: Vec<String>,
}

impl MessageSpec {
    /// A message with no declared framing or default codec.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self { name: name.into(), fields, length_field: None, default_serializer: None, bases: Vec::new() }
    }

    /// Declare the dotted path to this message's length field.
    #[must_use]
    pub fn with_length_field(mut self, path: impl Into<String>) -> Self {
        self.length_field = Some(path.into());
        self
    }

    /// Declare the default codec for this message.
    #[must_use]
    pub fn with_default_serializer(mut self, name: impl Into<String>) -> Self {
        self.default_serializer = Some(name.into());
        self
    }

    /// Find a field by its declared name (not its display alias).
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a field by either its declared name or display alias.
    #[must_use]
    pub fn field_by_accessor(&self, accessor: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.accessor_name() == accessor)
    }

    /// Verify the structural invariants required of every
    /// schema: at most one trailing "rest of buffer" field, and
    /// `size_ref` peers actually exist and precede their referrer.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (idx, field) in self.fields.iter().enumerate() {
            let size = match &field.ty {
                TypeDescriptor::Str(s) | TypeDescriptor::Buffer(s) | TypeDescriptor::Array(_, s) => Some(s),
                _ => None,
            };
            let Some(size) = size else { continue };
            if size.is_remainder() && idx + 1 != self.fields.len() {
                return Err(SchemaError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "a sized field (only the last field may consume the rest of the buffer)",
                    found: "a non-terminal remainder field",
                });
            }
            if let SizeSource::SizeRef(reference) = size {
                let ref_idx = self.fields.iter().position(|f| &f.name == reference);
                match ref_idx {
                    Some(ref_idx) if ref_idx < idx => {}
                    _ => {
                        return Err(SchemaError::UnknownField {
                            message: self.name.clone(),
                            field: reference.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Resolves [`TypeDescriptor::Dict`] name references to concrete
/// [`MessageSpec`]s at use time.
///
/// Schemas are built once (typically at process start) and shared freely
/// via `Arc`; the registry itself is not thread-safe to mutate
/// concurrently with reads (callers that register schemas from multiple
/// threads must synchronize externally, matching how one-time schema
/// setup is used in practice).
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    specs: HashMap<String, Arc<MessageSpec>>,
}

impl SchemaRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, returning a shared handle to it.
    pub fn register(&mut self, spec: MessageSpec) -> Result<Arc<MessageSpec>, SchemaError> {
        spec.validate()?;
        let shared = Arc::new(spec);
        self.specs.insert(shared.name.clone(), Arc::clone(&shared));
        Ok(shared)
    }

    /// Look up a previously registered schema by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<MessageSpec>> {
        self.specs.get(name).cloned()
    }

    /// Build and register `name` as `base`'s fields followed by `extra`
    /// fields.
    ///
    /// Errs with [`SchemaError::CyclicInheritance`] if `base` itself (or
    /// any schema on `base`'s extension chain) is named `name`.
    pub fn extend(
        &mut self,
        base: &str,
        name: impl Into<String>,
        extra: Vec<FieldSpec>,
    ) -> Result<Arc<MessageSpec>, SchemaError> {
        let name = name.into();
        let base_spec = self.get(base).ok_or_else(|| SchemaError::UnknownMessage(base.to_owned()))?;
        if base_spec.bases.iter().any(|b| b == &name) || base_spec.name == name {
            return Err(SchemaError::CyclicInheritance(name));
        }
        let mut fields = base_spec.fields.clone();
        fields.extend(extra);
        let mut bases = base_spec.bases.clone();
        bases.push(base_spec.name.clone());
        let mut merged = MessageSpec::new(name, fields);
        merged.length_field = base_spec.length_field.clone();
        merged.default_serializer = base_spec.default_serializer.clone();
        merged.bases = bases;
        self.register(merged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn remainder_field_must_be_last() {
        let spec = MessageSpec::new(
            "Bad",
            vec![
                FieldSpec::new("first", TypeDescriptor::Buffer(SizeSource::Fixed(0))),
                FieldSpec::new("second", TypeDescriptor::Scalar(ScalarKind::Int32)),
            ],
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn size_ref_must_precede_referrer() {
        let spec = MessageSpec::new(
            "Bad",
            vec![
                FieldSpec::new("buf", TypeDescriptor::Buffer(SizeSource::SizeRef("buf_len".into()))),
                FieldSpec::new("buf_len", TypeDescriptor::Scalar(ScalarKind::Uint32)),
            ],
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn extend_detects_self_cycle() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(MessageSpec::new("A", vec![FieldSpec::new("x", TypeDescriptor::Scalar(ScalarKind::Int32))]))
            .expect("A registers");
        let err = registry.extend("A", "A", vec![]).expect_err("self-extension is cyclic");
        assert!(matches!(err, SchemaError::CyclicInheritance(_)));
    }
}
