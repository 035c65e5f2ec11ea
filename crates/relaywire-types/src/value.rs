//! The canonical in-memory value.
//!
//! A single [`Value`] enum plays three roles: the user-facing value
//! passed to `assign`, the codec-produced canonical form consumed by
//! `construct`/emitted by `reduce`, and the dynamically typed tree a
//! `Variant` field holds. All three need the same shape — scalar, text,
//! bytes, list, ordered map, nested message — so one enum serves all
//! three call sites instead of three near-identical ones.

use std::fmt;

use crate::message::Message;

/// A dynamically typed value flowing through the type system.
///
/// Integers are always carried as `i128` regardless of their declared
/// scalar width, so a single variant can hold anything from an `Int8` to
/// an `Uint64`; [`crate::schema::FieldSpec`] assignment narrows and
/// range-checks against the declared [`crate::scalar::ScalarKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The JSON-ish absence of a value (distinct from an unset field).
    Null,
    /// A boolean scalar.
    Bool(bool),
    /// Any integer scalar, widened to `i128`.
    Int(i128),
    /// A `Float`/`Double` scalar.
    Float(f64),
    /// UTF-8 text (the `String` type kind).
    Text(String),
    /// Raw bytes (the `Buffer` type kind, and the codec-level
    /// representation of `String` before UTF-8 decoding).
    Bytes(Vec<u8>),
    /// An ordered, homogeneous sequence (the `Array` type kind).
    Array(Vec<Value>),
    /// An ordered association list. Modeled as a `Vec` of pairs rather
    /// than a hash map: schema `Map`s are small (a handful of entries at
    /// most in a single RPC message) and insertion order must be
    /// preserved for `TagBinary`'s deterministic encoding, which a hash map would not give us for free.
    Map(Vec<(Value, Value)>),
    /// A nested message (the `Dict` type kind).
    Message(Box<Message>),
}

impl Value {
    /// Human-readable name of this value's shape, for error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Message(_) => "message",
        }
    }

    /// `true` for [`Value::Null`] only — a field's *value* being null is
    /// distinct from the field being unset entirely.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Array(a) => write!(f, "<array of {}>", a.len()),
            Self::Map(m) => write!(f, "<map of {}>", m.len()),
            Self::Message(m) => write!(f, "<message {}>", m.spec().name),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),+ $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i128::from(v))
                }
            }
        )+
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Message> for Value {
    fn from(v: Message) -> Self {
        Value::Message(Box::new(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}
