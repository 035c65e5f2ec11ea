//! Errors raised by the type system.

use thiserror::Error;

/// Failures raised while assigning, constructing, reducing, or defining
/// [`crate::message::Message`] values against a [`crate::schema::MessageSpec`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    /// A value's shape did not match the declared [`crate::schema::TypeDescriptor`].
    #[error("field \"{field}\" expected a {expected} value, found {found}")]
    TypeMismatch {
        /// Field (or `"<array element>"`/`"<map key>"`/`"<map value>"`) that failed.
        field: String,
        /// Human-readable name of the expected shape.
        expected: &'static str,
        /// Human-readable name of what was actually supplied.
        found: &'static str,
    },

    /// A scalar value fell outside the legal range for its declared width.
    #[error("field \"{field}\" value {value} is out of range for {kind}")]
    RangeOverflow {
        /// Offending field name.
        field: String,
        /// Value that was rejected, formatted for display.
        value: String,
        /// Declared scalar kind.
        kind: &'static str,
    },

    /// A required field had no value, no default, and was not optional.
    #[error("required field \"{field}\" of \"{message}\" is not set")]
    UninitializedRequiredField {
        /// Owning message name.
        message: String,
        /// Offending field name.
        field: String,
    },

    /// `construct` was given a canonical dict value naming a field the
    /// schema does not declare.
    #[error("message \"{message}\" has no field named \"{field}\"")]
    UnknownField {
        /// Owning message name.
        message: String,
        /// Field name that was not recognized.
        field: String,
    },

    /// Assignment targeted a field name the schema does not declare.
    #[error("message \"{message}\" has no such field to assign: \"{field}\"")]
    NoSuchField {
        /// Owning message name.
        message: String,
        /// Field name that was not recognized.
        field: String,
    },

    /// A [`crate::schema::TypeDescriptor::Dict`] named a message that is not
    /// present in the [`crate::schema::SchemaRegistry`] it was resolved against.
    #[error("schema registry has no message named \"{0}\"")]
    UnknownMessage(String),

    /// Building a schema produced (or referenced) a cycle that could not be
    /// resolved to a concrete layout (e.g. two messages extending each other).
    #[error("cyclic inheritance detected while building schema \"{0}\"")]
    CyclicInheritance(String),

    /// A field was assigned `None`/`null` without `allow_none`.
    #[error("field \"{0}\" does not allow a null assignment")]
    NullNotAllowed(String),
}
