//! Errors raised while locating packet boundaries or field offsets.

use thiserror::Error;

/// Failures raised by the packet framer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// A `length_field` dotted path named a field the schema does not
    /// declare, at some level of nesting.
    #[error("message \"{message}\" has no field at path \"{path}\"")]
    UnknownPath {
        /// Message the path was resolved against.
        message: String,
        /// The full dotted path that failed to resolve.
        path: String,
    },

    /// A path component passed through a field that is not itself a
    /// `Dict`, so the remaining components cannot be resolved.
    #[error("field \"{field}\" in \"{message}\" is not a nested message, cannot continue path \"{path}\"")]
    NotNested {
        /// Message the path was resolved against.
        message: String,
        /// Field that was expected to be a `Dict`.
        field: String,
        /// The full dotted path being resolved.
        path: String,
    },

    /// `offset_of`/`next_packet_length` needs every field before the
    /// target to have a statically known byte width, but one of them is
    /// variable-sized (a `Str`/`Buffer`/`Array` without a `Fixed` size).
    #[error("field \"{field}\" in \"{message}\" has no statically known width, cannot compute a static offset past it")]
    VariableWidthPrefix {
        /// Message the path was resolved against.
        message: String,
        /// The variable-sized field blocking static offset computation.
        field: String,
    },

    /// The `length_field` itself did not resolve to a numeric scalar.
    #[error("length field \"{path}\" of \"{message}\" is not a numeric scalar")]
    NonNumericLengthField {
        /// Message the path was resolved against.
        message: String,
        /// The dotted path that resolved to a non-scalar.
        path: String,
    },

    /// A declared length value could not be reconciled with the actual
    /// encoded size of the message it describes.
    #[error("declared length {declared} is inconsistent with message \"{message}\"")]
    InconsistentLength {
        /// Message the length was read for.
        message: String,
        /// The value the length field held.
        declared: i128,
    },

    /// Schema lookup failed (e.g. a nested `Dict` field's type name is not
    /// present in the registry passed to the framer).
    #[error("schema registry has no message named \"{0}\"")]
    UnknownMessage(String),
}
