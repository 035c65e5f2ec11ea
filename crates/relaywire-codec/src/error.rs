//! Errors raised while encoding or decoding wire bytes.

use thiserror::Error;

/// Failures raised by a [`crate::Serializer`] implementation.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying schema rejected a value (missing required field,
    /// out-of-range scalar, wrong shape, ...).
    #[error(transparent)]
    Schema(#[from] relaywire_types::SchemaError),

    /// Decoding ran past the end of the supplied buffer.
    #[error("buffer underrun: needed at least {needed} bytes, had {available}")]
    BufferUnderrun {
        /// Bytes the decode step required.
        needed: usize,
        /// Bytes actually remaining in the buffer.
        available: usize,
    },

    /// A `TagBinary` tag on the wire matched no declared field and the
    /// codec was configured to reject unknown tags.
    #[error("unknown tag {tag} for message \"{message}\"")]
    UnknownTag {
        /// Message being decoded.
        message: String,
        /// Tag that had no matching field.
        tag: u16,
    },

    /// A `String` field's bytes were not valid UTF-8.
    #[error("field \"{field}\" is not valid utf-8")]
    InvalidUtf8 {
        /// Offending field.
        field: String,
    },

    /// This codec cannot represent the given shape at all (e.g. `Map`
    /// under `Binary`, or `Dict` under the passthrough codec).
    #[error("{codec} codec does not support {shape} fields")]
    UnsupportedShape {
        /// Codec name.
        codec: &'static str,
        /// Human-readable shape description.
        shape: &'static str,
    },

    /// A `Fixed(n)` field's actual length did not match its declared size.
    #[error("field \"{field}\" has fixed size {expected} but the value is {actual}")]
    FixedSizeMismatch {
        /// Offending field.
        field: String,
        /// Declared size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// JSON encoding/decoding failed.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// `TagBinary` needs a `tag` on every field it encodes or decodes but
    /// the schema left one unset.
    #[error("field \"{field}\" has no tag, required by the tagbinary codec")]
    MissingTag {
        /// Offending field.
        field: String,
    },
}
