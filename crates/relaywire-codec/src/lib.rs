//! Pluggable wire serializers over `relaywire-types`.
//!
//! A [`Serializer`] turns a [`Message`] into bytes and back. Four codecs
//! ship: [`binary::BinaryCodec`] (fixed C-layout, size-ref driven),
//! [`tagbinary::TagBinaryCodec`] (self-describing tag+type headers),
//! [`json::JsonCodec`] (text interop), and
//! [`passthrough::PassthroughCodec`] (materializes canonical form without
//! producing bytes at all — used for pretty-printing and tests).
//!
//! Only codecs that are structurally self-describing
//! ([`Serializer::is_self_describing`]) accept `Map`/`Variant` fields;
//! `Binary` rejects both since it carries no type tags to distinguish
//! them from any other shape on the wire.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod binary;
mod cursor;
mod error;
pub mod json;
pub mod passthrough;
pub mod tagbinary;

use std::sync::Arc;

use relaywire_types::{Message, MessageSpec, SchemaRegistry};

pub use error::CodecError;

/// A codec over the `relaywire-types` data model.
///
/// Implementations must round-trip every `Message` whose schema they
/// declare support for: `decode(registry, spec, &encode(registry,
/// message)?)` reproduces `message` field-for-field,
/// modulo codecs that intentionally drop unset optional fields, which
/// re-fill to the same defaults on decode.
pub trait Serializer {
    /// Stable name used for codec-selection lookups.
    fn name(&self) -> &'static str;

    /// Whether this codec's wire format carries its own type/length tags.
    ///
    /// Self-describing codecs ([`tagbinary::TagBinaryCodec`],
    /// [`json::JsonCodec`]) accept `Map` and `Variant` fields; others
    /// (`Binary`) do not, since there would be no way to tell a map from
    /// any other shape without a tag.
    fn is_self_describing(&self) -> bool;

    /// Encode `message` against its own schema.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a required field is unset, a value's
    /// shape does not fit this codec (e.g. a `Map` under `Binary`), or a
    /// size-ref/length computation fails.
    fn encode(&self, registry: &SchemaRegistry, message: &Message) -> Result<Vec<u8>, CodecError>;

    /// Decode a full `spec`-shaped message from `bytes`.
    ///
    /// Callers that need "how many bytes does the next message occupy"
    /// should consult `relaywire-framing` first; `decode` itself assumes
    /// `bytes` holds exactly (or at least) one complete message and
    /// reports [`CodecError::BufferUnderrun`] otherwise.
    ///
    /// # Errors
    /// Returns [`CodecError`] on truncated input, an unexpected tag, or a
    /// schema violation surfaced while reconstructing the message.
    fn decode(&self, registry: &SchemaRegistry, spec: &Arc<MessageSpec>, bytes: &[u8]) -> Result<Message, CodecError>;
}
