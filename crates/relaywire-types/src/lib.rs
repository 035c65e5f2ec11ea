//! Declarative message schema and canonical value model for relaywire.
//!
//! A message schema is a [`MessageSpec`]: an ordered list of named,
//! typed [`FieldSpec`]s. Values flowing through the system — whatever
//! their origin, a caller's `assign`, a codec's decoded canonical form,
//! or a `Variant`-typed field — share one dynamic representation,
//! [`Value`]; see its doc comment for why one enum covers all three.
//!
//! # Components
//!
//! - [`ScalarKind`]: the fixed scalar wire types and their ranges
//! - [`TypeDescriptor`]/[`FieldSpec`]/[`MessageSpec`]: the schema nodes
//! - [`SchemaRegistry`]: resolves `Dict` fields to schemas by name,
//!   which is what lets two messages reference each other
//! - [`Message`]: a live instance of a `MessageSpec`, with
//!   `assign`/`get`/`construct`/`reduce`
//!
//! This crate owns the data model only; `relaywire-codec` turns
//! [`Message`] instances into bytes and back, and `relaywire-framing`
//! decides where one packet ends and the next begins.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod message;
mod scalar;
mod schema;
mod value;

pub use error::SchemaError;
pub use message::Message;
pub use scalar::ScalarKind;
pub use schema::{FieldSpec, MessageSpec, SchemaRegistry, SizeRefHook, SizeSource, TypeDescriptor};
pub use value::Value;
