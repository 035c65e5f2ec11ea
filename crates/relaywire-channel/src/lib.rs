//! Socket Channel: multiplexes many outstanding requests over one
//! reactor-driven socket connection, correlating each by sequence id and
//! enforcing per-request timeouts.
//!
//! Built on top of `relaywire-reactor`'s [`SocketConnection`](relaywire_reactor::SocketConnection)
//! and `relaywire-framing`'s packet boundary detection; a [`Channel`]
//! itself knows nothing about either concern beyond driving them —
//! everything schema- or wire-format-specific is delegated to whichever
//! `relaywire-codec` [`Serializer`](relaywire_codec::Serializer) it is
//! configured with.
//!
//! # Components
//!
//! - [`Channel`]/[`ChannelConfig`]: the public surface — `send`/`send_to`/`close`
//! - [`Request`]/[`Response`]/[`ChannelHandle`]: the hook points a caller's
//!   request/response types implement
//! - [`SequenceGenerator`]: the randomized-start, wrap-around id allocator
//! - [`ChannelError`]: everything that can go wrong, wrapping the lower
//!   layers' own error types
//! - [`logging`]: test-only `tracing` subscriber setup

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod channel;
mod error;
pub mod logging;
mod request;
mod sequence;

pub use channel::{Channel, ChannelConfig};
pub use error::ChannelError;
pub use request::{ChannelHandle, Request, Response};
pub use sequence::SequenceGenerator;

pub use relaywire_reactor::Proto;
