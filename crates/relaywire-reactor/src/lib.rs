//! Reactor (RX) and Socket Connection (SC) — the single-threaded
//! readiness-based event loop that drives relaywire's socket channel.
//!
//! Built directly on `mio`, since this reactor describes exactly the
//! `Poll`/`Events`/`Waker` pattern `mio` exists for; see `DESIGN.md`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod connection;
mod error;
mod reactor;

pub use connection::{ConnectionCallbacks, Proto, ReadResult, SocketConnection};
pub use error::{ConnectionError, ReactorError};
pub use reactor::{Callbacks, Reactor, ReactorHandle, Readiness};

pub use mio::{Interest, Token};
