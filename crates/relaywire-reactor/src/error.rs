//! Errors raised by the reactor and the socket connections it drives.

use std::io;

use thiserror::Error;

/// Failures raised by [`crate::ReactorHandle`].
#[derive(Debug, Error)]
pub enum ReactorError {
    /// A syscall the reactor itself made (waking the self-pipe,
    /// registering/deregistering a source) failed.
    #[error("reactor i/o failure: {0}")]
    Io(#[from] io::Error),

    /// A command was sent to a reactor whose background thread has
    /// already returned from [`crate::Reactor::stop`].
    #[error("reactor has already stopped, cannot accept new commands")]
    Closed,
}

/// Failures raised by [`crate::connection::SocketConnection`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The underlying reactor rejected a register/remove request.
    #[error(transparent)]
    Reactor(#[from] ReactorError),

    /// A socket syscall (connect, send, recv) failed.
    #[error("socket i/o failure: {0}")]
    Io(#[from] io::Error),

    /// `send`/`read` was called before `open` or after `close`.
    #[error("connection is not open")]
    NotOpen,

    /// `send_to` was called on a TCP connection, which has no notion of a
    /// per-call destination.
    #[error("send_to is only meaningful for a udp connection")]
    WrongProto,
}
