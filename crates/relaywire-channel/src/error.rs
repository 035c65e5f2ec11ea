//! Errors raised by the Socket Channel.

use thiserror::Error;

/// Failures raised by [`crate::Channel::send`] and friends.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// `wait_for_connected` did not observe `on_connected` within the
    /// configured `connect_timeout`.
    #[error("connection did not complete within the configured timeout")]
    ConnectTimeout,

    /// The blocked waiter in `send` did not wake within the request's
    /// own `timeout`.
    #[error("no response arrived within the request's timeout")]
    ResponseTimeout,

    /// The connection was closed, reset, or fatally errored while a
    /// request was outstanding; every waiter on the channel is woken
    /// with this error and the pending table is cleared.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Two in-flight requests on this channel would share the same
    /// pending key.
    #[error("sequence id {0} is already in flight on this channel")]
    DuplicateSequenceId(i64),

    /// `send_to` was called on a channel that isn't UDP, or `send` was
    /// called before the channel ever opened a connection.
    #[error("{0}")]
    Unsupported(&'static str),

    /// Encoding the request or decoding a response failed.
    #[error(transparent)]
    Codec(#[from] relaywire_codec::CodecError),

    /// The packet framer could not determine the next frame's length.
    #[error(transparent)]
    Framing(#[from] relaywire_framing::FramingError),

    /// The reactor rejected a register/remove request.
    #[error(transparent)]
    Reactor(#[from] relaywire_reactor::ReactorError),

    /// The socket connection itself failed (connect, send, or I/O).
    #[error(transparent)]
    Connection(#[from] relaywire_reactor::ConnectionError),
}
