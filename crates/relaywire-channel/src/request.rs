//! Request/response hook points: `pre_process`/`post_process`/
//! `set_request` give a caller a place to attach auth headers or stash
//! request context on the matching response, without coupling
//! `Request`/`Response` to `Channel` itself.

use std::net::SocketAddr;

use relaywire_types::Message;

use relaywire_reactor::Proto;

/// What a hook sees about the channel it is running on.
///
/// Deliberately narrow: enough for an auth/header hook to know who it's
/// talking to, not a back-reference into [`crate::Channel`] itself (which
/// would force `Request`/`Response` to be generic over the channel's
/// request/response types too).
#[derive(Debug, Clone, Copy)]
pub struct ChannelHandle {
    pub(crate) peer: SocketAddr,
    pub(crate) proto: Proto,
}

impl ChannelHandle {
    /// Peer this particular send targets (the channel's configured peer
    /// for TCP, or the per-call destination for a UDP fan-out send).
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Transport the channel carries.
    #[must_use]
    pub fn proto(&self) -> Proto {
        self.proto
    }
}

/// A value `Channel::send` can encode and transmit.
///
/// Object-safe by construction (no method returns `Self`), so a caller
/// can hold requests behind `&dyn Request` if it wants to log or queue
/// them generically.
pub trait Request: Send {
    /// Build the canonical message the channel's codec will encode.
    fn to_message(&self) -> Message;

    /// Sequence id correlating this request with its response. Callers
    /// are expected to assign this from [`crate::Channel::next_sequence_id`]
    /// before calling `send`.
    fn sequence_id(&self) -> i64;

    /// How long `send` blocks waiting for a response before failing with
    /// `ResponseTimeout`.
    fn timeout(&self) -> std::time::Duration;

    /// Hook point for auth headers or other per-send mutation, run
    /// immediately before encoding.
    fn pre_process(&mut self, channel: &ChannelHandle) {
        let _ = channel;
    }
}

/// A value `Channel::send` decodes a reply into.
pub trait Response: Send {
    /// Rebuild a response from a decoded canonical message.
    fn from_message(message: Message) -> Self
    where
        Self: Sized;

    /// Sequence id this response claims to answer.
    fn sequence_id(&self) -> i64;

    /// Hook point to let the response stash something from the request
    /// that produced it.
    fn set_request(&mut self, request: &dyn Request) {
        let _ = request;
    }

    /// Hook point run after pairing completes, before `send` returns.
    fn post_process(&mut self, channel: &ChannelHandle) {
        let _ = channel;
    }
}
