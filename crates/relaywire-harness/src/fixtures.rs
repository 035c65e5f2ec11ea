//! Shared wire schema and request/response types the scenario tests
//! build on: a `Ping`/`Pong` pair matching the framing/demux/timeout scenarios'
//! worked examples — a `u32` length prefix, an `i64` sequence id,
//! nothing else.

use std::sync::Arc;
use std::time::Duration;

use relaywire_channel::{Request, Response};
use relaywire_types::{FieldSpec, Message, MessageSpec, ScalarKind, TypeDescriptor, Value};

/// Schema shared by requests and responses: `len` (the TCP framing
/// prefix) then `seq`. UDP scenarios ignore `len` entirely — one
/// datagram is one packet regardless of its declared `length_field`.
#[must_use]
pub fn packet_spec() -> Arc<MessageSpec> {
    Arc::new(
        MessageSpec::new(
            "Packet",
            vec![
                FieldSpec::new("len", TypeDescriptor::Scalar(ScalarKind::Uint32)),
                FieldSpec::new("seq", TypeDescriptor::Scalar(ScalarKind::Int64)),
            ],
        )
        .with_length_field("len"),
    )
}

/// Total encoded byte length of [`packet_spec`]'s fixed layout: a 4-byte
/// `len` prefix plus an 8-byte `seq`.
pub const PACKET_LEN: u32 = 12;

/// A `Ping` request: a sequence id plus how long `send` should wait for
/// its `Pong`.
pub struct PingRequest {
    /// Sequence id correlating this request with its response.
    pub seq: i64,
    /// Per-request timeout handed to `Channel::send`.
    pub timeout: Duration,
    spec: Arc<MessageSpec>,
}

impl PingRequest {
    /// A ping carrying `seq`, waiting up to `timeout` for its pong.
    #[must_use]
    pub fn new(seq: i64, timeout: Duration) -> Self {
        Self { seq, timeout, spec: packet_spec() }
    }
}

impl Request for PingRequest {
    fn to_message(&self) -> Message {
        let mut message = Message::new(Arc::clone(&self.spec));
        message.assign("len", Value::Int(i128::from(PACKET_LEN))).expect("len assigns");
        message.assign("seq", Value::Int(i128::from(self.seq))).expect("seq assigns");
        message
    }

    fn sequence_id(&self) -> i64 {
        self.seq
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A `Pong` response carrying back the sequence id it answers.
pub struct PongResponse {
    /// Sequence id this response claims to answer.
    pub seq: i64,
}

impl Response for PongResponse {
    fn from_message(message: Message) -> Self {
        let Value::Int(seq) = message.get("seq").expect("seq present") else { panic!("seq is not an int") };
        Self { seq: seq as i64 }
    }

    fn sequence_id(&self) -> i64 {
        self.seq
    }
}
