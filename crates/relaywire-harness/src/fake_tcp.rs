//! An in-process fake TCP peer: a real loopback `TcpListener` whose
//! reply timing a test controls directly.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use relaywire_codec::binary::{BinaryCodec, ByteOrder};
use relaywire_codec::Serializer;
use relaywire_types::{Message, SchemaRegistry, Value};

use crate::fixtures::{packet_spec, PACKET_LEN};

/// A single-connection TCP peer that reads one framed `Packet` and
/// replies with its own `Packet` carrying the same `seq`, after waiting
/// `reply_after`.
pub struct FakeTcpServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl FakeTcpServer {
    /// Bind an ephemeral loopback port and, on the first connection, read
    /// exactly one `Packet`, sleep `reply_after`, then echo a `Packet`
    /// carrying the same sequence id back.
    ///
    /// # Panics
    /// If the loopback listener cannot be bound — there is no sensible
    /// recovery for a test fixture that can't acquire a socket.
    #[must_use]
    pub fn spawn_delayed_echo(reply_after: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener has a local addr");
        let handle = thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else { return };
            let mut raw = vec![0u8; PACKET_LEN as usize];
            if stream.read_exact(&mut raw).is_err() {
                return;
            }
            let registry = SchemaRegistry::new();
            let spec = packet_spec();
            let codec = BinaryCodec::new(ByteOrder::Big);
            let Ok(ping) = codec.decode(&registry, &spec, &raw) else { return };
            let Ok(Value::Int(seq)) = ping.get("seq") else { return };

            thread::sleep(reply_after);

            let mut pong = Message::new(spec);
            if pong.assign("len", Value::Int(i128::from(PACKET_LEN))).is_err() {
                return;
            }
            if pong.assign("seq", Value::Int(seq)).is_err() {
                return;
            }
            if let Ok(bytes) = codec.encode(&registry, &pong) {
                let _ = stream.write_all(&bytes);
            }
        });
        Self { addr, handle }
    }

    /// Address to connect a [`relaywire_channel::Channel`] against.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the accept/reply thread finishes. Tests call this
    /// after their own assertions so the fixture doesn't outlive them.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}
