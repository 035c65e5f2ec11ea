//! An in-process fake UDP peer: each instance
//! binds its own ephemeral loopback socket and echoes back a `Packet`
//! carrying the sequence id it received, so two independently-bound
//! peers can answer the same application sequence id without colliding —
//! the channel's UDP pending key is `(seq, peer_addr)`, not `seq` alone.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use relaywire_codec::binary::{BinaryCodec, ByteOrder};
use relaywire_codec::Serializer;
use relaywire_types::{Message, SchemaRegistry, Value};

use crate::fixtures::{packet_spec, PACKET_LEN};

/// A UDP peer that echoes every datagram it receives back as a
/// freshly-encoded `Packet` with the same `seq`, from its own bound
/// address.
pub struct FakeUdpPeer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl FakeUdpPeer {
    /// Bind an ephemeral loopback port and start echoing datagrams until
    /// [`FakeUdpPeer::stop`] is called.
    ///
    /// # Panics
    /// If the loopback socket cannot be bound or configured.
    #[must_use]
    pub fn spawn_echo() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind loopback udp socket");
        let addr = socket.local_addr().expect("socket has a local addr");
        socket.set_read_timeout(Some(Duration::from_millis(50))).expect("set read timeout");
        let stop = Arc::new(AtomicBool::new(false));
        let stop_loop = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let registry = SchemaRegistry::new();
            let spec = packet_spec();
            let codec = BinaryCodec::new(ByteOrder::Big);
            let mut buf = [0u8; 64];
            while !stop_loop.load(Ordering::Relaxed) {
                let Ok((n, from)) = socket.recv_from(&mut buf) else { continue };
                let Ok(decoded) = codec.decode(&registry, &spec, &buf[..n]) else { continue };
                let Ok(Value::Int(seq)) = decoded.get("seq") else { continue };

                let mut response = Message::new(Arc::clone(&spec));
                if response.assign("len", Value::Int(i128::from(PACKET_LEN))).is_err() {
                    continue;
                }
                if response.assign("seq", Value::Int(seq)).is_err() {
                    continue;
                }
                if let Ok(bytes) = codec.encode(&registry, &response) {
                    let _ = socket.send_to(&bytes, from);
                }
            }
        });

        Self { addr, stop, handle }
    }

    /// Address to target with `Channel::send_to`.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal the echo loop to stop and block until its thread exits.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}
