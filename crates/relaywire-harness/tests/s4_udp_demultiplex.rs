//! A channel bound to one UDP socket talks to
//! two virtual peers that both answer with application sequence id 42.
//! The channel's UDP pending key is `(seq, peer)`, so neither waiter
//! should see the other's response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use relaywire_channel::{Channel, ChannelConfig, Proto};
use relaywire_codec::binary::{BinaryCodec, ByteOrder};
use relaywire_framing::Endianness;
use relaywire_harness::{packet_spec, FakeUdpPeer, PingRequest, PongResponse};
use relaywire_types::SchemaRegistry;

#[test]
fn s4_udp_demultiplex_by_peer_address() {
    let peer_a = FakeUdpPeer::spawn_echo();
    let peer_b = FakeUdpPeer::spawn_echo();

    let registry = Arc::new(SchemaRegistry::new());
    let (handle, _reactor) = relaywire_reactor::Reactor::spawn("s4-udp-demux").expect("spawn reactor");

    let channel: Arc<Channel<PingRequest, PongResponse>> = Channel::new(
        ChannelConfig {
            proto: Proto::Udp,
            peer: peer_a.addr(),
            connect_udp: false,
            connect_timeout: Duration::from_millis(500),
            sequence_range: (0, 1_000),
            framing_endianness: Endianness::Big,
        },
        handle,
        Arc::new(BinaryCodec::new(ByteOrder::Big)),
        registry,
        packet_spec(),
        |_: PongResponse| {},
    );

    let addr_a: SocketAddr = peer_a.addr();
    let addr_b: SocketAddr = peer_b.addr();

    let channel_a = Arc::clone(&channel);
    let thread_a = thread::spawn(move || channel_a.send_to(PingRequest::new(42, Duration::from_secs(1)), addr_a));
    let channel_b = Arc::clone(&channel);
    let thread_b = thread::spawn(move || channel_b.send_to(PingRequest::new(42, Duration::from_secs(1)), addr_b));

    let result_a = thread_a.join().expect("thread a joins");
    let result_b = thread_b.join().expect("thread b joins");

    assert_eq!(result_a.expect("peer a answers its own waiter").seq, 42);
    assert_eq!(result_b.expect("peer b answers its own waiter").seq, 42);

    peer_a.stop();
    peer_b.stop();
}
