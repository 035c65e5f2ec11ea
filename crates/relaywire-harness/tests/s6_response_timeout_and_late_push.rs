//! An echo server withholds its reply past the
//! request's own timeout, then answers 500ms later. `send` must fail
//! with `ResponseTimeout` promptly, and the late response must surface
//! through `on_push` rather than being dropped or misrouted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use relaywire_channel::{Channel, ChannelConfig, ChannelError, Proto};
use relaywire_codec::binary::{BinaryCodec, ByteOrder};
use relaywire_framing::Endianness;
use relaywire_harness::{packet_spec, FakeTcpServer, PingRequest, PongResponse};
use relaywire_types::SchemaRegistry;

#[test]
fn s6_response_timeout_then_late_arrival_routes_to_on_push() {
    let server = FakeTcpServer::spawn_delayed_echo(Duration::from_millis(500));

    let registry = Arc::new(SchemaRegistry::new());
    let (handle, _reactor) = relaywire_reactor::Reactor::spawn("s6-timeout-then-push").expect("spawn reactor");

    let pushed: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let pushed_from_reactor = Arc::clone(&pushed);

    let channel: Arc<Channel<PingRequest, PongResponse>> = Channel::new(
        ChannelConfig {
            proto: Proto::Tcp,
            peer: server.addr(),
            connect_udp: false,
            connect_timeout: Duration::from_millis(500),
            sequence_range: (0, 1_000),
            framing_endianness: Endianness::Big,
        },
        handle,
        Arc::new(BinaryCodec::new(ByteOrder::Big)),
        registry,
        packet_spec(),
        move |response: PongResponse| pushed_from_reactor.lock().expect("pushed lock").push(response.seq),
    );

    let err = channel.send(PingRequest::new(7, Duration::from_millis(100))).expect_err("server withholds its reply past the request timeout");
    assert!(matches!(err, ChannelError::ResponseTimeout));

    std::thread::sleep(Duration::from_millis(700));
    assert_eq!(*pushed.lock().expect("pushed lock"), vec![7], "the late response must surface via on_push, not a new waiter");

    server.join();
}
