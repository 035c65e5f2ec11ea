//! Test tooling shared across `relaywire`'s scenario tests: fake peers
//! standing in for a network, plus the fixture schema they speak.
//!
//! Not published — only ever pulled in as a `dev-dependency`. Peers are
//! real loopback sockets rather than a simulated network: `relaywire`'s
//! reactor is a synchronous `mio` event loop, so real sockets with
//! controllable timing exercise it directly.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod fake_tcp;
mod fake_udp;
mod fixtures;

pub use fake_tcp::FakeTcpServer;
pub use fake_udp::FakeUdpPeer;
pub use fixtures::{packet_spec, PingRequest, PongResponse, PACKET_LEN};
