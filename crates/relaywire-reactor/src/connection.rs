//! Non-blocking TCP/UDP socket wrapped around a [`crate::ReactorHandle`].
//!
//! The underlying `mio` socket lives behind `Arc<Mutex<Option<Socket>>>`
//! so it can be driven from two places at once: the reactor thread (via
//! a thin [`mio::event::Source`] adapter registered with the reactor)
//! and whichever user thread calls [`SocketConnection::send`]/
//! [`SocketConnection::read`]. `close()` takes the socket out of the
//! `Option`, which is what makes it idempotent.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use mio::net::{TcpStream, UdpSocket};
use mio::{Interest, Registry, Token};

use crate::error::ConnectionError;
use crate::reactor::{Callbacks, Readiness, ReactorHandle};

/// Transport a [`SocketConnection`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    /// Stream-oriented, connection-based.
    Tcp,
    /// Datagram-oriented. `connect` is optional.
    Udp,
}

/// The callback surface Socket Connection exposes to its owner (the
/// Socket Channel).
pub struct ConnectionCallbacks {
    /// Fired once the connection is usable: immediately for UDP, after
    /// the reactor's writable event for TCP.
    pub on_connected: Box<dyn Fn() + Send + Sync>,
    /// Fired after new bytes (TCP) or a new datagram (UDP) have been
    /// drained into the connection's internal buffer; call
    /// [`SocketConnection::read`] to retrieve them.
    pub on_recv: Box<dyn Fn() + Send + Sync>,
    /// Fired once, the first time the connection is closed (by either
    /// side, or by a fatal error).
    pub on_closed: Box<dyn Fn() + Send + Sync>,
    /// Fired on a fatal socket error, immediately before `on_closed`.
    pub on_error: Box<dyn Fn(io::Error) + Send + Sync>,
}

/// What [`SocketConnection::read`] hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// All bytes currently buffered for a TCP connection.
    Stream(Vec<u8>),
    /// One UDP datagram and the peer it arrived from.
    Datagram(Vec<u8>, SocketAddr),
}

enum Socket {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Adapter that lets the reactor register/poll a socket that
/// [`SocketConnection`] also holds a handle to directly.
struct SharedSource(Arc<Mutex<Option<Socket>>>);

impl mio::event::Source for SharedSource {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match lock(&self.0).as_mut() {
            Some(Socket::Tcp(s)) => s.register(registry, token, interests),
            Some(Socket::Udp(s)) => s.register(registry, token, interests),
            None => Err(io::Error::from(ErrorKind::NotConnected)),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match lock(&self.0).as_mut() {
            Some(Socket::Tcp(s)) => s.reregister(registry, token, interests),
            Some(Socket::Udp(s)) => s.reregister(registry, token, interests),
            None => Err(io::Error::from(ErrorKind::NotConnected)),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match lock(&self.0).as_mut() {
            Some(Socket::Tcp(s)) => s.deregister(registry),
            Some(Socket::Udp(s)) => s.deregister(registry),
            None => Ok(()),
        }
    }
}

impl Readiness for SharedSource {
    fn take_error(&self) -> io::Result<Option<io::Error>> {
        match lock(&self.0).as_ref() {
            Some(Socket::Tcp(s)) => s.take_error(),
            Some(Socket::Udp(s)) => s.take_error(),
            None => Ok(None),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A single non-blocking TCP or UDP socket driven by a [`crate::Reactor`].
pub struct SocketConnection {
    proto: Proto,
    peer: SocketAddr,
    connect_udp: bool,
    reactor: ReactorHandle,
    callbacks: ConnectionCallbacks,
    socket: Arc<Mutex<Option<Socket>>>,
    token: Mutex<Option<Token>>,
    tcp_buffer: Mutex<Vec<u8>>,
    udp_inbound: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
}

impl SocketConnection {
    /// Create the socket, initiate `connect` (TCP always; UDP only when
    /// `connect_udp` is set), and register it with `reactor`.
    ///
    /// # Errors
    /// [`ConnectionError`] if the socket cannot be created/connected or
    /// the reactor rejects the registration.
    pub fn open(reactor: ReactorHandle, proto: Proto, peer: SocketAddr, connect_udp: bool, callbacks: ConnectionCallbacks) -> Result<Arc<Self>, ConnectionError> {
        let (socket, interest, connects_synchronously) = match proto {
            Proto::Tcp => (Socket::Tcp(TcpStream::connect(peer)?), Interest::READABLE.add(Interest::WRITABLE), false),
            Proto::Udp => {
                let unspecified: SocketAddr = SocketAddr::from(([0, 0, 0, 0], 0));
                let udp = UdpSocket::bind(unspecified)?;
                if connect_udp {
                    udp.connect(peer)?;
                }
                (Socket::Udp(udp), Interest::READABLE, true)
            }
        };

        let socket_cell = Arc::new(Mutex::new(Some(socket)));
        let conn = Arc::new(Self {
            proto,
            peer,
            connect_udp,
            reactor,
            callbacks,
            socket: Arc::clone(&socket_cell),
            token: Mutex::new(None),
            tcp_buffer: Mutex::new(Vec::new()),
            udp_inbound: Mutex::new(VecDeque::new()),
        });

        let adapter = SharedSource(socket_cell);
        let on_readable = {
            let conn = Arc::clone(&conn);
            Box::new(move || conn.handle_readable())
        };
        let on_writable = {
            let conn = Arc::clone(&conn);
            Box::new(move || conn.handle_writable())
        };
        let on_error = {
            let conn = Arc::clone(&conn);
            Box::new(move |err: io::Error| conn.handle_error(err))
        };

        let token = conn.reactor.register(adapter, interest, Callbacks { on_readable, on_writable, on_error })?;
        *lock(&conn.token) = Some(token);

        if connects_synchronously {
            (conn.callbacks.on_connected)();
        }

        Ok(conn)
    }

    /// Write `bytes`, retrying on `WouldBlock` until the full buffer has
    /// been handed to the kernel (TCP), or send one datagram (UDP).
    ///
    /// # Errors
    /// [`ConnectionError::NotOpen`] if the connection has been closed;
    /// otherwise the underlying socket error.
    pub fn send(&self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let mut guard = lock(&self.socket);
        let socket = guard.as_mut().ok_or(ConnectionError::NotOpen)?;
        match socket {
            Socket::Tcp(stream) => write_all_blocking(stream, bytes)?,
            Socket::Udp(udp) => {
                if self.connect_udp {
                    udp.send(bytes)?;
                } else {
                    udp.send_to(bytes, self.peer)?;
                }
            }
        }
        Ok(())
    }

    /// Send one UDP datagram to `peer` regardless of the connection's
    /// configured default peer, for a caller fanning one socket out to
    /// several destinations (a "direct" UDP connection, `connect_udp ==
    /// false`, is required — a connected UDP socket can only talk to the
    /// peer it connected to).
    ///
    /// # Errors
    /// [`ConnectionError::NotOpen`] if closed, [`ConnectionError::WrongProto`]
    /// if this is a TCP connection or the socket is `connect`-bound UDP.
    pub fn send_to(&self, bytes: &[u8], peer: SocketAddr) -> Result<(), ConnectionError> {
        if self.proto != Proto::Udp || self.connect_udp {
            return Err(ConnectionError::WrongProto);
        }
        let mut guard = lock(&self.socket);
        let socket = guard.as_mut().ok_or(ConnectionError::NotOpen)?;
        match socket {
            Socket::Udp(udp) => {
                udp.send_to(bytes, peer)?;
                Ok(())
            }
            Socket::Tcp(_) => Err(ConnectionError::WrongProto),
        }
    }

    /// Retrieve whatever has been buffered since the last call: all
    /// bytes so far for TCP, or the oldest undelivered datagram for UDP.
    /// Intended to be called from the owner's `on_recv` handler.
    pub fn read(&self) -> Option<ReadResult> {
        match self.proto {
            Proto::Tcp => {
                let mut buf = lock(&self.tcp_buffer);
                if buf.is_empty() {
                    None
                } else {
                    Some(ReadResult::Stream(std::mem::take(&mut *buf)))
                }
            }
            Proto::Udp => lock(&self.udp_inbound).pop_front().map(|(bytes, addr)| ReadResult::Datagram(bytes, addr)),
        }
    }

    /// Idempotent: deregisters from the reactor, drops the socket, and
    /// invokes `on_closed` exactly once.
    pub fn close(&self) {
        let token = lock(&self.token).take();
        let had_socket = lock(&self.socket).take().is_some();
        if let Some(token) = token {
            let _ = self.reactor.remove(token);
        }
        if had_socket {
            (self.callbacks.on_closed)();
        }
    }

    /// Peer address this connection was opened against.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Transport this connection carries.
    #[must_use]
    pub fn proto(&self) -> Proto {
        self.proto
    }

    fn handle_readable(&self) {
        match self.proto {
            Proto::Tcp => self.drain_tcp(),
            Proto::Udp => self.drain_udp(),
        }
    }

    fn drain_tcp(&self) {
        let mut guard = lock(&self.socket);
        let Some(Socket::Tcp(stream)) = guard.as_mut() else { return };
        let mut scratch = [0u8; 4096];
        let mut received_any = false;
        loop {
            match stream.read(&mut scratch) {
                Ok(0) => {
                    drop(guard);
                    self.close();
                    return;
                }
                Ok(n) => {
                    lock(&self.tcp_buffer).extend_from_slice(&scratch[..n]);
                    received_any = true;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    drop(guard);
                    self.handle_error(err);
                    return;
                }
            }
        }
        drop(guard);
        if received_any {
            (self.callbacks.on_recv)();
        }
    }

    fn drain_udp(&self) {
        let mut guard = lock(&self.socket);
        let Some(Socket::Udp(udp)) = guard.as_mut() else { return };
        let mut scratch = [0u8; 65536];
        let mut received_any = false;
        loop {
            let outcome = if self.connect_udp { udp.recv(&mut scratch).map(|n| (n, self.peer)) } else { udp.recv_from(&mut scratch) };
            match outcome {
                Ok((n, from)) => {
                    lock(&self.udp_inbound).push_back((scratch[..n].to_vec(), from));
                    received_any = true;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    drop(guard);
                    self.handle_error(err);
                    return;
                }
            }
        }
        drop(guard);
        if received_any {
            (self.callbacks.on_recv)();
        }
    }

    fn handle_writable(&self) {
        if self.proto == Proto::Tcp {
            (self.callbacks.on_connected)();
        }
    }

    fn handle_error(&self, err: io::Error) {
        (self.callbacks.on_error)(err);
        self.close();
    }
}

fn write_all_blocking(stream: &mut TcpStream, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        match stream.write(bytes) {
            Ok(0) => return Err(io::Error::other("wrote zero bytes to a socket accepting more")),
            Ok(n) => bytes = &bytes[n..],
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::yield_now(),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::*;
    use crate::reactor::Reactor;

    #[test]
    fn tcp_round_trip_through_the_reactor() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let (handle, reactor) = Reactor::spawn("test-connection-tcp").expect("spawn");
        let (connected_tx, connected_rx) = channel::<()>();
        let (recv_tx, recv_rx) = channel::<()>();

        let conn = SocketConnection::open(
            handle.clone(),
            Proto::Tcp,
            addr,
            false,
            ConnectionCallbacks {
                on_connected: Box::new(move || {
                    let _ = connected_tx.send(());
                }),
                on_recv: Box::new(move || {
                    let _ = recv_tx.send(());
                }),
                on_closed: Box::new(|| {}),
                on_error: Box::new(|_| {}),
            },
        )
        .expect("open");

        let (mut server_side, _) = listener.accept().expect("accept");
        connected_rx.recv_timeout(Duration::from_secs(2)).expect("connected fired");

        server_side.write_all(b"hello").expect("server write");
        recv_rx.recv_timeout(Duration::from_secs(2)).expect("recv fired");

        match conn.read().expect("buffered bytes") {
            ReadResult::Stream(bytes) => assert_eq!(bytes, b"hello"),
            ReadResult::Datagram(..) => panic!("expected a stream read"),
        }

        conn.send(b"world").expect("client send");
        let mut got = [0u8; 5];
        server_side.read_exact(&mut got).expect("server read");
        assert_eq!(&got, b"world");

        conn.close();
        handle.stop().expect("stop");
        reactor.join().expect("join");
    }
}
