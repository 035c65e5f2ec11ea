//! Single-threaded readiness reactor.
//!
//! One background OS thread blocks on [`mio::Poll`] — a level-triggered
//! readiness primitive — over every registered descriptor. A dedicated
//! [`mio::Waker`] plays the self-pipe's role: [`ReactorHandle::register`],
//! [`ReactorHandle::remove`] and [`ReactorHandle::stop`] all enqueue a
//! [`WakeReason`] on an `mpsc` channel and then wake the poll, so the
//! reactor thread only ever touches its descriptor table from inside the
//! loop, never from a caller's thread.

use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::ReactorError;

/// Reserved token for the self-pipe waker; real registrations start at 0
/// and a [`Token`] equal to this value is never handed out.
const WAKE_TOKEN: Token = Token(usize::MAX);

/// The three callbacks a registered descriptor can fire.
///
/// All three run on the reactor thread and must be non-blocking; a panic
/// inside one is caught, logged, and treated as if `on_error` had fired.
pub struct Callbacks {
    /// Fired whenever the descriptor becomes readable.
    pub on_readable: Box<dyn FnMut() + Send>,
    /// Fired exactly once, the first time the descriptor becomes
    /// writable — used to signal TCP connect completion.
    pub on_writable: Box<dyn FnMut() + Send>,
    /// Fired when `SO_ERROR` is observed on the descriptor, or when a
    /// callback above panics.
    pub on_error: Box<dyn FnMut(io::Error) + Send>,
}

/// A source the reactor can poll and query for a pending socket error.
///
/// Implemented for `mio`'s own `TcpStream`/`UdpSocket`; exists so the
/// reactor does not need to know it is specifically sockets underneath —
/// only that a registered source can be polled and asked "did you error".
pub trait Readiness: mio::event::Source + Send {
    /// Returns the pending `SO_ERROR` value, if any, without clearing the
    /// descriptor's readiness.
    fn take_error(&self) -> io::Result<Option<io::Error>>;
}

impl Readiness for mio::net::TcpStream {
    fn take_error(&self) -> io::Result<Option<io::Error>> {
        mio::net::TcpStream::take_error(self)
    }
}

impl Readiness for mio::net::UdpSocket {
    fn take_error(&self) -> io::Result<Option<io::Error>> {
        mio::net::UdpSocket::take_error(self)
    }
}

struct Registration {
    source: Box<dyn Readiness>,
    callbacks: Callbacks,
    /// `true` until the one-shot `on_writable` has fired.
    awaiting_writable: bool,
}

enum WakeReason {
    Register { token: Token, source: Box<dyn Readiness>, interest: Interest, callbacks: Callbacks },
    Remove(Token),
    Stop,
}

/// A cheaply cloneable handle used to drive a running [`Reactor`] from any
/// thread.
#[derive(Clone)]
pub struct ReactorHandle {
    sender: Sender<WakeReason>,
    waker: Arc<Waker>,
    next_token: Arc<AtomicUsize>,
}

impl ReactorHandle {
    /// Register a new descriptor.
    ///
    /// Returns the [`Token`] the reactor will use for this descriptor's
    /// events immediately; the registration itself happens asynchronously
    /// on the reactor thread once it wakes.
    ///
    /// # Errors
    /// [`ReactorError`] if the reactor has already stopped.
    pub fn register(&self, source: impl Readiness + 'static, interest: Interest, callbacks: Callbacks) -> Result<Token, ReactorError> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.sender
            .send(WakeReason::Register { token, source: Box::new(source), interest, callbacks })
            .map_err(|_| ReactorError::Closed)?;
        self.waker.wake()?;
        Ok(token)
    }

    /// Enqueue removal of `token`.
    ///
    /// The reactor drains its removal queue at the top of each poll cycle
    /// and never calls callbacks on a removed token again.
    ///
    /// # Errors
    /// [`ReactorError`] if the reactor has already stopped.
    pub fn remove(&self, token: Token) -> Result<(), ReactorError> {
        self.sender.send(WakeReason::Remove(token)).map_err(|_| ReactorError::Closed)?;
        self.waker.wake().map_err(ReactorError::from)
    }

    /// Stop the reactor: clears its running flag, wakes it once more, and
    /// lets it close every descriptor still resident.
    ///
    /// # Errors
    /// [`ReactorError`] if the reactor has already stopped.
    pub fn stop(&self) -> Result<(), ReactorError> {
        self.sender.send(WakeReason::Stop).map_err(|_| ReactorError::Closed)?;
        self.waker.wake().map_err(ReactorError::from)
    }
}

/// Owns the background thread; its only remaining use once a
/// [`ReactorHandle`] has called `stop` is [`Reactor::join`].
pub struct Reactor {
    join_handle: JoinHandle<()>,
}

impl Reactor {
    /// Spawn the reactor's background thread and return a handle to
    /// drive it plus the [`Reactor`] itself.
    ///
    /// # Errors
    /// [`ReactorError`] if the initial `Poll`/`Waker` setup fails.
    pub fn spawn(thread_name: impl Into<String>) -> Result<(ReactorHandle, Self), ReactorError> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let (sender, receiver) = mpsc::channel();
        let handle = ReactorHandle { sender, waker, next_token: Arc::new(AtomicUsize::new(0)) };

        let join_handle = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || run(poll, receiver))
            .map_err(ReactorError::Io)?;

        Ok((handle, Self { join_handle }))
    }

    /// Block until the reactor thread has returned from its loop.
    ///
    /// # Errors
    /// [`ReactorError::Closed`] if the thread panicked.
    pub fn join(self) -> Result<(), ReactorError> {
        self.join_handle.join().map_err(|_| ReactorError::Closed)
    }
}

fn run(mut poll: Poll, receiver: Receiver<WakeReason>) {
    let mut registrations: HashMap<Token, Registration> = HashMap::new();
    let mut events = Events::with_capacity(1024);
    let mut running = true;

    while running {
        drain_commands(&receiver, &mut poll, &mut registrations, &mut running);
        if !running {
            break;
        }

        if let Err(err) = poll.poll(&mut events, None) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::error!(error = %err, "reactor poll failed, stopping");
            break;
        }

        for event in &events {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            dispatch(&mut poll, &mut registrations, event);
        }
    }

    for (token, mut reg) in registrations.drain() {
        let _ = poll.registry().deregister(reg.source.as_mut());
        tracing::debug!(?token, "reactor closed descriptor on stop");
    }
}

fn drain_commands(receiver: &Receiver<WakeReason>, poll: &mut Poll, registrations: &mut HashMap<Token, Registration>, running: &mut bool) {
    while let Ok(reason) = receiver.try_recv() {
        match reason {
            WakeReason::Register { token, mut source, interest, callbacks } => {
                if let Err(err) = poll.registry().register(source.as_mut(), token, interest) {
                    tracing::warn!(error = %err, "failed to register reactor source");
                    continue;
                }
                registrations.insert(token, Registration { source, callbacks, awaiting_writable: interest.is_writable() });
            }
            WakeReason::Remove(token) => {
                if let Some(mut reg) = registrations.remove(&token) {
                    let _ = poll.registry().deregister(reg.source.as_mut());
                }
            }
            WakeReason::Stop => *running = false,
        }
    }
}

/// Handle one readiness `event` for its token: promote `SO_ERROR` to
/// `on_error`, otherwise fire `on_readable`/one-shot `on_writable`,
/// catching panics. The registration is removed from
/// the table for the duration of the call and reinserted only if it
/// survives — this sidesteps holding a mutable borrow of the whole map
/// across a callback that might itself want to touch the reactor.
fn dispatch(poll: &mut Poll, registrations: &mut HashMap<Token, Registration>, event: &mio::event::Event) {
    let token = event.token();
    let Some(mut reg) = registrations.remove(&token) else {
        return;
    };

    if let Ok(Some(err)) = reg.source.take_error() {
        tracing::warn!(?token, error = %err, "socket error observed, removing descriptor");
        let _ = poll.registry().deregister(reg.source.as_mut());
        fire_error(&mut reg.callbacks.on_error, err);
        return;
    }

    let mut survived = true;

    if survived && event.is_readable() && !fire(token, "on_readable", &mut reg.callbacks.on_readable) {
        survived = false;
    }

    if survived && event.is_writable() && reg.awaiting_writable {
        reg.awaiting_writable = false;
        if !fire(token, "on_writable", &mut reg.callbacks.on_writable) {
            survived = false;
        }
    }

    if survived {
        registrations.insert(token, reg);
    } else {
        let _ = poll.registry().deregister(reg.source.as_mut());
        fire_error(&mut reg.callbacks.on_error, io::Error::other("reactor callback panicked"));
    }
}

/// Run `callback`, catching a panic. Returns `false` if it panicked.
fn fire(token: Token, name: &'static str, callback: &mut Box<dyn FnMut() + Send>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(()) => true,
        Err(_) => {
            tracing::error!(?token, callback = name, "reactor callback panicked");
            false
        }
    }
}

fn fire_error(callback: &mut Box<dyn FnMut(io::Error) + Send>, err: io::Error) {
    let message = err.to_string();
    if panic::catch_unwind(AssertUnwindSafe(|| callback(err))).is_err() {
        tracing::error!(error = %message, "on_error callback itself panicked");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::*;

    #[test]
    fn registers_and_fires_on_readable() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let mut client_std = std::net::TcpStream::connect(addr).expect("connect");
        let (accepted, _) = listener.accept().expect("accept");
        accepted.set_nonblocking(true).expect("nonblocking");
        client_std.write_all(b"ping").expect("write");

        let mio_stream = mio::net::TcpStream::from_std(accepted);

        let (handle, reactor) = Reactor::spawn("test-reactor-readable").expect("spawn");
        let (tx, rx) = channel::<()>();
        let callbacks = Callbacks {
            on_readable: Box::new(move || {
                let _ = tx.send(());
            }),
            on_writable: Box::new(|| {}),
            on_error: Box::new(|_| {}),
        };
        handle.register(mio_stream, Interest::READABLE, callbacks).expect("register");

        rx.recv_timeout(Duration::from_secs(2)).expect("on_readable fired");
        handle.stop().expect("stop");
        reactor.join().expect("join");
    }

    #[test]
    fn stop_drains_the_descriptor_table_even_when_empty() {
        let (handle, reactor) = Reactor::spawn("test-reactor-stop").expect("spawn");
        handle.stop().expect("stop");
        reactor.join().expect("join");
    }

    #[test]
    fn commands_after_stop_report_closed() {
        let (handle, reactor) = Reactor::spawn("test-reactor-closed").expect("spawn");
        handle.stop().expect("stop");
        reactor.join().expect("join");

        let err = handle.remove(Token(0));
        assert!(matches!(err, Err(ReactorError::Closed)));
    }
}
