use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use relay_reactor::{EventHandler, FdKind, Handle, Interest, Rearm, Reactor};

use crate::error::{ConnectResult, SocketError};
use crate::state::SocketState;

const READ_CHUNK: usize = 64 * 1024;

/// How long a connect attempt may sit in `Connecting` before it's reported
/// as `ConnectResult::Timeout` and torn down.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Callbacks a `TcpClientSocket` owner implements to observe connection
/// lifecycle, inbound bytes, and per-message write completion. All methods
/// have no-op defaults so implementors only override what they need.
pub trait SocketObserver: Send + Sync {
    fn on_connect_result(&self, _result: ConnectResult) {}
    fn on_data(&self, _bytes: &[u8]) {}
    fn on_write_result(&self, _message_id: u64, _bytes_written: usize, _ok: bool) {}
    fn on_disconnected(&self) {}
}

struct Outbound {
    id: u64,
    data: Vec<u8>,
}

struct Current {
    id: u64,
    data: Vec<u8>,
    offset: usize,
}

struct Inner {
    reactor: Arc<Reactor>,
    host: String,
    port: u16,
    observer: Arc<dyn SocketObserver>,
    state: Mutex<SocketState>,
    state_changed: Condvar,
    stream: Mutex<Option<mio::net::TcpStream>>,
    handle: Mutex<Option<Handle>>,
    outbound_tx: Sender<Outbound>,
    outbound_rx: Receiver<Outbound>,
    current: Mutex<Option<Current>>,
    next_message_id: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// A non-blocking, single-connection TCP socket with a bounded outbound
/// message queue and an explicit connection state machine.
///
/// Cloning is cheap (it shares the same connection); `write` is safe to call
/// from any thread, not just the reactor thread driving the connection.
#[derive(Clone)]
pub struct TcpClientSocket {
    inner: Arc<Inner>,
}

impl TcpClientSocket {
    pub fn new(
        reactor: Arc<Reactor>,
        host: impl Into<String>,
        port: u16,
        queue_capacity: usize,
        observer: Arc<dyn SocketObserver>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = bounded(queue_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                reactor,
                host: host.into(),
                port,
                observer,
                state: Mutex::new(SocketState::Disconnected),
                state_changed: Condvar::new(),
                stream: Mutex::new(None),
                handle: Mutex::new(None),
                outbound_tx,
                outbound_rx,
                current: Mutex::new(None),
                next_message_id: AtomicU64::new(1),
                bytes_sent: AtomicU64::new(0),
                bytes_received: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SocketState {
        *self.inner.state.lock()
    }

    /// Block the calling thread until the state satisfies `pred`, or until
    /// `timeout` elapses. Intended for synchronous test/shutdown code, not
    /// the reactor hot path.
    pub fn wait_state<F: Fn(SocketState) -> bool>(&self, pred: F, timeout: Duration) -> bool {
        let mut state = self.inner.state.lock();
        if pred(*state) {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return pred(*state);
            }
            let result = self.inner.state_changed.wait_for(&mut state, remaining);
            if pred(*state) || result.timed_out() {
                return pred(*state);
            }
        }
    }

    /// Resolve (numeric literal first, then name lookup) and issue a
    /// non-blocking connect. Fails synchronously only for a state conflict;
    /// resolution/connect failures are reported asynchronously via
    /// `SocketObserver::on_connect_result`.
    pub fn connect(&self) -> Result<(), SocketError> {
        {
            let mut state = self.inner.state.lock();
            if *state != SocketState::Disconnected {
                return Err(SocketError::AlreadyConnecting);
            }
            *state = SocketState::Connecting;
            self.inner.state_changed.notify_all();
        }

        if let Ok(ip) = self.inner.host.parse::<std::net::IpAddr>() {
            let addr = SocketAddr::new(ip, self.inner.port);
            start_connect(self.inner.clone(), addr);
            return Ok(());
        }

        let inner = self.inner.clone();
        std::thread::Builder::new()
            .name("relay-net-resolve".into())
            .spawn(move || match resolve(&inner.host, inner.port) {
                Some(addr) => start_connect(inner, addr),
                None => fail_connect(&inner, ConnectResult::HostUnknown),
            })
            .expect("failed to spawn resolver thread");
        Ok(())
    }

    /// Enqueue one message for transmission. Returns `false` if the bounded
    /// queue is full (backpressure — retry later) or the socket is not in a
    /// writable state.
    pub fn write(&self, data: Vec<u8>) -> bool {
        if !self.state().accepts_writes() {
            return false;
        }
        let id = self.inner.next_message_id.fetch_add(1, Ordering::Relaxed);
        match self.inner.outbound_tx.try_send(Outbound { id, data }) {
            Ok(()) => {
                self.kick_write();
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Transition to `Disconnecting`; the connection tears down once the
    /// queue and any partial send drain.
    pub fn request_close(&self) {
        let mut state = self.inner.state.lock();
        if *state == SocketState::Connected {
            *state = SocketState::Disconnecting;
            self.inner.state_changed.notify_all();
            drop(state);
            self.kick_write();
        }
    }

    /// Synchronous teardown: unregister from the reactor and drop the fd.
    pub fn close(&self) {
        teardown(&self.inner);
    }

    fn kick_write(&self) {
        if let Some(handle) = *self.inner.handle.lock() {
            let _ = self.inner.reactor.rearm(handle, Interest::READABLE | Interest::WRITABLE);
            self.inner.reactor.wake();
        }
    }
}

fn resolve(host: &str, port: u16) -> Option<SocketAddr> {
    (host, port).to_socket_addrs().ok()?.next()
}

fn start_connect(inner: Arc<Inner>, addr: SocketAddr) {
    let stream = match mio::net::TcpStream::connect(addr) {
        Ok(s) => s,
        Err(_) => {
            fail_connect(&inner, ConnectResult::CouldNotConnect);
            return;
        }
    };
    let fd = stream.as_raw_fd();
    *inner.stream.lock() = Some(stream);

    match inner.reactor.register(fd, FdKind::Socket, Interest::WRITABLE, inner.clone()) {
        Ok(handle) => {
            *inner.handle.lock() = Some(handle);
            spawn_connect_timeout_watcher(inner);
        }
        Err(_) => fail_connect(&inner, ConnectResult::CouldNotConnect),
    }
}

/// Fails the attempt with `ConnectResult::Timeout` if it's still
/// `Connecting` once `CONNECT_TIMEOUT` elapses. A no-op if the connection
/// already succeeded or failed by then.
fn spawn_connect_timeout_watcher(inner: Arc<Inner>) {
    std::thread::Builder::new()
        .name("relay-net-connect-timeout".into())
        .spawn(move || {
            std::thread::sleep(CONNECT_TIMEOUT);
            let mut state = inner.state.lock();
            if *state != SocketState::Connecting {
                return;
            }
            *state = SocketState::Disconnected;
            inner.state_changed.notify_all();
            drop(state);
            if let Some(handle) = inner.handle.lock().take() {
                let _ = inner.reactor.unregister(handle);
            }
            inner.stream.lock().take();
            inner.observer.on_connect_result(ConnectResult::Timeout);
        })
        .expect("failed to spawn connect-timeout watcher thread");
}

fn fail_connect(inner: &Arc<Inner>, result: ConnectResult) {
    *inner.state.lock() = SocketState::Disconnected;
    inner.state_changed.notify_all();
    inner.observer.on_connect_result(result);
}

fn teardown(inner: &Arc<Inner>) {
    if let Some(handle) = inner.handle.lock().take() {
        let _ = inner.reactor.unregister(handle);
    }
    inner.stream.lock().take();
    let mut state = inner.state.lock();
    let was_connected = *state != SocketState::Disconnected;
    *state = SocketState::Disconnected;
    inner.state_changed.notify_all();
    drop(state);
    if was_connected {
        inner.observer.on_disconnected();
    }
}

impl EventHandler for Inner {
    fn on_ready(&self, readable: bool, writable: bool) -> Rearm {
        let state = *self.state.lock();
        match state {
            SocketState::Connecting => on_connecting_ready(self, writable),
            SocketState::Connected | SocketState::Disconnecting => on_connected_ready(self, readable, writable),
            SocketState::Disconnected => Rearm::Manual,
        }
    }
}

fn on_connecting_ready(inner: &Inner, writable: bool) -> Rearm {
    if !writable {
        return Rearm::With(Interest::WRITABLE);
    }
    let so_error = {
        let guard = inner.stream.lock();
        match guard.as_ref() {
            Some(stream) => stream.take_error(),
            None => return Rearm::Manual,
        }
    };
    match so_error {
        Ok(None) => {
            *inner.state.lock() = SocketState::Connected;
            inner.state_changed.notify_all();
            inner.observer.on_connect_result(ConnectResult::Success);
            let has_pending = !inner.outbound_rx.is_empty() || inner.current.lock().is_some();
            if has_pending {
                Rearm::With(Interest::READABLE | Interest::WRITABLE)
            } else {
                Rearm::With(Interest::READABLE)
            }
        }
        _ => {
            *inner.state.lock() = SocketState::Disconnected;
            inner.state_changed.notify_all();
            inner.observer.on_connect_result(ConnectResult::CouldNotConnect);
            Rearm::Manual
        }
    }
}

fn on_connected_ready(inner: &Inner, readable: bool, writable: bool) -> Rearm {
    let mut disconnected = false;

    if readable {
        disconnected |= drive_read(inner);
    }

    let mut queue_has_more = false;
    if !disconnected && writable {
        let (done, should_disconnect) = drive_write(inner);
        queue_has_more = !done;
        disconnected |= should_disconnect;
    } else if !disconnected {
        queue_has_more = !inner.outbound_rx.is_empty() || inner.current.lock().is_some();
    }

    if disconnected {
        teardown_from_callback(inner);
        return Rearm::Manual;
    }

    if *inner.state.lock() == SocketState::Disconnecting && !queue_has_more {
        teardown_from_callback(inner);
        return Rearm::Manual;
    }

    if queue_has_more {
        Rearm::With(Interest::READABLE | Interest::WRITABLE)
    } else {
        Rearm::With(Interest::READABLE)
    }
}

/// Returns `true` if the peer closed or the connection errored.
fn drive_read(inner: &Inner) -> bool {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let mut guard = inner.stream.lock();
        let stream = match guard.as_mut() {
            Some(s) => s,
            None => return true,
        };
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(n) => {
                drop(guard);
                inner.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                inner.observer.on_data(&buf[..n]);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return true,
        }
    }
}

/// Returns `(queue_and_current_drained, should_disconnect)`.
fn drive_write(inner: &Inner) -> (bool, bool) {
    loop {
        {
            let mut current = inner.current.lock();
            if current.is_none() {
                match inner.outbound_rx.try_recv() {
                    Ok(msg) => *current = Some(Current { id: msg.id, data: msg.data, offset: 0 }),
                    Err(_) => return (true, false),
                }
            }
        }

        let mut current_guard = inner.current.lock();
        let current = current_guard.as_mut().expect("current just populated");
        let mut stream_guard = inner.stream.lock();
        let stream = match stream_guard.as_mut() {
            Some(s) => s,
            None => return (true, true),
        };

        match stream.write(&current.data[current.offset..]) {
            Ok(0) => {
                drop(stream_guard);
                let id = current.id;
                *current_guard = None;
                drop(current_guard);
                inner.observer.on_write_result(id, 0, false);
                return (false, true);
            }
            Ok(n) => {
                inner.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                current.offset += n;
                let complete = current.offset >= current.data.len();
                drop(stream_guard);
                if complete {
                    let id = current.id;
                    let total = current.data.len();
                    *current_guard = None;
                    drop(current_guard);
                    inner.observer.on_write_result(id, total, true);
                    // loop around to pipeline the next queued message
                } else {
                    return (false, false);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return (false, false),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                drop(stream_guard);
                let id = current.id;
                *current_guard = None;
                drop(current_guard);
                inner.observer.on_write_result(id, 0, false);
                return (false, true);
            }
            Err(_) => {
                drop(stream_guard);
                let id = current.id;
                *current_guard = None;
                drop(current_guard);
                inner.observer.on_write_result(id, 0, false);
                return (false, true);
            }
        }
    }
}

fn teardown_from_callback(inner: &Inner) {
    if let Some(handle) = inner.handle.lock().take() {
        let _ = inner.reactor.unregister(handle);
    }
    inner.stream.lock().take();
    *inner.state.lock() = SocketState::Disconnected;
    inner.state_changed.notify_all();
    inner.observer.on_disconnected();
}
