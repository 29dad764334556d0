use std::sync::Arc;

use parking_lot::Mutex;
use relay_net::{ConnectResult, SocketError, SocketObserver, TcpClientSocket};
use relay_reactor::Reactor;

use crate::error::ParseError;
use crate::parser::{ParseEvent, Parser, Role};
use crate::request::{HttpRequest, RequestCallbacks};

/// Lifecycle events for the connection itself, independent of any single
/// request flowing over it.
pub trait ConnectionObserver: Send + Sync {
    fn on_connected(&self) {}
    fn on_connect_failed(&self, _result: ConnectResult) {}
    fn on_disconnected(&self) {}
}

struct NoopConnectionObserver;
impl ConnectionObserver for NoopConnectionObserver {}

struct Exchange {
    callbacks: Arc<dyn RequestCallbacks>,
    parser: Parser,
}

struct Inner {
    socket: Mutex<Option<TcpClientSocket>>,
    observer: Arc<dyn ConnectionObserver>,
    current: Mutex<Option<Exchange>>,
}

/// One persistent HTTP/1.1 connection: Idle while no request is in flight,
/// implicitly Headers-then-Body internally (tracked by the parser's own
/// stage) while a response streams in, back to Idle once the parser emits
/// `Done`. Built on one [`TcpClientSocket`] and one [`Parser`].
pub struct HttpConnection {
    inner: Arc<Inner>,
}

/// Returned by [`HttpConnection::send`] when a request cannot be started.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("a request is already in flight on this connection")]
    Busy,
    #[error("connection is not writable")]
    NotConnected,
}

impl HttpConnection {
    pub fn new(reactor: Arc<Reactor>, host: impl Into<String>, port: u16, queue_capacity: usize) -> Self {
        Self::with_observer(reactor, host, port, queue_capacity, Arc::new(NoopConnectionObserver))
    }

    pub fn with_observer(
        reactor: Arc<Reactor>,
        host: impl Into<String>,
        port: u16,
        queue_capacity: usize,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Self {
        let inner = Arc::new(Inner {
            socket: Mutex::new(None),
            observer,
            current: Mutex::new(None),
        });
        let socket = TcpClientSocket::new(reactor, host, port, queue_capacity, inner.clone());
        *inner.socket.lock() = Some(socket);
        Self { inner }
    }

    pub fn connect(&self) -> Result<(), SocketError> {
        self.inner.socket.lock().as_ref().expect("socket set in new").connect()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.current.lock().is_some()
    }

    /// Serialize and write `request`, registering its callbacks to receive
    /// the response. Fails immediately if another request is already in
    /// flight; a connection handles exactly one exchange at a time (it is
    /// the pool's job to multiplex across several connections).
    pub fn send(&self, request: HttpRequest) -> Result<(), SendError> {
        let mut current = self.inner.current.lock();
        if current.is_some() {
            return Err(SendError::Busy);
        }
        let head = request.method.eq_ignore_ascii_case("HEAD");
        let callbacks = request.callbacks.clone();
        let bytes = request.serialize();

        let accepted = self
            .inner
            .socket
            .lock()
            .as_ref()
            .map(|s| s.write(bytes))
            .unwrap_or(false);
        if !accepted {
            return Err(SendError::NotConnected);
        }

        let mut parser = Parser::new(Role::Response);
        parser.set_expect_body(!head);
        *current = Some(Exchange { callbacks, parser });
        Ok(())
    }

    pub fn close(&self) {
        if let Some(socket) = self.inner.socket.lock().as_ref() {
            socket.close();
        }
    }
}

impl SocketObserver for Inner {
    fn on_connect_result(&self, result: ConnectResult) {
        if result == ConnectResult::Success {
            self.observer.on_connected();
        } else {
            self.observer.on_connect_failed(result);
        }
    }

    fn on_data(&self, bytes: &[u8]) {
        let mut guard = self.current.lock();
        let Some(exchange) = guard.as_mut() else {
            return;
        };
        let callbacks = exchange.callbacks.clone();
        let mut finished = false;
        let mut must_close = false;
        let mut sink = |event: ParseEvent<'_>| match event {
            ParseEvent::ResponseStart { version, code } => callbacks.on_status(version, code),
            ParseEvent::RequestStart { .. } => {}
            ParseEvent::Header { name, value } => callbacks.on_header(name, value),
            ParseEvent::Data(chunk) => callbacks.on_body_chunk(chunk),
            ParseEvent::Done(Ok(())) => {
                callbacks.on_complete();
                finished = true;
            }
            ParseEvent::Done(Err(e)) => {
                callbacks.on_error(&e.to_string());
                finished = true;
                must_close = true;
            }
        };
        exchange.parser.feed(bytes, &mut sink);
        if finished {
            must_close = must_close || exchange.parser.require_close();
            *guard = None;
            if must_close {
                drop(guard);
                if let Some(socket) = self.socket.lock().as_ref() {
                    socket.close();
                }
            }
        }
    }

    fn on_disconnected(&self) {
        if let Some(exchange) = self.current.lock().take() {
            exchange.callbacks.on_error(&ParseError::UnexpectedEof.to_string());
        }
        self.observer.on_disconnected();
    }
}
