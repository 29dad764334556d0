use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use mio::net::TcpStream;
use mio::Interest;
use parking_lot::Mutex;

use relay_http::{HeaderList, ParseEvent, Parser, ParserSink, Role};
use relay_reactor::{EventHandler, FdKind, Handle, Rearm, Reactor};
use relay_router::{split_target, ParsingContext, ResponseSink, RestConnection, Router};

struct PendingRequest {
    method: String,
    target: String,
    headers: HeaderList,
    body: Vec<u8>,
}

/// One accepted connection: a non-blocking stream, the request parser
/// driving it, and an outbound byte buffer drained as the socket allows.
/// Unlike `relay-http`'s client-side `HttpConnection`, this one parses
/// requests rather than responses and is multi-request (keep-alive)
/// capable, since a server connection outlives any single exchange.
pub struct ServerConnection {
    self_weak: Weak<ServerConnection>,
    conn_id: i32,
    stream: Mutex<TcpStream>,
    reactor: Arc<Reactor>,
    router: Arc<Router>,
    parser: Mutex<Parser>,
    pending: Mutex<Option<PendingRequest>>,
    outbound: Mutex<Vec<u8>>,
    handle: Mutex<Option<Handle>>,
    close_after_response: AtomicBool,
}

impl ServerConnection {
    pub fn accept(reactor: Arc<Reactor>, router: Arc<Router>, stream: TcpStream) -> std::io::Result<()> {
        let fd = stream.as_raw_fd();
        let inner = Arc::new_cyclic(|weak| Self {
            self_weak: weak.clone(),
            conn_id: fd,
            stream: Mutex::new(stream),
            reactor: reactor.clone(),
            router,
            parser: Mutex::new(Parser::new(Role::Request)),
            pending: Mutex::new(None),
            outbound: Mutex::new(Vec::new()),
            handle: Mutex::new(None),
            close_after_response: AtomicBool::new(false),
        });
        let handle = reactor.register(fd, FdKind::Socket, Interest::READABLE, inner.clone())?;
        *inner.handle.lock() = Some(handle);
        Ok(())
    }

    /// Reads until `WouldBlock`, feeding bytes to the parser. Returns `true`
    /// if the connection should be torn down (EOF or a read error).
    fn drive_read(&self) -> bool {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let read = self.stream.lock().read(&mut buf);
            match read {
                Ok(0) => {
                    let mut sink = ConnectionDispatch(self);
                    self.parser.lock().notify_eof(&mut sink);
                    return true;
                }
                Ok(n) => {
                    let mut sink = ConnectionDispatch(self);
                    self.parser.lock().feed(&buf[..n], &mut sink);
                    if self.close_after_response.load(Ordering::SeqCst) {
                        return true;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                Err(_) => return true,
            }
        }
    }

    /// Attempt to flush the outbound buffer. Returns `true` once fully
    /// drained (including the trivial case of nothing to send).
    fn drive_write(&self) -> bool {
        let mut out = self.outbound.lock();
        while !out.is_empty() {
            match self.stream.lock().write(&out) {
                Ok(0) => return false,
                Ok(n) => {
                    out.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                Err(_) => {
                    out.clear();
                    return true;
                }
            }
        }
        true
    }

    #[tracing::instrument(name = "server.handle_request", skip(self, headers, body), fields(conn = self.conn_id))]
    fn handle_request(&self, method: String, target: String, headers: HeaderList, body: Vec<u8>) {
        let keep_alive = !headers.get("connection").is_some_and(|v| v.eq_ignore_ascii_case("close"));
        if !keep_alive {
            self.close_after_response.store(true, Ordering::SeqCst);
        }

        let (path, query) = split_target(&target);
        let mut ctx = ParsingContext::new(path);
        let request =
            relay_router::RouteRequest { method: &method, headers: &headers, query: &query, body: &body };
        // `self_weak` is always live here: the connection can't be mid-`on_ready`
        // (and thus mid-`handle_request`) after its own `Arc` has been dropped.
        let conn_arc = self.self_weak.upgrade().expect("connection dropped while handling a request");
        let conn = RestConnection::new(Arc::new(ConnectionSink { conn: conn_arc }) as Arc<dyn ResponseSink>);

        tracing::debug!(method = %method, target = %target, "dispatching request");
        self.router.handle(&mut ctx, &request, &conn);

        // Reset the parser for the next pipelined/keep-alive request.
        *self.parser.lock() = Parser::new(Role::Request);
    }
}

struct ConnectionSink {
    conn: Arc<ServerConnection>,
}

impl ResponseSink for ConnectionSink {
    fn send_bytes(&self, bytes: &[u8]) {
        self.conn.outbound.lock().extend_from_slice(bytes);
    }

    fn close(&self) {
        self.conn.close_after_response.store(true, Ordering::SeqCst);
    }
}

/// Bridges parser events into an in-progress `PendingRequest`, dispatching
/// to the router once the parser reports `Done`.
struct ConnectionDispatch<'a>(&'a ServerConnection);

impl ParserSink for ConnectionDispatch<'_> {
    fn on_event(&mut self, event: ParseEvent<'_>) {
        match event {
            ParseEvent::RequestStart { method, target, version: _ } => {
                *self.0.pending.lock() = Some(PendingRequest {
                    method: method.to_string(),
                    target: target.to_string(),
                    headers: HeaderList::new(),
                    body: Vec::new(),
                });
            }
            ParseEvent::ResponseStart { .. } => unreachable!("server connections only parse requests"),
            ParseEvent::Header { name, value } => {
                if let Some(pending) = self.0.pending.lock().as_mut() {
                    pending.headers.push(name, value);
                }
            }
            ParseEvent::Data(chunk) => {
                if let Some(pending) = self.0.pending.lock().as_mut() {
                    pending.body.extend_from_slice(chunk);
                }
            }
            ParseEvent::Done(Ok(())) => {
                if let Some(pending) = self.0.pending.lock().take() {
                    self.0.handle_request(pending.method, pending.target, pending.headers, pending.body);
                }
            }
            ParseEvent::Done(Err(e)) => {
                tracing::debug!(error = %e, "malformed request, closing connection");
                self.0.close_after_response.store(true, Ordering::SeqCst);
            }
        }
    }
}

impl EventHandler for ServerConnection {
    fn on_ready(&self, readable: bool, writable: bool) -> Rearm {
        if writable {
            self.drive_write();
        }

        let should_close = readable && self.drive_read();
        let flushed = self.drive_write();
        let close_requested = self.close_after_response.load(Ordering::SeqCst);

        if should_close || (close_requested && flushed) {
            if let Some(handle) = self.handle.lock().take() {
                let _ = self.reactor.unregister(handle);
            }
            let _ = self.stream.lock().shutdown(std::net::Shutdown::Both);
            return Rearm::Manual;
        }

        if flushed {
            Rearm::With(Interest::READABLE)
        } else {
            Rearm::With(Interest::READABLE | Interest::WRITABLE)
        }
    }
}
