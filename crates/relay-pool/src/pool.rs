use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relay_http::{HttpConnection, HttpRequest, RequestCallbacks};
use relay_reactor::Reactor;

struct State {
    /// Stack (LIFO) of indices into `connections` that are currently idle.
    idle: Vec<usize>,
    overflow: VecDeque<HttpRequest>,
}

struct Inner {
    connections: Vec<HttpConnection>,
    state: Mutex<State>,
    queue_capacity: usize,
}

/// Multiplexes a bounded queue of outbound requests over `pool_size`
/// persistent connections to one upstream host. Pipelining is not
/// supported: each connection carries at most one outstanding request at a
/// time, matching the one-exchange-per-connection contract of
/// [`HttpConnection`].
pub struct HttpPool {
    inner: Arc<Inner>,
}

impl HttpPool {
    pub fn new(
        reactor: Arc<Reactor>,
        host: impl Into<String>,
        port: u16,
        pool_size: usize,
        per_connection_queue_capacity: usize,
        queue_capacity: usize,
    ) -> Self {
        let host = host.into();
        let pool_size = pool_size.max(1);
        let connections: Vec<HttpConnection> = (0..pool_size)
            .map(|_| HttpConnection::new(reactor.clone(), host.clone(), port, per_connection_queue_capacity))
            .collect();
        for conn in &connections {
            // Connect errors surface later as on_error on the first request
            // routed to that connection; the pool does not treat a failed
            // initial connect as fatal to pool construction.
            let _ = conn.connect();
        }
        Self {
            inner: Arc::new(Inner {
                connections,
                state: Mutex::new(State { idle: (0..pool_size).collect(), overflow: VecDeque::new() }),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Returns `false` (request rejected, caller must retry or fail it) if
    /// every connection is busy and the overflow list is already at
    /// capacity.
    pub fn enqueue_request(&self, request: HttpRequest) -> bool {
        let mut state = self.inner.state.lock();
        if let Some(idx) = state.idle.pop() {
            drop(state);
            tracing::debug!(conn = idx, "dispatching request to idle connection");
            self.dispatch(idx, request);
            true
        } else if state.overflow.len() < self.inner.queue_capacity {
            state.overflow.push_back(request);
            tracing::debug!(queued = state.overflow.len(), "no idle connection, queued request");
            true
        } else {
            tracing::debug!("request rejected, pool and overflow queue both full");
            false
        }
    }

    fn dispatch(&self, idx: usize, request: HttpRequest) {
        let deadline = request.deadline;
        let user_callbacks = request.callbacks.clone();
        let reported = Arc::new(AtomicBool::new(false));
        let wrapped = Arc::new(PoolCallbacks {
            inner: user_callbacks.clone(),
            pool: self.inner.clone(),
            index: idx,
            reported: reported.clone(),
        });

        if let Some(deadline) = deadline {
            spawn_deadline_watcher(self.inner.clone(), idx, deadline, reported.clone(), user_callbacks.clone());
        }

        let request = HttpRequest {
            method: request.method,
            host: request.host,
            port: request.port,
            path: request.path,
            headers: request.headers,
            body: request.body,
            content_type: request.content_type,
            deadline: request.deadline,
            callbacks: wrapped,
        };

        if self.inner.connections[idx].send(request).is_err() {
            // Connection wasn't ready to accept a request (e.g. still
            // connecting or mid-teardown); report failure directly since
            // `wrapped` never reached the socket layer to report it itself,
            // then free the slot through the same path a normal completion
            // would.
            reported.store(true, Ordering::SeqCst);
            user_callbacks.on_error("connection unavailable");
            self.inner.connections[idx].close();
            self.on_connection_freed(idx);
        }
    }

    fn on_connection_freed(&self, idx: usize) {
        let mut state = self.inner.state.lock();
        if let Some(next) = state.overflow.pop_front() {
            drop(state);
            self.dispatch(idx, next);
        } else {
            state.idle.push(idx);
        }
    }

    /// Closes every connection and fails every request still waiting in the
    /// overflow list. In-flight requests are not cancelled; they complete
    /// normally or fail when their connection tears down.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        while let Some(request) = state.overflow.pop_front() {
            request.callbacks.on_error("pool is shutting down");
        }
        drop(state);
        for conn in &self.inner.connections {
            conn.close();
        }
    }
}

struct PoolCallbacks {
    inner: Arc<dyn RequestCallbacks>,
    pool: Arc<Inner>,
    index: usize,
    reported: Arc<AtomicBool>,
}

impl PoolCallbacks {
    fn free_once(&self) {
        if !self.reported.swap(true, Ordering::SeqCst) {
            let pool = HttpPool { inner: self.pool.clone() };
            pool.on_connection_freed(self.index);
        }
    }
}

impl RequestCallbacks for PoolCallbacks {
    fn on_status(&self, version: &str, code: u16) {
        self.inner.on_status(version, code);
    }
    fn on_header(&self, name: &str, value: &str) {
        self.inner.on_header(name, value);
    }
    fn on_body_chunk(&self, bytes: &[u8]) {
        self.inner.on_body_chunk(bytes);
    }
    fn on_complete(&self) {
        self.inner.on_complete();
        self.free_once();
    }
    fn on_error(&self, message: &str) {
        self.inner.on_error(message);
        self.free_once();
    }
}

/// The Reactor's timer API is periodic-only (one `timerfd` per registered
/// callback); a per-request one-shot deadline is cheaper as a dedicated
/// sleeping thread than as a reactor registration that must be torn down
/// after its first tick regardless of outcome.
fn spawn_deadline_watcher(
    pool: Arc<Inner>,
    idx: usize,
    deadline: Duration,
    reported: Arc<AtomicBool>,
    callbacks: Arc<dyn RequestCallbacks>,
) {
    std::thread::Builder::new()
        .name("relay-pool-deadline".into())
        .spawn(move || {
            std::thread::sleep(deadline);
            if !reported.swap(true, Ordering::SeqCst) {
                callbacks.on_error("request deadline expired");
                pool.connections[idx].close();
                let pool = HttpPool { inner: pool };
                pool.on_connection_freed(idx);
            }
        })
        .expect("failed to spawn deadline watcher thread");
}
