//! Bounded pool of persistent HTTP connections to a single upstream host,
//! built on `relay-http`'s connections and `relay-reactor`'s event loop.

mod error;
mod pool;

pub use error::PoolError;
pub use pool::HttpPool;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use relay_http::{HttpRequest, RequestCallbacks};
    use relay_reactor::Reactor;

    struct CountingCallbacks {
        completed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl RequestCallbacks for CountingCallbacks {
        fn on_complete(&self) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _message: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spawn_echo_server(responses: usize) -> (std::net::SocketAddr, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            for _ in 0..responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).unwrap();
                stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                    .unwrap();
            }
        });
        (addr, handle)
    }

    #[test]
    fn dispatches_more_requests_than_connections_via_overflow() {
        let connections = 2;
        let requests = 5;
        let (addr, server) = spawn_echo_server(requests);

        let (reactor, _panics) = Reactor::new(2).unwrap();
        let reactor = Arc::new(reactor);
        let pool = HttpPool::new(reactor.clone(), addr.ip().to_string(), addr.port(), connections, 8, 16);

        let callbacks = Arc::new(CountingCallbacks { completed: AtomicUsize::new(0), failed: AtomicUsize::new(0) });

        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        let mut submitted = 0;
        while submitted < requests {
            let request = HttpRequest::new("GET", addr.ip().to_string(), addr.port(), "/x")
                .with_callbacks(callbacks.clone());
            if pool.enqueue_request(request) {
                submitted += 1;
            }
            assert!(std::time::Instant::now() < deadline, "timed out submitting requests");
        }

        while callbacks.completed.load(Ordering::SeqCst) < requests {
            assert!(std::time::Instant::now() < deadline, "timed out waiting for completion");
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(callbacks.failed.load(Ordering::SeqCst), 0);
        server.join().unwrap();
        pool.shutdown();
        reactor.shutdown();
    }

    #[test]
    fn overflow_beyond_queue_capacity_is_rejected() {
        let (reactor, _panics) = Reactor::new(1).unwrap();
        let reactor = Arc::new(reactor);
        // One connection, zero queue slots: the first request occupies the
        // only connection; the next has nowhere to go.
        let pool = HttpPool::new(reactor.clone(), "127.0.0.1", 1, 1, 4, 1);
        let callbacks = Arc::new(CountingCallbacks { completed: AtomicUsize::new(0), failed: AtomicUsize::new(0) });

        let first = HttpRequest::new("GET", "127.0.0.1", 1, "/a").with_callbacks(callbacks.clone());
        assert!(pool.enqueue_request(first));
        let second = HttpRequest::new("GET", "127.0.0.1", 1, "/b").with_callbacks(callbacks.clone());
        assert!(pool.enqueue_request(second));
        let third = HttpRequest::new("GET", "127.0.0.1", 1, "/c").with_callbacks(callbacks.clone());
        assert!(!pool.enqueue_request(third));

        pool.shutdown();
        reactor.shutdown();
    }
}
