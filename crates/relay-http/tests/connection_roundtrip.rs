use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_http::{HttpConnection, HttpRequest, RequestCallbacks};
use relay_reactor::Reactor;

struct Capture {
    status: AtomicU16,
    body: parking_lot::Mutex<Vec<u8>>,
    done: AtomicBool,
}

impl RequestCallbacks for Capture {
    fn on_status(&self, _version: &str, code: u16) {
        self.status.store(code, Ordering::SeqCst);
    }
    fn on_body_chunk(&self, bytes: &[u8]) {
        self.body.lock().extend_from_slice(bytes);
    }
    fn on_complete(&self) {
        self.done.store(true, Ordering::SeqCst);
    }
}

#[test]
fn round_trips_a_get_request() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf).unwrap();
        let request = String::from_utf8_lossy(&buf[..n]);
        assert!(request.starts_with("GET /ping HTTP/1.1\r\n"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .unwrap();
    });

    let (reactor, _panics) = Reactor::new(1).unwrap();
    let reactor = Arc::new(reactor);
    let conn = HttpConnection::new(reactor.clone(), addr.ip().to_string(), addr.port(), 8);
    conn.connect().unwrap();

    let capture = Arc::new(Capture {
        status: AtomicU16::new(0),
        body: parking_lot::Mutex::new(Vec::new()),
        done: AtomicBool::new(false),
    });
    let request = HttpRequest::new("GET", addr.ip().to_string(), addr.port(), "/ping")
        .with_callbacks(capture.clone());

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        if conn.send(request_clone(&request)).is_ok() {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "timed out waiting to connect");
        std::thread::sleep(Duration::from_millis(5));
    }

    while !capture.done.load(Ordering::SeqCst) {
        assert!(std::time::Instant::now() < deadline, "timed out waiting for response");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(capture.status.load(Ordering::SeqCst), 200);
    assert_eq!(&*capture.body.lock(), b"ok");

    server.join().unwrap();
    conn.close();
    reactor.shutdown();
}

// `HttpRequest` is consumed by `send`, and the retry loop above may need to
// attempt it more than once while the connection finishes establishing.
fn request_clone(req: &HttpRequest) -> HttpRequest {
    HttpRequest {
        method: req.method.clone(),
        host: req.host.clone(),
        port: req.port,
        path: req.path.clone(),
        headers: req.headers.clone(),
        body: req.body.clone(),
        content_type: req.content_type.clone(),
        deadline: req.deadline,
        callbacks: req.callbacks.clone(),
    }
}
