use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_reactor::Reactor;
use relay_server::listener::ServerListener;
use relay_server::routes::default_router;

#[test]
fn healthz_endpoint_responds_ok() {
    let (reactor, _panics) = Reactor::new(2).unwrap();
    let reactor = Arc::new(reactor);
    let router = Arc::new(default_router());

    let addr = "127.0.0.1:0".parse().unwrap();
    let listener = ServerListener::bind(addr, reactor.clone(), router).unwrap();
    let bound = listener.local_addr();

    let mut stream = connect_with_retry(bound);
    stream.write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200"), "unexpected response: {text}");
    assert!(text.ends_with("ok"), "unexpected body: {text}");

    reactor.shutdown();
}

fn connect_with_retry(addr: std::net::SocketAddr) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("failed to connect: {e}"),
        }
    }
}
