use std::sync::Arc;

use parking_lot::Mutex;

/// Where a `RestConnection` writes rendered response bytes. Implemented by
/// whatever owns the underlying transport (the server binary's per-socket
/// write queue); keeps the router free of any transport-specific type.
pub trait ResponseSink: Send + Sync {
    fn send_bytes(&self, bytes: &[u8]);
    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Open,
    Headered,
    Streaming,
    Closed,
}

/// Capability handed to a handler to emit exactly one response: either a
/// single `send_response` call (Open -> Closed), or a streamed
/// `send_http_response_header` followed by zero or more `send_payload`
/// calls and a terminal `finish_response` (Open -> Headered -> Streaming*
/// -> Closed). Calls made after `Closed` are no-ops.
pub struct RestConnection {
    sink: Arc<dyn ResponseSink>,
    state: Mutex<ConnState>,
    chunked: Mutex<bool>,
}

impl RestConnection {
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self { sink, state: Mutex::new(ConnState::Open), chunked: Mutex::new(false) }
    }

    pub fn response_sent(&self) -> bool {
        *self.state.lock() == ConnState::Closed
    }

    /// One-shot response: status line, a `Content-Type`/`Content-Length`
    /// pair, and the full body in a single write.
    pub fn send_response(&self, status: u16, body: &[u8], media_type: &str) {
        self.send_response_with_headers(status, body, media_type, &[]);
    }

    pub fn send_response_with_headers(&self, status: u16, body: &[u8], media_type: &str, extra_headers: &[(String, String)]) {
        let mut state = self.state.lock();
        if *state != ConnState::Open {
            tracing::warn!(?state, status, "send_response called outside Open state, ignoring");
            return;
        }
        let mut head = format!(
            "HTTP/1.1 {status} {}\r\nContent-Type: {media_type}\r\nContent-Length: {}\r\n",
            reason_phrase(status),
            body.len()
        );
        for (name, value) in extra_headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        self.sink.send_bytes(head.as_bytes());
        if !body.is_empty() {
            self.sink.send_bytes(body);
        }
        *state = ConnState::Closed;
    }

    /// Begin a streamed response. `content_length` of `None` switches the
    /// body to chunked transfer encoding.
    pub fn send_http_response_header(
        &self,
        status: u16,
        media_type: &str,
        content_length: Option<usize>,
        headers: &[(String, String)],
    ) {
        let mut state = self.state.lock();
        if *state != ConnState::Open {
            tracing::warn!(?state, status, "send_http_response_header called outside Open state, ignoring");
            return;
        }
        let mut head = format!("HTTP/1.1 {status} {}\r\nContent-Type: {media_type}\r\n", reason_phrase(status));
        let is_chunked = content_length.is_none();
        match content_length {
            Some(len) => head.push_str(&format!("Content-Length: {len}\r\n")),
            None => head.push_str("Transfer-Encoding: chunked\r\n"),
        }
        for (name, value) in headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        self.sink.send_bytes(head.as_bytes());
        *self.chunked.lock() = is_chunked;
        *state = ConnState::Headered;
    }

    pub fn send_payload(&self, bytes: &[u8]) {
        let mut state = self.state.lock();
        if *state != ConnState::Headered && *state != ConnState::Streaming {
            tracing::warn!(?state, "send_payload called outside Headered/Streaming state, ignoring");
            return;
        }
        if *self.chunked.lock() {
            self.sink.send_bytes(format!("{:x}\r\n", bytes.len()).as_bytes());
            self.sink.send_bytes(bytes);
            self.sink.send_bytes(b"\r\n");
        } else if !bytes.is_empty() {
            self.sink.send_bytes(bytes);
        }
        *state = ConnState::Streaming;
    }

    pub fn finish_response(&self) {
        let mut state = self.state.lock();
        if *state != ConnState::Headered && *state != ConnState::Streaming {
            return;
        }
        if *self.chunked.lock() {
            self.sink.send_bytes(b"0\r\n\r\n");
        }
        *state = ConnState::Closed;
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Capture(StdMutex<Vec<u8>>);
    impl ResponseSink for Capture {
        fn send_bytes(&self, bytes: &[u8]) {
            self.0.lock().unwrap().extend_from_slice(bytes);
        }
        fn close(&self) {}
    }

    #[test]
    fn one_shot_response_closes_after_one_call() {
        let sink = Arc::new(Capture(StdMutex::new(Vec::new())));
        let conn = RestConnection::new(sink.clone());
        conn.send_response(200, b"hi", "text/plain");
        assert!(conn.response_sent());
        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("hi"));

        // Further calls are no-ops.
        conn.send_response(200, b"again", "text/plain");
        let text2 = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, text2);
    }

    #[test]
    fn streaming_response_uses_chunked_encoding_without_content_length() {
        let sink = Arc::new(Capture(StdMutex::new(Vec::new())));
        let conn = RestConnection::new(sink.clone());
        conn.send_http_response_header(200, "text/plain", None, &[]);
        conn.send_payload(b"abc");
        conn.send_payload(b"de");
        conn.finish_response();
        assert!(conn.response_sent());
        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(text.contains("3\r\nabc\r\n"));
        assert!(text.contains("2\r\nde\r\n"));
        assert!(text.ends_with("0\r\n\r\n"));
    }
}
