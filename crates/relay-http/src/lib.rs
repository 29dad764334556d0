//! Streaming HTTP/1.1 request/response parsing and a connection that drives
//! one parser over one `relay-net` socket.

mod connection;
mod error;
mod parser;
mod request;

pub use connection::{ConnectionObserver, HttpConnection, SendError};
pub use error::ParseError;
pub use parser::{ParseEvent, Parser, ParserSink, Role};
pub use request::{HeaderList, HttpRequest, RequestCallbacks};

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self { events: RefCell::new(Vec::new()) }
        }
    }

    impl ParserSink for &Recorder {
        fn on_event(&mut self, event: ParseEvent<'_>) {
            let mut events = self.events.borrow_mut();
            match event {
                ParseEvent::RequestStart { method, target, version } => {
                    events.push(format!("request-start {method} {target} {version}"))
                }
                ParseEvent::ResponseStart { version, code } => {
                    events.push(format!("response-start {version} {code}"))
                }
                ParseEvent::Header { name, value } => events.push(format!("header {name}={value}")),
                ParseEvent::Data(bytes) => {
                    events.push(format!("data {}", String::from_utf8_lossy(bytes)))
                }
                ParseEvent::Done(result) => events.push(format!("done {result:?}")),
            }
        }
    }

    #[test]
    fn parses_sized_response_in_one_shot() {
        let recorder = Recorder::new();
        let mut parser = Parser::new(Role::Response);
        let mut sink = &recorder;
        parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello", &mut sink);
        let events = recorder.events.borrow();
        assert_eq!(events[0], "response-start HTTP/1.1 200");
        assert_eq!(events[1], "header Content-Length=5");
        assert_eq!(events[2], "data hello");
        assert_eq!(events[3], "done Ok(())");
    }

    #[test]
    fn parses_sized_response_byte_at_a_time() {
        let recorder = Recorder::new();
        let mut parser = Parser::new(Role::Response);
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        for byte in raw {
            let mut sink = &recorder;
            parser.feed(std::slice::from_ref(byte), &mut sink);
        }
        let events = recorder.events.borrow();
        assert_eq!(events[0], "response-start HTTP/1.1 200");
        assert!(events.iter().any(|e| e == "data hello" || e.starts_with("data ")));
        assert_eq!(*events.last().unwrap(), "done Ok(())");
    }

    #[test]
    fn parses_chunked_response() {
        let recorder = Recorder::new();
        let mut parser = Parser::new(Role::Response);
        let mut sink = &recorder;
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        parser.feed(raw, &mut sink);
        let events = recorder.events.borrow();
        let data: String = events
            .iter()
            .filter_map(|e| e.strip_prefix("data "))
            .collect();
        assert_eq!(data, "Wikipedia");
        assert_eq!(*events.last().unwrap(), "done Ok(())");
    }

    #[test]
    fn conflicting_framing_is_rejected() {
        let recorder = Recorder::new();
        let mut parser = Parser::new(Role::Response);
        let mut sink = &recorder;
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n";
        parser.feed(raw, &mut sink);
        let events = recorder.events.borrow();
        assert_eq!(
            *events.last().unwrap(),
            format!("done Err({:?})", ParseError::ConflictingFraming)
        );
    }

    #[test]
    fn head_response_has_no_body_even_with_content_length() {
        let recorder = Recorder::new();
        let mut parser = Parser::new(Role::Response);
        parser.set_expect_body(false);
        let mut sink = &recorder;
        parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n", &mut sink);
        let events = recorder.events.borrow();
        assert!(!events.iter().any(|e| e.starts_with("data ")));
        assert_eq!(*events.last().unwrap(), "done Ok(())");
    }

    #[test]
    fn request_line_parses() {
        let recorder = Recorder::new();
        let mut parser = Parser::new(Role::Request);
        let mut sink = &recorder;
        parser.feed(b"GET /things HTTP/1.1\r\nHost: example.com\r\n\r\n", &mut sink);
        let events = recorder.events.borrow();
        assert_eq!(events[0], "request-start GET /things HTTP/1.1");
        assert_eq!(*events.last().unwrap(), "done Ok(())");
    }

    #[test]
    fn until_close_framing_completes_on_eof() {
        let recorder = Recorder::new();
        let mut parser = Parser::new(Role::Response);
        let mut sink = &recorder;
        parser.feed(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nsome body", &mut sink);
        assert!(!recorder.events.borrow().iter().any(|e| e.starts_with("done")));
        parser.notify_eof(&mut sink);
        let events = recorder.events.borrow();
        assert_eq!(*events.last().unwrap(), "done Ok(())");
    }

    #[test]
    fn http_request_serializes_with_synthesized_headers() {
        let req = HttpRequest::new("GET", "example.com", 80, "/foo");
        let bytes = req.serialize();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("GET /foo HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn http_request_with_body_sets_content_length() {
        let req = HttpRequest::new("POST", "example.com", 80, "/foo").with_body(b"abc".to_vec(), "text/plain");
        let text = String::from_utf8(req.serialize()).unwrap();
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.ends_with("abc"));
    }
}
