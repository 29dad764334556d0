use std::sync::Arc;
use std::time::Duration;

/// An ordered, case-insensitive header list. Order is preserved on the wire
/// because some servers are picky about header ordering (and because it
/// makes request logs reproducible).
#[derive(Debug, Clone, Default)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Callbacks invoked over the lifetime of one outbound request. All are
/// optional; a fire-and-forget caller can supply none of them.
pub trait RequestCallbacks: Send + Sync {
    fn on_status(&self, _version: &str, _code: u16) {}
    fn on_header(&self, _name: &str, _value: &str) {}
    fn on_body_chunk(&self, _bytes: &[u8]) {}
    fn on_complete(&self) {}
    fn on_error(&self, _message: &str) {}
}

/// A request queued for delivery. Once [`HttpRequest::serialize`] has been
/// called the instance is considered sent and must not be mutated further;
/// the pool and connection only ever read it after that point.
pub struct HttpRequest {
    pub method: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub headers: HeaderList,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub deadline: Option<Duration>,
    pub callbacks: Arc<dyn RequestCallbacks>,
}

struct NoopCallbacks;
impl RequestCallbacks for NoopCallbacks {}

impl HttpRequest {
    pub fn new(method: impl Into<String>, host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            host: host.into(),
            port,
            path: path.into(),
            headers: HeaderList::new(),
            body: None,
            content_type: None,
            deadline: None,
            callbacks: Arc::new(NoopCallbacks),
        }
    }

    pub fn with_body(mut self, body: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = Some(body);
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn RequestCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Render the request line, headers, and body into one wire buffer.
    /// `Host`, `Content-Length`/`Content-Type`, and `Connection: keep-alive`
    /// are synthesized here unless the caller already supplied them.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.as_ref().map_or(0, |b| b.len()));
        out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", self.method, self.path).as_bytes());

        if !self.headers.contains("host") {
            out.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        }
        if !self.headers.contains("connection") {
            out.extend_from_slice(b"Connection: keep-alive\r\n");
        }
        if let Some(body) = &self.body {
            if !self.headers.contains("content-length") {
                out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
            }
            if let (Some(ct), false) = (&self.content_type, self.headers.contains("content-type")) {
                out.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
            }
        }
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
        out
    }
}
