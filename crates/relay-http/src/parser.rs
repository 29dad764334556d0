use crate::error::ParseError;

/// Events emitted by [`Parser::feed`]. Sharing one event enum (rather than
/// separate request/response parser types) is the single conformant
/// implementation chosen over the source's overlapping response-only and
/// combined parsers.
#[derive(Debug)]
pub enum ParseEvent<'a> {
    RequestStart { method: &'a str, target: &'a str, version: &'a str },
    ResponseStart { version: &'a str, code: u16 },
    Header { name: &'a str, value: &'a str },
    Data(&'a [u8]),
    Done(Result<(), ParseError>),
}

/// Receives parser callbacks. Implemented by whatever owns the parser (an
/// `HttpConnection`, a test harness, ...).
pub trait ParserSink {
    fn on_event(&mut self, event: ParseEvent<'_>);
}

impl<F: FnMut(ParseEvent<'_>)> ParserSink for F {
    fn on_event(&mut self, event: ParseEvent<'_>) {
        (self)(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    FirstLine,
    Headers,
    Body,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    /// Not yet known; determined once headers finish.
    Unknown,
    None,
    Sized,
    Chunked,
    UntilClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkPhase {
    Size,
    Data,
    DataCrlf,
    Trailer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Request,
    Response,
}

/// Incremental HTTP/1.1 parser, shared between request and response framing.
/// `feed` may be called with arbitrarily-sized chunks; feeding the
/// concatenation of several chunks in one call produces the same event
/// sequence as feeding them one at a time.
pub struct Parser {
    role: Role,
    stage: Stage,
    carry: Vec<u8>,
    remaining_body: usize,
    content_length_seen: bool,
    chunked: bool,
    chunk_phase: ChunkPhase,
    chunk_remaining: usize,
    require_close: bool,
    expect_body: bool,
    body_mode: BodyMode,
    failed: bool,
}

impl Parser {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            stage: Stage::FirstLine,
            carry: Vec::new(),
            remaining_body: 0,
            content_length_seen: false,
            chunked: false,
            chunk_phase: ChunkPhase::Size,
            chunk_remaining: 0,
            require_close: false,
            expect_body: true,
            body_mode: BodyMode::Unknown,
            failed: false,
        }
    }

    /// Responses to HEAD requests, and 1xx/204/304 responses, carry no body
    /// regardless of framing headers. Callers set this before `feed`
    /// observes the headers for that response.
    pub fn set_expect_body(&mut self, expect_body: bool) {
        self.expect_body = expect_body;
    }

    pub fn require_close(&self) -> bool {
        self.require_close
    }

    /// Feed the parser bytes arriving off the wire, invoking `sink` for
    /// every event produced. Returns once `data` is exhausted or the parser
    /// reaches a terminal state (`Done`'s event, success or failure).
    pub fn feed(&mut self, mut data: &[u8], sink: &mut dyn ParserSink) {
        if self.failed || self.stage == Stage::Done {
            return;
        }
        loop {
            match self.stage {
                Stage::FirstLine => match take_line(&mut self.carry, &mut data) {
                    None => return,
                    Some(line) => {
                        if let Err(e) = self.parse_first_line(&line, sink) {
                            self.fail(e, sink);
                            return;
                        }
                        self.stage = Stage::Headers;
                    }
                },
                Stage::Headers => match take_line(&mut self.carry, &mut data) {
                    None => return,
                    Some(line) => {
                        if line.is_empty() {
                            if let Err(e) = self.finalize_headers() {
                                self.fail(e, sink);
                                return;
                            }
                            self.stage = Stage::Body;
                            if self.body_mode == BodyMode::None {
                                self.stage = Stage::Done;
                                sink.on_event(ParseEvent::Done(Ok(())));
                                return;
                            }
                        } else if let Err(e) = self.parse_header_line(&line, sink) {
                            self.fail(e, sink);
                            return;
                        }
                    }
                },
                Stage::Body => {
                    if data.is_empty() {
                        return;
                    }
                    match self.consume_body(&mut data, sink) {
                        Ok(true) => return, // finished this feed() call but not done overall
                        Ok(false) => {}     // fall through: stage flipped to Done inside
                        Err(e) => {
                            self.fail(e, sink);
                            return;
                        }
                    }
                    if self.stage == Stage::Done {
                        return;
                    }
                }
                Stage::Done => return,
            }
        }
    }

    /// The transport closed. In `UntilClose` framing this completes the
    /// message successfully; in any other mid-body state it is a failure.
    pub fn notify_eof(&mut self, sink: &mut dyn ParserSink) {
        if self.failed || self.stage == Stage::Done {
            return;
        }
        if self.stage == Stage::Body && self.body_mode == BodyMode::UntilClose {
            self.stage = Stage::Done;
            sink.on_event(ParseEvent::Done(Ok(())));
        } else if self.stage != Stage::FirstLine || !self.carry.is_empty() {
            self.fail(ParseError::UnexpectedEof, sink);
        }
    }

    fn fail(&mut self, e: ParseError, sink: &mut dyn ParserSink) {
        self.failed = true;
        self.stage = Stage::Done;
        sink.on_event(ParseEvent::Done(Err(e)));
    }

    fn parse_first_line(&mut self, line: &[u8], sink: &mut dyn ParserSink) -> Result<(), ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::MalformedStartLine)?;
        match self.role {
            Role::Response => {
                if !line.starts_with("HTTP/") {
                    return Err(ParseError::MalformedStartLine);
                }
                let rest = &line[5..];
                let mut parts = rest.splitn(3, ' ');
                let version = parts.next().ok_or(ParseError::MalformedStartLine)?;
                let code_str = parts.next().ok_or(ParseError::MalformedStartLine)?;
                let code: u16 = code_str.parse().map_err(|_| ParseError::InvalidStatusCode)?;
                // 1xx/204/304 never carry a body regardless of framing headers.
                if matches!(code, 100..=199 | 204 | 304) {
                    self.expect_body = false;
                }
                sink.on_event(ParseEvent::ResponseStart { version: &format!("HTTP/{version}"), code });
                Ok(())
            }
            Role::Request => {
                let mut parts = line.splitn(3, ' ');
                let method = parts.next().ok_or(ParseError::MalformedRequestLine)?;
                let target = parts.next().ok_or(ParseError::MalformedRequestLine)?;
                let version = parts.next().ok_or(ParseError::MalformedRequestLine)?;
                if !version.starts_with("HTTP/") {
                    return Err(ParseError::MalformedRequestLine);
                }
                if method.eq_ignore_ascii_case("HEAD") {
                    self.expect_body = false;
                }
                sink.on_event(ParseEvent::RequestStart { method, target, version });
                Ok(())
            }
        }
    }

    fn parse_header_line(&mut self, line: &[u8], sink: &mut dyn ParserSink) -> Result<(), ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::MalformedHeader)?;
        let colon = line.find(':').ok_or(ParseError::MalformedHeader)?;
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if name.is_empty() {
            return Err(ParseError::MalformedHeader);
        }

        if name.eq_ignore_ascii_case("content-length") {
            let n: usize = value.parse().map_err(|_| ParseError::InvalidContentLength)?;
            self.remaining_body = n;
            self.content_length_seen = true;
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            if value.eq_ignore_ascii_case("chunked") || value.to_ascii_lowercase().contains("chunked") {
                self.chunked = true;
            }
        } else if name.eq_ignore_ascii_case("connection") && value.eq_ignore_ascii_case("close") {
            self.require_close = true;
        }

        sink.on_event(ParseEvent::Header { name, value });
        Ok(())
    }

    fn finalize_headers(&mut self) -> Result<(), ParseError> {
        if self.chunked && self.content_length_seen {
            // RFC 7230 3.3.3: chunked wins, Content-Length is conflicting.
            return Err(ParseError::ConflictingFraming);
        }
        self.body_mode = if !self.expect_body {
            BodyMode::None
        } else if self.chunked {
            self.chunk_phase = ChunkPhase::Size;
            BodyMode::Chunked
        } else if self.content_length_seen {
            if self.remaining_body == 0 {
                BodyMode::None
            } else {
                BodyMode::Sized
            }
        } else if self.require_close {
            BodyMode::UntilClose
        } else {
            BodyMode::None
        };
        Ok(())
    }

    /// Returns `Ok(true)` if `data` was exhausted mid-body (caller should
    /// return from `feed`), `Ok(false)` if the stage advanced to `Done` and
    /// the outer loop should notice and stop.
    fn consume_body(&mut self, data: &mut &[u8], sink: &mut dyn ParserSink) -> Result<bool, ParseError> {
        match self.body_mode {
            BodyMode::Sized => {
                let take = self.remaining_body.min(data.len());
                if take > 0 {
                    sink.on_event(ParseEvent::Data(&data[..take]));
                    self.remaining_body -= take;
                    *data = &data[take..];
                }
                if self.remaining_body == 0 {
                    self.stage = Stage::Done;
                    sink.on_event(ParseEvent::Done(Ok(())));
                    return Ok(false);
                }
                Ok(true)
            }
            BodyMode::UntilClose => {
                if !data.is_empty() {
                    sink.on_event(ParseEvent::Data(data));
                    *data = &[];
                }
                Ok(true)
            }
            BodyMode::Chunked => self.consume_chunked(data, sink),
            BodyMode::None | BodyMode::Unknown => {
                self.stage = Stage::Done;
                sink.on_event(ParseEvent::Done(Ok(())));
                Ok(false)
            }
        }
    }

    fn consume_chunked(&mut self, data: &mut &[u8], sink: &mut dyn ParserSink) -> Result<bool, ParseError> {
        loop {
            match self.chunk_phase {
                ChunkPhase::Size => match take_line(&mut self.carry, data) {
                    None => return Ok(true),
                    Some(line) => {
                        let text = std::str::from_utf8(&line).map_err(|_| ParseError::InvalidChunkSize)?;
                        let size_part = text.split(';').next().unwrap_or(text).trim();
                        let size =
                            usize::from_str_radix(size_part, 16).map_err(|_| ParseError::InvalidChunkSize)?;
                        if size == 0 {
                            self.chunk_phase = ChunkPhase::Trailer;
                        } else {
                            self.chunk_remaining = size;
                            self.chunk_phase = ChunkPhase::Data;
                        }
                    }
                },
                ChunkPhase::Data => {
                    let take = self.chunk_remaining.min(data.len());
                    if take > 0 {
                        sink.on_event(ParseEvent::Data(&data[..take]));
                        self.chunk_remaining -= take;
                        *data = &data[take..];
                    }
                    if self.chunk_remaining == 0 {
                        self.chunk_phase = ChunkPhase::DataCrlf;
                    } else {
                        return Ok(true);
                    }
                }
                ChunkPhase::DataCrlf => match take_line(&mut self.carry, data) {
                    None => return Ok(true),
                    Some(_) => self.chunk_phase = ChunkPhase::Size,
                },
                ChunkPhase::Trailer => match take_line(&mut self.carry, data) {
                    None => return Ok(true),
                    Some(line) => {
                        if line.is_empty() {
                            self.stage = Stage::Done;
                            sink.on_event(ParseEvent::Done(Ok(())));
                            return Ok(false);
                        }
                        // Trailing headers are ignored per spec.
                    }
                },
            }
        }
    }
}

/// Pull one `\r\n`-terminated line out of `data`, transparently stitching it
/// to any carried-over prefix from a previous `feed` call. Returns `None`
/// (stashing the unterminated remainder in `carry`) if no terminator is
/// found yet.
fn take_line(carry: &mut Vec<u8>, data: &mut &[u8]) -> Option<Vec<u8>> {
    if let Some(pos) = find_crlf(data) {
        let mut line = std::mem::take(carry);
        line.extend_from_slice(&data[..pos]);
        *data = &data[pos + 2..];
        return Some(line);
    }
    carry.extend_from_slice(data);
    *data = &[];
    None
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}
