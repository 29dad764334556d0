use thiserror::Error;

/// A syntactic or framing violation. Any of these ends the parse: no further
/// events are emitted after `on_done(Err(..))`, and the owning connection
/// must close the transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("first line did not start with an HTTP version marker")]
    MalformedStartLine,

    #[error("request line was missing the method, target, or version")]
    MalformedRequestLine,

    #[error("status code was not a valid decimal number")]
    InvalidStatusCode,

    #[error("header line was missing a ':' separator")]
    MalformedHeader,

    #[error("Transfer-Encoding: chunked and Content-Length both present")]
    ConflictingFraming,

    #[error("Content-Length value was not a valid non-negative integer")]
    InvalidContentLength,

    #[error("chunk size line was not valid hexadecimal")]
    InvalidChunkSize,

    #[error("connection closed before the framed body completed")]
    UnexpectedEof,
}
