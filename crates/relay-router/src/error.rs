use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid route regex")]
    InvalidRegex(#[from] regex::Error),
}

/// Error a handler can return instead of panicking; both paths end the same
/// way, a 500 response and a `Matched` result.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
