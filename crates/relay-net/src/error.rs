use thiserror::Error;

/// The terminal result of a connection attempt, delivered to the caller's
/// connection-result callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Success,
    HostUnknown,
    CouldNotConnect,
    Timeout,
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket must be Disconnected before connect() is called again")]
    AlreadyConnecting,

    #[error("write() called while socket is not Connecting or Connected")]
    NotWritable,

    #[error("invalid host: {0}")]
    InvalidHost(String),

    #[error(transparent)]
    Reactor(#[from] relay_reactor::ReactorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
