//! Non-blocking client TCP socket with a bounded outbound queue, built on
//! `relay-reactor`. This is the transport `relay-http`'s connection drives
//! its parser over.

mod error;
mod socket;
mod state;

pub use error::{ConnectResult, SocketError};
pub use socket::{SocketObserver, TcpClientSocket};
pub use state::SocketState;
