//! Thread-pool-driven event multiplexer over sockets, timers and
//! cross-thread wakeups.
//!
//! This is the bottom layer of the relay network core: `relay-net` builds
//! its non-blocking TCP socket on top of [`Reactor::register`], and
//! everything above that (HTTP connections, the client pool, the REST
//! router) never touches a raw fd directly.

mod error;
mod handle;
mod reactor;
mod timerfd;

pub use error::ReactorError;
pub use handle::{FdKind, Handle, Rearm};
pub use mio::Interest;
pub use reactor::{EventHandler, PanicReport, Reactor, TimerHandler};
