use thiserror::Error;

/// Failures surfaced by the reactor's control operations.
///
/// Per the fd-registration invariants, any of these is treated as fatal to the
/// reactor shard that raised it: the caller should tear the shard down rather
/// than attempt to keep using a multiplexer in an unknown state.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("fd already registered")]
    AlreadyRegistered,

    #[error("unknown or stale registration handle")]
    StaleHandle,

    #[error("register() syscall failed: {0}")]
    Register(#[source] std::io::Error),

    #[error("rearm() syscall failed: {0}")]
    Rearm(#[source] std::io::Error),

    #[error("unregister() syscall failed: {0}")]
    Unregister(#[source] std::io::Error),

    #[error("timerfd_create failed: {0}")]
    TimerCreate(#[source] std::io::Error),

    #[error("timerfd_settime failed: {0}")]
    TimerSet(#[source] std::io::Error),

    #[error("reactor is shutting down")]
    ShuttingDown,
}
