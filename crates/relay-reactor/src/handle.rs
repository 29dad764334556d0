use mio::Interest;

/// What kind of source a registration refers to. The dispatcher uses this to
/// route a readiness event to the right code path rather than treating every
/// fd identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdKind {
    Socket,
    Timer,
    Wakeup,
}

/// An opaque reference to one registration.
///
/// `shard` and `slot` locate the entry; `generation` lets the reactor detect
/// use of a handle after `unregister` even if the slot was reused, so a
/// use-after-unregister shows up as `ReactorError::StaleHandle` instead of
/// silently operating on an unrelated fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub(crate) shard: u8,
    pub(crate) slot: usize,
    pub(crate) generation: u64,
}

/// What the caller wants to happen to interest after its callback returns.
#[derive(Debug, Clone, Copy)]
pub enum Rearm {
    /// Re-enable the fd for the given interest (the common case).
    With(Interest),
    /// Leave the fd disarmed; the caller will call `Reactor::rearm` itself
    /// later (e.g. after queueing more data) or has already unregistered it.
    Manual,
}
