use std::collections::HashSet;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token};
use parking_lot::Mutex;
use slab::Slab;

use crate::error::ReactorError;
use crate::handle::{FdKind, Handle, Rearm};
use crate::timerfd::TimerFd;

const WAKE_TOKEN: Token = Token(usize::MAX);
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Invoked from a reactor worker thread when a registered socket becomes
/// ready. The return value tells the reactor whether to re-arm interest
/// automatically or leave it to a later explicit `rearm`/`unregister` call.
pub trait EventHandler: Send + Sync {
    fn on_ready(&self, readable: bool, writable: bool) -> Rearm;
}

/// Invoked on each periodic timer expiration. `missed_ticks` is the number
/// of intervals that elapsed without the reactor getting back to this timer
/// in time (0 when delivery kept up with the schedule).
pub trait TimerHandler: Send + Sync {
    fn on_tick(&self, missed_ticks: u64);
}

/// A panic caught from a callback, reported out-of-band instead of
/// unwinding across the worker loop.
#[derive(Debug)]
pub struct PanicReport {
    pub handle: Handle,
    pub message: String,
}

enum Callback {
    Event(Arc<dyn EventHandler>),
    Timer(Arc<dyn TimerHandler>, TimerFd),
}

enum ClonedCallback {
    Event(Arc<dyn EventHandler>),
    Timer(Arc<dyn TimerHandler>),
}

struct Entry {
    generation: u64,
    #[allow(dead_code)] // retained for introspection / future dispatch-by-kind
    kind: FdKind,
    fd: RawFd,
    callback: Callback,
}

struct Shard {
    index: u8,
    registry: Registry,
    waker: mio::Waker,
    entries: Mutex<Slab<Entry>>,
    next_gen: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Thread-pool-driven multiplexer over sockets, timers and cross-thread
/// wakeups.
///
/// Each worker thread owns one shard: its own `mio::Poll` (and therefore its
/// own epoll instance), draining readiness events and invoking the owning
/// component's callback. Sharding fds across independent poll instances is
/// what lets distinct fds be serviced by distinct threads in parallel, while
/// a single fd is never handed to two threads at once (it lives on exactly
/// one shard for its whole registered lifetime).
pub struct Reactor {
    shards: Vec<Arc<Shard>>,
    next_shard: AtomicUsize,
    shutdown: Arc<AtomicBool>,
    disallow_timers: Arc<AtomicBool>,
    // fds are round-robined across independent per-shard epoll instances, so a
    // duplicate registration would land on a different shard and never hit
    // EEXIST at the OS level. Tracked here, across all shards, instead.
    registered_fds: Mutex<HashSet<RawFd>>,
}

impl Reactor {
    /// Spawn `workers` reactor threads. Returns the reactor plus a receiver
    /// for callback panics, which the caller should drain (e.g. logging each
    /// one) for the lifetime of the reactor.
    pub fn new(workers: usize) -> Result<(Self, Receiver<PanicReport>), ReactorError> {
        assert!(workers > 0, "reactor needs at least one worker thread");
        let shutdown = Arc::new(AtomicBool::new(false));
        let disallow_timers = Arc::new(AtomicBool::new(false));
        let (panic_tx, panic_rx) = unbounded();

        let mut shards = Vec::with_capacity(workers);
        for index in 0..workers {
            let poll = Poll::new().map_err(ReactorError::Register)?;
            let registry = poll.registry().try_clone().map_err(ReactorError::Register)?;
            let waker = mio::Waker::new(&registry, WAKE_TOKEN).map_err(ReactorError::Register)?;
            let shard = Arc::new(Shard {
                index: index as u8,
                registry,
                waker,
                entries: Mutex::new(Slab::new()),
                next_gen: AtomicU64::new(0),
                thread: Mutex::new(None),
            });

            let shard_for_thread = shard.clone();
            let shutdown_for_thread = shutdown.clone();
            let panic_tx_for_thread = panic_tx.clone();
            let join = std::thread::Builder::new()
                .name(format!("relay-reactor-{index}"))
                .spawn(move || run_shard(poll, shard_for_thread, shutdown_for_thread, panic_tx_for_thread))
                .expect("failed to spawn reactor worker thread");
            *shard.thread.lock() = Some(join);

            shards.push(shard);
        }

        Ok((
            Self {
                shards,
                next_shard: AtomicUsize::new(0),
                shutdown,
                disallow_timers,
                registered_fds: Mutex::new(HashSet::new()),
            },
            panic_rx,
        ))
    }

    fn pick_shard(&self) -> usize {
        self.next_shard.fetch_add(1, Ordering::Relaxed) % self.shards.len()
    }

    /// Register `fd` in edge-triggered one-shot mode. Fails if the reactor is
    /// shutting down; the underlying `epoll_ctl` failing is fatal to the
    /// shard and surfaced as `ReactorError::Register`.
    pub fn register(
        &self,
        fd: RawFd,
        kind: FdKind,
        interest: Interest,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Handle, ReactorError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(ReactorError::ShuttingDown);
        }
        {
            let mut registered = self.registered_fds.lock();
            if !registered.insert(fd) {
                return Err(ReactorError::AlreadyRegistered);
            }
        }
        let shard_idx = self.pick_shard();
        let shard = &self.shards[shard_idx];
        let mut entries = shard.entries.lock();
        let generation = shard.next_gen.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = entries.insert(Entry { generation, kind, fd, callback: Callback::Event(handler) });
        let mut source = SourceFd(&fd);
        if let Err(e) = shard.registry.register(&mut source, Token(slot), interest) {
            entries.remove(slot);
            self.registered_fds.lock().remove(&fd);
            return Err(ReactorError::Register(e));
        }
        Ok(Handle { shard: shard_idx as u8, slot, generation })
    }

    /// Re-enable a registration for `interest`. Must be called after every
    /// delivered event to receive another one.
    pub fn rearm(&self, handle: Handle, interest: Interest) -> Result<(), ReactorError> {
        let shard = self.shard_for(&handle)?;
        let entries = shard.entries.lock();
        let entry = lookup(&entries, &handle)?;
        let mut source = SourceFd(&entry.fd);
        shard
            .registry
            .reregister(&mut source, Token(handle.slot), interest)
            .map_err(ReactorError::Rearm)
    }

    /// Remove a registration. Must precede closing the underlying fd.
    pub fn unregister(&self, handle: Handle) -> Result<(), ReactorError> {
        let shard = self.shard_for(&handle)?;
        let mut entries = shard.entries.lock();
        let fd = {
            let entry = lookup(&entries, &handle)?;
            let mut source = SourceFd(&entry.fd);
            shard.registry.deregister(&mut source).map_err(ReactorError::Unregister)?;
            entry.fd
        };
        entries.remove(handle.slot);
        self.registered_fds.lock().remove(&fd);
        Ok(())
    }

    /// Create an internal timerfd firing every `interval`.
    pub fn add_periodic(
        &self,
        interval: Duration,
        handler: Arc<dyn TimerHandler>,
    ) -> Result<Handle, ReactorError> {
        if self.disallow_timers.load(Ordering::Acquire) {
            return Err(ReactorError::ShuttingDown);
        }
        let timer = TimerFd::new().map_err(ReactorError::TimerCreate)?;
        timer.set_periodic(interval).map_err(ReactorError::TimerSet)?;
        let fd = timer.as_raw_fd();

        let shard_idx = self.pick_shard();
        let shard = &self.shards[shard_idx];
        let mut entries = shard.entries.lock();
        let generation = shard.next_gen.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = entries.insert(Entry {
            generation,
            kind: FdKind::Timer,
            fd,
            callback: Callback::Timer(handler, timer),
        });
        let mut source = SourceFd(&fd);
        if let Err(e) = shard.registry.register(&mut source, Token(slot), Interest::READABLE) {
            entries.remove(slot);
            return Err(ReactorError::Register(e));
        }
        Ok(Handle { shard: shard_idx as u8, slot, generation })
    }

    /// Post a cross-thread wakeup to every worker. Used for shutdown and so
    /// a producer thread gets a prompt response after queueing work for a
    /// connection owned by this reactor (see `relay-net`'s write path).
    pub fn wake(&self) {
        for shard in &self.shards {
            let _ = shard.waker.wake();
        }
    }

    /// Signal every worker to drain and exit, disallow further timer
    /// re-arms, then join all threads. Callers that track their own
    /// transport set (e.g. a connection pool) should finish draining it
    /// before calling this so in-flight work is not abandoned mid-response.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.disallow_timers.store(true, Ordering::Release);
        self.wake();
        for shard in &self.shards {
            if let Some(join) = shard.thread.lock().take() {
                let _ = join.join();
            }
        }
    }

    fn shard_for(&self, handle: &Handle) -> Result<&Arc<Shard>, ReactorError> {
        self.shards.get(handle.shard as usize).ok_or(ReactorError::StaleHandle)
    }
}

fn lookup<'a>(entries: &'a Slab<Entry>, handle: &Handle) -> Result<&'a Entry, ReactorError> {
    let entry = entries.get(handle.slot).ok_or(ReactorError::StaleHandle)?;
    if entry.generation != handle.generation {
        return Err(ReactorError::StaleHandle);
    }
    Ok(entry)
}

fn run_shard(mut poll: Poll, shard: Arc<Shard>, shutdown: Arc<AtomicBool>, panic_tx: Sender<PanicReport>) {
    let mut events = Events::with_capacity(256);
    loop {
        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(shard = shard.index, error = %e, "reactor shard poll() failed, exiting");
                return;
            }
        }

        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            dispatch(&shard, event, &panic_tx);
        }

        if shutdown.load(Ordering::Acquire) {
            return;
        }
    }
}

fn dispatch(shard: &Arc<Shard>, event: &mio::event::Event, panic_tx: &Sender<PanicReport>) {
    let slot = event.token().0;
    let readable = event.is_readable();
    let writable = event.is_writable();

    let (generation, cloned) = {
        let entries = shard.entries.lock();
        match entries.get(slot) {
            Some(entry) => (
                entry.generation,
                match &entry.callback {
                    Callback::Event(h) => ClonedCallback::Event(h.clone()),
                    Callback::Timer(h, _) => ClonedCallback::Timer(h.clone()),
                },
            ),
            // Unregistered between poll() returning this event and dispatch.
            None => return,
        }
    };
    let handle = Handle { shard: shard.index, slot, generation };

    match cloned {
        ClonedCallback::Event(handler) => {
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.on_ready(readable, writable)));
            match outcome {
                Ok(Rearm::With(interest)) => {
                    let entries = shard.entries.lock();
                    if let Some(entry) = entries.get(slot) {
                        if entry.generation == generation {
                            let mut source = SourceFd(&entry.fd);
                            let _ = shard.registry.reregister(&mut source, Token(slot), interest);
                        }
                    }
                }
                Ok(Rearm::Manual) => {}
                Err(payload) => {
                    let _ = panic_tx.send(PanicReport { handle, message: panic_message(payload) });
                }
            }
        }
        ClonedCallback::Timer(handler) => {
            let expirations = {
                let entries = shard.entries.lock();
                match entries.get(slot) {
                    Some(entry) if entry.generation == generation => match &entry.callback {
                        Callback::Timer(_, timer) => timer.read_expirations().unwrap_or(0),
                        Callback::Event(_) => return,
                    },
                    _ => return,
                }
            };
            if expirations == 0 {
                return;
            }
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.on_tick(expirations - 1)));
            if let Err(payload) = outcome {
                let _ = panic_tx.send(PanicReport { handle, message: panic_message(payload) });
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "reactor callback panicked with a non-string payload".to_string()
    }
}
