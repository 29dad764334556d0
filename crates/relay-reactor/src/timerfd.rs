//! A Linux `timerfd`, wrapped so it can be registered with `mio` like any
//! other raw fd (`mio::unix::SourceFd`). One of these backs each
//! `Reactor::add_periodic` registration, matching the "one timerfd per
//! periodic callback" control-fd contract.

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

pub struct TimerFd {
    fd: OwnedFd,
}

impl TimerFd {
    /// Create a disarmed timerfd (CLOCK_MONOTONIC, nonblocking, close-on-exec).
    pub fn new() -> io::Result<Self> {
        // SAFETY: timerfd_create is called with valid, constant flags; the
        // returned fd is immediately owned by OwnedFd so it cannot leak.
        let raw = unsafe {
            libc::timerfd_create(
                libc::CLOCK_MONOTONIC,
                libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: raw is a valid, freshly-created fd owned by this call.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self { fd })
    }

    /// Arm the timer to fire every `interval`, starting after one `interval`.
    pub fn set_periodic(&self, interval: Duration) -> io::Result<()> {
        let spec = to_itimerspec(interval, interval);
        // SAFETY: self.fd is valid for the lifetime of this call and `spec`
        // is a fully-initialized itimerspec.
        let rc = unsafe {
            libc::timerfd_settime(self.fd.as_raw_fd(), 0, &spec, std::ptr::null_mut())
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Read the expiration counter, returning the number of ticks that
    /// elapsed since the last successful read (1 if on schedule, >1 if the
    /// reactor fell behind and missed ticks).
    ///
    /// Returns `Ok(0)` on `EAGAIN` (spurious wakeup, nothing to report).
    pub fn read_expirations(&self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        // SAFETY: buf is exactly sizeof(u64), the width timerfd writes.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(u64::from_ne_bytes(buf))
    }
}

impl AsRawFd for TimerFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

fn to_itimerspec(initial: Duration, interval: Duration) -> libc::itimerspec {
    libc::itimerspec {
        it_interval: to_timespec(interval),
        it_value: to_timespec(initial),
    }
}

fn to_timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}
