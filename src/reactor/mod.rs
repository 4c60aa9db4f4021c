//! Backend-polymorphic reactor.
//!
//! Selects epoll on Linux, kqueue on the BSDs and macOS, IOCP on Windows,
//! and `select` as the portable fallback -- a compile-time choice, not a
//! runtime one. Readiness, not completion, is the model every backend
//! presents to callers: even the IOCP backend (genuinely completion-based
//! under the hood) translates `GetQueuedCompletionStatus` results back
//! into `Event { readable, writable }` so the rest of the crate never
//! branches on platform.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

#[cfg(unix)]
mod unix_pipe;

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
mod kqueue;
#[cfg(windows)]
mod iocp;
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    windows
)))]
mod select;

#[cfg(unix)]
pub type RawFd = std::os::unix::io::RawFd;
#[cfg(windows)]
pub type RawFd = std::os::windows::io::RawSocket;

/// Readiness a caller wants to be told about for a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    const READ_BIT: u8 = 0b01;
    const WRITE_BIT: u8 = 0b10;

    pub fn readable() -> Interest {
        Interest(Interest::READ_BIT)
    }

    pub fn writable() -> Interest {
        Interest(Interest::WRITE_BIT)
    }

    pub fn read_write() -> Interest {
        Interest(Interest::READ_BIT | Interest::WRITE_BIT)
    }

    pub fn is_readable(&self) -> bool {
        self.0 & Interest::READ_BIT != 0
    }

    pub fn is_writable(&self) -> bool {
        self.0 & Interest::WRITE_BIT != 0
    }

    pub fn with_readable(mut self, on: bool) -> Interest {
        if on {
            self.0 |= Interest::READ_BIT;
        } else {
            self.0 &= !Interest::READ_BIT;
        }
        self
    }

    pub fn with_writable(mut self, on: bool) -> Interest {
        if on {
            self.0 |= Interest::WRITE_BIT;
        } else {
            self.0 &= !Interest::WRITE_BIT;
        }
        self
    }
}

/// A readiness notification for one descriptor. `error` covers both
/// `EPOLLERR`/`EV_ERROR` and a peer hangup (`EPOLLHUP`/`EV_EOF`).
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

/// The interface every reactor backend implements. `fd` identifiers are
/// never reused by a backend internally -- callers own that lifecycle by
/// calling `remove` before closing a descriptor.
pub trait Backend {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<()>;
    fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()>;
    fn remove(&mut self, fd: RawFd) -> Result<()>;
    /// Block for up to `timeout` (forever if `None`) and return the
    /// descriptors that became ready. A spurious empty result (e.g. an
    /// interrupted wait) is not an error.
    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<Event>>;
    fn name(&self) -> &'static str;
}

/// A plain, `Copy` handle capable of unblocking a thread parked in a
/// backend's `poll`. Kept separate from `Backend` so a `StopHandle` never
/// needs to hold a reference into the (single-threaded, `&mut self`)
/// backend itself -- waking is the one operation genuinely safe to call
/// concurrently with `poll`.
#[derive(Clone, Copy)]
pub struct Waker(WakerImpl);

impl Waker {
    pub fn wake(&self) -> Result<()> {
        self.0.wake()
    }
}

#[cfg(unix)]
#[derive(Clone, Copy)]
struct WakerImpl(RawFd);

#[cfg(unix)]
impl WakerImpl {
    fn wake(&self) -> Result<()> {
        let byte: u8 = 1;
        let ret = unsafe { libc::write(self.0, &byte as *const u8 as *const _, 1) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(io_error("reactor wake", err));
        }
        Ok(())
    }
}

#[cfg(windows)]
#[derive(Clone, Copy)]
struct WakerImpl(usize);

#[cfg(windows)]
impl WakerImpl {
    fn wake(&self) -> Result<()> {
        use winapi::um::ioapiset::PostQueuedCompletionStatus;
        let ok = unsafe {
            PostQueuedCompletionStatus(self.0 as *mut _, 0, 0, std::ptr::null_mut())
        };
        if ok == 0 {
            return Err(io_error("reactor wake", std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

fn new_backend() -> Result<(Box<dyn Backend>, Waker)> {
    #[cfg(target_os = "linux")]
    {
        let (backend, waker) = epoll::Epoll::new()?;
        Ok((Box::new(backend), Waker(waker)))
    }
    #[cfg(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    ))]
    {
        let (backend, waker) = kqueue::Kqueue::new()?;
        Ok((Box::new(backend), Waker(waker)))
    }
    #[cfg(windows)]
    {
        let (backend, waker) = iocp::Iocp::new()?;
        Ok((Box::new(backend), Waker(waker)))
    }
    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        windows
    )))]
    {
        let (backend, waker) = select::Select::new()?;
        Ok((Box::new(backend), Waker(waker)))
    }
}

/// A handle that can stop a `Reactor` running on another thread.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    waker: Waker,
}

impl StopHandle {
    pub fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.waker.wake()
    }
}

/// The reactor: one backend, selected at compile time, behind a single
/// readiness-based API.
pub struct Reactor {
    backend: Box<dyn Backend>,
    waker: Waker,
    running: Arc<AtomicBool>,
}

impl Reactor {
    pub fn new() -> Result<Reactor> {
        let (backend, waker) = new_backend()?;
        Ok(Reactor {
            backend: backend,
            waker: waker,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn add(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        self.backend.add(fd, interest)
    }

    pub fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        self.backend.modify(fd, interest)
    }

    pub fn remove(&mut self, fd: RawFd) -> Result<()> {
        self.backend.remove(fd)
    }

    /// Run a single wait/dispatch cycle, returning the ready events.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<Vec<Event>> {
        self.backend.poll(timeout)
    }

    /// Block, dispatching ready events to `handler`, until `stop()` is
    /// called (directly, or through a `StopHandle` from another thread).
    pub fn run<F: FnMut(Event)>(&mut self, mut handler: F) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        while self.running.load(Ordering::SeqCst) {
            for event in self.run_once(None)? {
                handler(event);
            }
        }
        Ok(())
    }

    /// A cloneable handle other threads can use to stop a running loop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
            waker: self.waker,
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

pub(crate) fn io_error(context: &'static str, err: std::io::Error) -> Error {
    crate::error::set_last_error(format!("{}: {}", context, err));
    Error::Io(err)
}
