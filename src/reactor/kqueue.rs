//! kqueue backend for macOS, FreeBSD, OpenBSD and NetBSD.
//!
//! Unlike epoll, read and write interest are separate filters that must
//! be added/deleted individually -- `modify` diffs the old and new
//! interest the same way `cwh_kqueue_mod` does, only touching the
//! filters that actually changed.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

use libc::{
    kevent, kqueue, timespec, EVFILT_READ, EVFILT_WRITE, EV_ADD, EV_DELETE, EV_EOF, EV_ERROR,
};

use crate::error::{Error, Result};
use crate::reactor::unix_pipe::{drain_pipe, self_pipe};
use crate::reactor::{io_error, Backend, Event, Interest};

const MAX_EVENTS: usize = 1024;

fn kevent_zeroed() -> libc::kevent {
    unsafe { std::mem::zeroed() }
}

fn ev_set(fd: RawFd, filter: i16, flags: u16) -> libc::kevent {
    let mut kev = kevent_zeroed();
    kev.ident = fd as usize;
    kev.filter = filter;
    kev.flags = flags;
    kev
}

pub struct Kqueue {
    kq_fd: RawFd,
    registered: HashMap<RawFd, Interest>,
    wake_read: RawFd,
}

impl Kqueue {
    pub fn new() -> Result<(Kqueue, RawFd)> {
        let kq_fd = unsafe { kqueue() };
        if kq_fd < 0 {
            return Err(io_error("kqueue", std::io::Error::last_os_error()));
        }
        let (wake_read, wake_write) = self_pipe()?;
        let mut kq = Kqueue {
            kq_fd: kq_fd,
            registered: HashMap::new(),
            wake_read: wake_read,
        };
        kq.register(wake_read, Interest::readable())?;
        Ok((kq, wake_write))
    }

    fn apply(&self, changes: &[libc::kevent]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let ret = unsafe {
            kevent(
                self.kq_fd,
                changes.as_ptr(),
                changes.len() as i32,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        };
        if ret < 0 {
            return Err(io_error("kevent", std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn register(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        let mut changes = Vec::with_capacity(2);
        if interest.is_readable() {
            changes.push(ev_set(fd, EVFILT_READ, EV_ADD));
        }
        if interest.is_writable() {
            changes.push(ev_set(fd, EVFILT_WRITE, EV_ADD));
        }
        self.apply(&changes)?;
        self.registered.insert(fd, interest);
        Ok(())
    }
}

impl Backend for Kqueue {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        if self.registered.contains_key(&fd) {
            return Err(Error::LoopAddFd);
        }
        self.register(fd, interest)
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        let old = *self.registered.get(&fd).ok_or(Error::LoopModFd)?;
        let mut changes = Vec::with_capacity(4);
        if old.is_readable() && !interest.is_readable() {
            changes.push(ev_set(fd, EVFILT_READ, EV_DELETE));
        }
        if old.is_writable() && !interest.is_writable() {
            changes.push(ev_set(fd, EVFILT_WRITE, EV_DELETE));
        }
        if !old.is_readable() && interest.is_readable() {
            changes.push(ev_set(fd, EVFILT_READ, EV_ADD));
        }
        if !old.is_writable() && interest.is_writable() {
            changes.push(ev_set(fd, EVFILT_WRITE, EV_ADD));
        }
        self.apply(&changes)?;
        self.registered.insert(fd, interest);
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> Result<()> {
        let old = self.registered.remove(&fd).ok_or(Error::LoopDelFd)?;
        let mut changes = Vec::with_capacity(2);
        if old.is_readable() {
            changes.push(ev_set(fd, EVFILT_READ, EV_DELETE));
        }
        if old.is_writable() {
            changes.push(ev_set(fd, EVFILT_WRITE, EV_DELETE));
        }
        // Best-effort: the descriptor may already be closed.
        let _ = self.apply(&changes);
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<Event>> {
        let mut raw = vec![kevent_zeroed(); MAX_EVENTS];
        let ts = timeout.map(|d| timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let ts_ptr = match &ts {
            Some(t) => t as *const timespec,
            None => std::ptr::null(),
        };
        let n = unsafe {
            kevent(
                self.kq_fd,
                std::ptr::null(),
                0,
                raw.as_mut_ptr(),
                MAX_EVENTS as i32,
                ts_ptr,
            )
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(io_error("kevent(wait)", err));
        }
        let mut events: Vec<Event> = Vec::with_capacity(n as usize);
        for kev in raw.into_iter().take(n as usize) {
            let fd = kev.ident as RawFd;
            if fd == self.wake_read {
                drain_pipe(fd);
                continue;
            }
            let is_error = (kev.flags & EV_ERROR) != 0 || (kev.flags & EV_EOF) != 0;
            if let Some(existing) = events.iter_mut().find(|e| e.fd == fd) {
                existing.readable |= kev.filter == EVFILT_READ;
                existing.writable |= kev.filter == EVFILT_WRITE;
                existing.error |= is_error;
            } else {
                events.push(Event {
                    fd: fd,
                    readable: kev.filter == EVFILT_READ,
                    writable: kev.filter == EVFILT_WRITE,
                    error: is_error,
                });
            }
        }
        Ok(events)
    }

    fn name(&self) -> &'static str {
        "kqueue (macOS/BSD)"
    }
}

impl Drop for Kqueue {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_read);
            libc::close(self.kq_fd);
        }
    }
}
