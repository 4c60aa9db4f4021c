//! Linux epoll backend.
//!
//! A `fd -> interest` map doubles as the kernel-side source of truth
//! check (`EPOLL_CTL_ADD` fails on a duplicate registration, matching
//! `cwh_epoll_add`'s "already registered" rejection) and as what we hand
//! back to the event-conversion helpers.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

use libc::{
    c_int, epoll_create1, epoll_ctl, epoll_event, epoll_wait, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD,
};

use crate::error::{Error, Result};
use crate::reactor::unix_pipe::{drain_pipe, self_pipe};
use crate::reactor::{io_error, Backend, Event, Interest};

const MAX_EVENTS: usize = 1024;

fn to_epoll_bits(interest: Interest) -> u32 {
    let mut bits = 0u32;
    if interest.is_readable() {
        bits |= EPOLLIN as u32;
    }
    if interest.is_writable() {
        bits |= EPOLLOUT as u32;
    }
    bits
}

pub struct Epoll {
    epoll_fd: RawFd,
    registered: HashMap<RawFd, Interest>,
    wake_read: RawFd,
}

impl Epoll {
    pub fn new() -> Result<(Epoll, RawFd)> {
        let epoll_fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io_error("epoll_create1", std::io::Error::last_os_error()));
        }
        let (wake_read, wake_write) = self_pipe()?;
        let mut epoll = Epoll {
            epoll_fd: epoll_fd,
            registered: HashMap::new(),
            wake_read: wake_read,
        };
        epoll.register(wake_read, Interest::readable())?;
        Ok((epoll, wake_write))
    }

    fn register(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        let mut ev = epoll_event {
            events: to_epoll_bits(interest),
            u64: fd as u64,
        };
        let ret = unsafe { epoll_ctl(self.epoll_fd, EPOLL_CTL_ADD, fd, &mut ev) };
        if ret < 0 {
            return Err(io_error("epoll_ctl(ADD)", std::io::Error::last_os_error()));
        }
        self.registered.insert(fd, interest);
        Ok(())
    }
}

impl Backend for Epoll {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        if self.registered.contains_key(&fd) {
            return Err(Error::LoopAddFd);
        }
        self.register(fd, interest)
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        if !self.registered.contains_key(&fd) {
            return Err(Error::LoopModFd);
        }
        let mut ev = epoll_event {
            events: to_epoll_bits(interest),
            u64: fd as u64,
        };
        let ret = unsafe { epoll_ctl(self.epoll_fd, EPOLL_CTL_MOD, fd, &mut ev) };
        if ret < 0 {
            return Err(io_error("epoll_ctl(MOD)", std::io::Error::last_os_error()));
        }
        self.registered.insert(fd, interest);
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> Result<()> {
        if self.registered.remove(&fd).is_none() {
            return Err(Error::LoopDelFd);
        }
        let ret = unsafe { epoll_ctl(self.epoll_fd, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if ret < 0 {
            return Err(io_error("epoll_ctl(DEL)", std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<Event>> {
        let mut raw = vec![epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        let timeout_ms: c_int = match timeout {
            Some(d) => d.as_millis().min(c_int::MAX as u128) as c_int,
            None => -1,
        };
        let n = unsafe { epoll_wait(self.epoll_fd, raw.as_mut_ptr(), MAX_EVENTS as c_int, timeout_ms) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(io_error("epoll_wait", err));
        }
        let mut events = Vec::with_capacity(n as usize);
        for ev in raw.into_iter().take(n as usize) {
            let fd = ev.u64 as RawFd;
            if fd == self.wake_read {
                drain_pipe(fd);
                continue;
            }
            events.push(Event {
                fd: fd,
                readable: ev.events & (EPOLLIN as u32) != 0,
                writable: ev.events & (EPOLLOUT as u32) != 0,
                error: ev.events & ((EPOLLERR | EPOLLHUP) as u32) != 0,
            });
        }
        Ok(events)
    }

    fn name(&self) -> &'static str {
        "epoll (Linux)"
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_read);
            libc::close(self.epoll_fd);
        }
    }
}
