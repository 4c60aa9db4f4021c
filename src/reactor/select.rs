//! Portable `select(2)` fallback backend, used on any unix target
//! without a dedicated epoll/kqueue implementation.

use std::os::unix::io::RawFd;
use std::time::Duration;

use libc::{fd_set, select, timeval, FD_ISSET, FD_SET, FD_ZERO};

use crate::error::{Error, Result};
use crate::reactor::unix_pipe::{drain_pipe, self_pipe};
use crate::reactor::{io_error, Backend, Event, Interest};

pub struct Select {
    registered: Vec<(RawFd, Interest)>,
    wake_read: RawFd,
}

impl Select {
    pub fn new() -> Result<(Select, RawFd)> {
        let (wake_read, wake_write) = self_pipe()?;
        let mut select = Select {
            registered: Vec::new(),
            wake_read: wake_read,
        };
        select.registered.push((wake_read, Interest::readable()));
        Ok((select, wake_write))
    }

    fn position(&self, fd: RawFd) -> Option<usize> {
        self.registered.iter().position(|(f, _)| *f == fd)
    }
}

impl Backend for Select {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        if self.position(fd).is_some() {
            return Err(Error::LoopAddFd);
        }
        self.registered.push((fd, interest));
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        let idx = self.position(fd).ok_or(Error::LoopModFd)?;
        self.registered[idx].1 = interest;
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> Result<()> {
        let idx = self.position(fd).ok_or(Error::LoopDelFd)?;
        self.registered.remove(idx);
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<Event>> {
        if self.registered.is_empty() {
            return Ok(Vec::new());
        }

        let mut read_fds: fd_set = unsafe { std::mem::zeroed() };
        let mut write_fds: fd_set = unsafe { std::mem::zeroed() };
        let mut error_fds: fd_set = unsafe { std::mem::zeroed() };
        unsafe {
            FD_ZERO(&mut read_fds);
            FD_ZERO(&mut write_fds);
            FD_ZERO(&mut error_fds);
        }

        let mut max_fd: RawFd = -1;
        for (fd, interest) in &self.registered {
            unsafe {
                if interest.is_readable() {
                    FD_SET(*fd, &mut read_fds);
                }
                if interest.is_writable() {
                    FD_SET(*fd, &mut write_fds);
                }
                FD_SET(*fd, &mut error_fds);
            }
            max_fd = max_fd.max(*fd);
        }

        let mut tv = timeout.map(|d| timeval {
            tv_sec: d.as_secs() as libc::time_t,
            tv_usec: (d.subsec_micros()) as libc::suseconds_t,
        });
        let tv_ptr = match &mut tv {
            Some(t) => t as *mut timeval,
            None => std::ptr::null_mut(),
        };

        let ret = unsafe {
            select(
                max_fd + 1,
                &mut read_fds,
                &mut write_fds,
                &mut error_fds,
                tv_ptr,
            )
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(io_error("select", err));
        }

        let mut events = Vec::with_capacity(ret as usize);
        for (fd, _) in &self.registered {
            let r = unsafe { FD_ISSET(*fd, &read_fds) };
            let w = unsafe { FD_ISSET(*fd, &write_fds) };
            let e = unsafe { FD_ISSET(*fd, &error_fds) };
            if !r && !w && !e {
                continue;
            }
            if *fd == self.wake_read {
                drain_pipe(*fd);
                continue;
            }
            events.push(Event {
                fd: *fd,
                readable: r,
                writable: w,
                error: e,
            });
        }
        Ok(events)
    }

    fn name(&self) -> &'static str {
        "select (portable)"
    }
}

impl Drop for Select {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_read);
        }
    }
}
