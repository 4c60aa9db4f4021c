//! Self-pipe trick shared by the epoll, kqueue and select backends: a
//! non-blocking pipe whose read end is registered with the backend like
//! any other descriptor, letting `stop()` unblock a thread parked in a
//! blocking wait from any other thread.

use std::os::unix::io::RawFd;

use libc::c_int;

use crate::error::Result;
use crate::reactor::io_error;

pub fn self_pipe() -> Result<(RawFd, RawFd)> {
    let mut fds = [0 as c_int; 2];
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
    if ret < 0 {
        return Err(io_error("pipe2", std::io::Error::last_os_error()));
    }
    Ok((fds[0], fds[1]))
}

pub fn drain_pipe(fd: RawFd) {
    let mut buf = [0u8; 64];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            break;
        }
    }
}
