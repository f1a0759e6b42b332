//! In-kernel bidirectional byte channel. Used standalone, as the
//! multiplexer's wakeup mechanism and as the signal path of
//! [`Lockable`](crate::lockable::Lockable).
//!
//! Read and write report `(bytes_transferred, still_open)`; a broken pipe is
//! the orderly `still_open == false` outcome, every other failure is fatal.

use crate::error::{Error, Result};
use std::io;
use std::os::unix::io::RawFd;

const CLOSED: RawFd = -1;

/// A unidirectional fd pair created atomically. Move-only; both ends close
/// on drop and can be closed independently before that.
#[derive(Debug)]
pub struct Pipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl Pipe {
    /// Creates a pipe with the platform default buffer size.
    pub fn new() -> Result<Pipe> {
        Pipe::with_capacity(0)
    }

    /// Creates a pipe, asking the kernel for at least `capacity` bytes of
    /// buffer. The capacity is a hint; the kernel may round it or refuse.
    pub fn with_capacity(capacity: usize) -> Result<Pipe> {
        let mut fds = [0 as RawFd; 2];

        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(Error::from(io::Error::last_os_error()));
        }

        let pipe = Pipe {
            read_fd: fds[0],
            write_fd: fds[1],
        };

        #[cfg(target_os = "linux")]
        {
            if capacity > 0 {
                // Best effort; silently keeps the default on EPERM/EINVAL.
                unsafe {
                    libc::fcntl(pipe.write_fd, libc::F_SETPIPE_SZ, capacity as libc::c_int);
                }
            }
        }

        #[cfg(not(target_os = "linux"))]
        let _ = capacity;

        Ok(pipe)
    }

    /// The pollable read end.
    #[inline]
    pub fn read_handle(&self) -> RawFd {
        self.read_fd
    }

    /// The pollable write end.
    #[inline]
    pub fn write_handle(&self) -> RawFd {
        self.write_fd
    }

    /// Writes up to `buf.len()` bytes. Returns the transferred count and
    /// whether the pipe is still open; a reader-less pipe yields
    /// `(0, false)`.
    pub fn write(&self, buf: &[u8]) -> Result<(usize, bool)> {
        if self.write_fd == CLOSED {
            return Ok((0, false));
        }

        loop {
            let written = unsafe {
                libc::write(self.write_fd, buf.as_ptr() as *const libc::c_void, buf.len())
            };

            if written >= 0 {
                return Ok((written as usize, true));
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EPIPE) => return Ok((0, false)),
                Some(libc::EAGAIN) => return Ok((0, true)),
                _ => return Err(Error::from(err)),
            }
        }
    }

    /// Reads up to `buf.len()` bytes, blocking on an empty pipe unless the
    /// read end is nonblocking. A closed write end yields `(0, false)`.
    pub fn read(&self, buf: &mut [u8]) -> Result<(usize, bool)> {
        if self.read_fd == CLOSED {
            return Ok((0, false));
        }

        loop {
            let received = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };

            if received > 0 {
                return Ok((received as usize, true));
            }

            if received == 0 {
                // EOF means the write end is gone; a zero-length request
                // legitimately returns zero.
                return Ok((0, buf.is_empty()));
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) => return Ok((0, true)),
                _ => return Err(Error::from(err)),
            }
        }
    }

    /// Switches the read end between blocking and nonblocking.
    pub fn set_read_nonblocking(&self, on: bool) -> Result<()> {
        set_nonblocking(self.read_fd, on)
    }

    /// Switches the write end between blocking and nonblocking.
    pub fn set_write_nonblocking(&self, on: bool) -> Result<()> {
        set_nonblocking(self.write_fd, on)
    }

    /// Closes the read end; peers writing afterwards observe a broken pipe.
    pub fn close_read(&mut self) {
        if self.read_fd != CLOSED {
            unsafe { libc::close(self.read_fd) };
            self.read_fd = CLOSED;
        }
    }

    /// Closes the write end; subsequent reads drain and then report closed.
    pub fn close_write(&mut self) {
        if self.write_fd != CLOSED {
            unsafe { libc::close(self.write_fd) };
            self.write_fd = CLOSED;
        }
    }
}

fn set_nonblocking(fd: RawFd, on: bool) -> Result<()> {
    if fd == CLOSED {
        return Err(Error::Io(io::ErrorKind::NotConnected));
    }

    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(Error::from(io::Error::last_os_error()));
        }

        let flags = if on {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };

        if libc::fcntl(fd, libc::F_SETFL, flags) < 0 {
            return Err(Error::from(io::Error::last_os_error()));
        }
    }

    Ok(())
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.close_read();
        self.close_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_write_read_roundtrip() {
        let pipe = Pipe::new().unwrap();

        let (written, open) = pipe.write(&[1, 2, 3]).unwrap();
        assert_eq!(written, 3);
        assert!(open);

        let mut buf = [0u8; 3];
        let (received, open) = pipe.read(&mut buf).unwrap();
        assert_eq!(received, 3);
        assert!(open);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_read_after_write_close_drains_then_reports_closed() {
        let mut pipe = Pipe::new().unwrap();
        pipe.write(&[9]).unwrap();
        pipe.close_write();

        let mut buf = [0u8; 4];
        let (received, open) = pipe.read(&mut buf).unwrap();
        assert_eq!(received, 1);
        assert!(open);

        let (received, open) = pipe.read(&mut buf).unwrap();
        assert_eq!(received, 0);
        assert!(!open);
    }

    #[test]
    fn test_write_after_read_close_reports_closed() {
        let mut pipe = Pipe::new().unwrap();
        pipe.close_read();

        let (written, open) = pipe.write(&[1]).unwrap();
        assert_eq!(written, 0);
        assert!(!open);
    }

    #[test]
    fn test_nonblocking_read_on_empty_pipe() {
        let pipe = Pipe::new().unwrap();
        pipe.set_read_nonblocking(true).unwrap();

        let mut buf = [0u8; 1];
        let (received, open) = pipe.read(&mut buf).unwrap();
        assert_eq!(received, 0);
        assert!(open);
    }

    #[test]
    fn test_blocking_read_wakes_on_write() {
        let pipe = Pipe::new().unwrap();

        let reader = thread::spawn({
            let read_fd = pipe.read_handle();
            move || {
                // Reconstruct a read-only view over the same descriptor.
                let view = Pipe {
                    read_fd,
                    write_fd: CLOSED,
                };
                let mut buf = [0u8; 1];
                let result = view.read(&mut buf).unwrap();
                ::std::mem::forget(view);
                (result, buf[0])
            }
        });

        pipe.write(&[42]).unwrap();

        let ((received, open), value) = reader.join().unwrap();
        assert_eq!(received, 1);
        assert!(open);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_capacity_hint_accepted() {
        let pipe = Pipe::with_capacity(65536).unwrap();
        let (written, open) = pipe.write(&[0u8; 128]).unwrap();

        assert_eq!(written, 128);
        assert!(open);
    }
}
