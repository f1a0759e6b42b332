//! Set-oriented readiness waiting: the caller registers resources for
//! reading, writing or error checking and asks which of them are ready,
//! without the callback machinery of the multiplexer. The select-style
//! counterpart to [`crate::mux`].

use crate::mux::{IoResource, MuxError, MuxResult};
use std::io;
use std::sync::Arc;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Interest {
    Read,
    Write,
    Error,
}

struct Registration {
    resource: Arc<dyn IoResource>,
    interest: Interest,
}

/// The resources one `select` call found ready, split by interest.
#[derive(Default)]
pub struct Selection {
    pub readable: Vec<Arc<dyn IoResource>>,
    pub writable: Vec<Arc<dyn IoResource>>,
    pub errored: Vec<Arc<dyn IoResource>>,
}

impl Selection {
    /// Total number of ready resources across the three sets.
    #[inline]
    pub fn len(&self) -> usize {
        self.readable.len() + self.writable.len() + self.errored.len()
    }
}

/// A reusable registration set for select-style waiting. Not internally
/// synchronized; one owner drives it.
pub struct Selector {
    registrations: Vec<Registration>,
    fds: Vec<libc::pollfd>,
}

impl Selector {
    #[inline]
    pub fn new() -> Selector {
        Selector {
            registrations: Vec::new(),
            fds: Vec::new(),
        }
    }

    /// Number of registrations across all interests.
    #[inline]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Watches a resource for readability.
    pub fn add_read(&mut self, resource: Arc<dyn IoResource>) -> MuxResult<()> {
        self.insert(resource, Interest::Read)
    }

    /// Watches a resource for writability.
    pub fn add_write(&mut self, resource: Arc<dyn IoResource>) -> MuxResult<()> {
        self.insert(resource, Interest::Write)
    }

    /// Watches a resource for error conditions only.
    pub fn add_error(&mut self, resource: Arc<dyn IoResource>) -> MuxResult<()> {
        self.insert(resource, Interest::Error)
    }

    pub fn remove_read(&mut self, resource: &Arc<dyn IoResource>) -> MuxResult<()> {
        self.take(resource, Interest::Read)
    }

    pub fn remove_write(&mut self, resource: &Arc<dyn IoResource>) -> MuxResult<()> {
        self.take(resource, Interest::Write)
    }

    pub fn remove_error(&mut self, resource: &Arc<dyn IoResource>) -> MuxResult<()> {
        self.take(resource, Interest::Error)
    }

    /// Waits for readiness on the registered set. Returns `None` on
    /// timeout; `timeout_ms < 0` blocks indefinitely.
    pub fn select(&mut self, timeout_ms: i32) -> MuxResult<Option<Selection>> {
        self.fds.clear();

        for registration in &self.registrations {
            let (fd, events) = match registration.interest {
                Interest::Read => (registration.resource.read_handle(), libc::POLLIN),
                Interest::Write => (registration.resource.write_handle(), libc::POLLOUT),
                // POLLERR is always reported; no events requested.
                Interest::Error => (registration.resource.read_handle(), 0),
            };

            self.fds.push(libc::pollfd {
                fd,
                events,
                revents: 0,
            });
        }

        let ready = unsafe {
            libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, timeout_ms)
        };

        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(None);
            }
            return Err(MuxError::from(err));
        }

        if ready == 0 {
            return Ok(None);
        }

        let mut selection = Selection::default();

        for (index, pfd) in self.fds.iter().enumerate() {
            if pfd.revents == 0 {
                continue;
            }

            let registration = &self.registrations[index];
            let error_flags = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;

            match registration.interest {
                Interest::Read if pfd.revents & (libc::POLLIN | error_flags) != 0 => {
                    selection.readable.push(registration.resource.clone());
                }
                Interest::Write if pfd.revents & (libc::POLLOUT | error_flags) != 0 => {
                    selection.writable.push(registration.resource.clone());
                }
                Interest::Error if pfd.revents & error_flags != 0 => {
                    selection.errored.push(registration.resource.clone());
                }
                _ => (),
            }
        }

        Ok(Some(selection))
    }

    fn insert(&mut self, resource: Arc<dyn IoResource>, interest: Interest) -> MuxResult<()> {
        if self.position(&resource, interest).is_some() {
            return Err(MuxError::AlreadyRegistered);
        }

        self.registrations.push(Registration { resource, interest });
        Ok(())
    }

    fn take(&mut self, resource: &Arc<dyn IoResource>, interest: Interest) -> MuxResult<()> {
        let index = self
            .position(resource, interest)
            .ok_or(MuxError::NotFound)?;

        self.registrations.remove(index);
        Ok(())
    }

    fn position(&self, resource: &Arc<dyn IoResource>, interest: Interest) -> Option<usize> {
        let key = Arc::as_ptr(resource) as *const () as usize;

        self.registrations.iter().position(|registration| {
            registration.interest == interest
                && Arc::as_ptr(&registration.resource) as *const () as usize == key
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;

    #[test]
    fn test_empty_select_times_out() {
        let mut selector = Selector::new();

        assert!(selector.select(0).unwrap().is_none());
    }

    #[test]
    fn test_readable_pipe_is_selected() {
        let mut selector = Selector::new();

        let quiet = Arc::new(Pipe::new().unwrap());
        let loud = Arc::new(Pipe::new().unwrap());
        loud.write(&[1]).unwrap();

        let quiet_res: Arc<dyn IoResource> = quiet.clone();
        let loud_res: Arc<dyn IoResource> = loud.clone();

        selector.add_read(quiet_res).unwrap();
        selector.add_read(loud_res.clone()).unwrap();

        let selection = selector.select(0).unwrap().expect("one pipe is ready");

        assert_eq!(selection.len(), 1);
        assert_eq!(selection.readable.len(), 1);
        assert_eq!(
            Arc::as_ptr(&selection.readable[0]) as *const () as usize,
            Arc::as_ptr(&loud_res) as *const () as usize
        );
    }

    #[test]
    fn test_writable_pipe_is_selected() {
        let mut selector = Selector::new();

        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        selector.add_write(pipe).unwrap();

        let selection = selector.select(0).unwrap().expect("empty pipe is writable");
        assert_eq!(selection.writable.len(), 1);
    }

    #[test]
    fn test_duplicate_interest_rejected() {
        let mut selector = Selector::new();

        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        selector.add_read(pipe.clone()).unwrap();

        assert_eq!(
            selector.add_read(pipe.clone()).unwrap_err(),
            MuxError::AlreadyRegistered
        );

        // Differing interests on the same resource are fine.
        selector.add_write(pipe).unwrap();
        assert_eq!(selector.len(), 2);
    }

    #[test]
    fn test_remove_unknown_fails() {
        let mut selector = Selector::new();
        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());

        assert_eq!(
            selector.remove_read(&pipe).unwrap_err(),
            MuxError::NotFound
        );
    }

    #[test]
    fn test_removed_resource_is_not_selected() {
        let mut selector = Selector::new();

        let pipe = Arc::new(Pipe::new().unwrap());
        pipe.write(&[1]).unwrap();

        let resource: Arc<dyn IoResource> = pipe.clone();
        selector.add_read(resource.clone()).unwrap();
        selector.remove_read(&resource).unwrap();

        assert!(selector.select(0).unwrap().is_none());
    }

    #[test]
    fn test_closed_write_end_reports_error_interest() {
        let mut selector = Selector::new();

        let mut pipe = Pipe::new().unwrap();
        pipe.write(&[1]).unwrap();
        pipe.close_write();

        let resource: Arc<dyn IoResource> = Arc::new(pipe);
        selector.add_error(resource).unwrap();

        // Draining reads are not registered; the hangup alone must show up.
        let selection = selector.select(100).unwrap().expect("hangup expected");
        assert_eq!(selection.errored.len(), 1);
    }
}
