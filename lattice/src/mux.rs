//! Readiness multiplexer: many sockets and pipes share one waiting thread.
//!
//! Registrations live in an order-preserving map keyed by resource identity.
//! Membership changes flip a dirty flag and write one byte into an internal
//! wakeup pipe, so a blocked `poll` returns promptly and rebuilds its
//! parallel arrays (a `pollfd` table plus a dispatch table) before waiting
//! again. The wakeup pipe occupies slot 0 of the `pollfd` table and never
//! dispatches to user callbacks.

use crate::error::Error;
use crate::lockable::Lockable;
use crate::logging::{self, debug, o, trace, Logger};
use crate::pipe::Pipe;
use indexmap::IndexMap;
use std::error;
use std::fmt;
use std::io;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::result;
use std::sync::{Arc, Mutex};

/// Anything with pollable descriptors. Stream sockets report the same fd for
/// both directions; pipes report their respective ends.
pub trait IoResource: Send + Sync {
    fn read_handle(&self) -> RawFd;

    fn write_handle(&self) -> RawFd;
}

impl IoResource for TcpStream {
    fn read_handle(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn write_handle(&self) -> RawFd {
        self.as_raw_fd()
    }
}

impl IoResource for TcpListener {
    fn read_handle(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn write_handle(&self) -> RawFd {
        self.as_raw_fd()
    }
}

impl IoResource for UdpSocket {
    fn read_handle(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn write_handle(&self) -> RawFd {
        self.as_raw_fd()
    }
}

impl IoResource for Pipe {
    fn read_handle(&self) -> RawFd {
        Pipe::read_handle(self)
    }

    fn write_handle(&self) -> RawFd {
        Pipe::write_handle(self)
    }
}

impl<T: Send> IoResource for Lockable<T> {
    fn read_handle(&self) -> RawFd {
        self.signal_handle()
    }

    fn write_handle(&self) -> RawFd {
        self.signal_handle()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Operation {
    Read,
    Write,
}

/// Outcome of one `poll` call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PollStatus {
    /// Readiness was delivered; user callbacks ran for every ready
    /// registration (possibly none, when only the wakeup pipe fired).
    Ready,
    /// The wait elapsed with nothing ready.
    Timeout,
    /// `stop` was requested.
    Stopped,
    /// No resources are registered beyond the internal wakeup pipe.
    Empty,
}

#[derive(Debug, Eq, PartialEq)]
pub enum MuxError {
    /// The resource already has registrations.
    AlreadyRegistered,
    /// The resource has no registrations to remove.
    NotFound,
    /// The registration would exceed `max_resource_count`.
    Capacity,
    /// The operation list is empty or repeats an operation.
    InvalidOperationList,
    Io(io::ErrorKind),
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MuxError::AlreadyRegistered => write!(f, "resource already registered"),
            MuxError::NotFound => write!(f, "resource not registered"),
            MuxError::Capacity => write!(f, "multiplexer capacity exceeded"),
            MuxError::InvalidOperationList => write!(f, "operation list empty or duplicated"),
            MuxError::Io(kind) => write!(f, "i/o failure: {:?}", kind),
        }
    }
}

impl error::Error for MuxError {}

impl From<io::Error> for MuxError {
    fn from(io_error: io::Error) -> Self {
        MuxError::Io(io_error.kind())
    }
}

impl From<Error> for MuxError {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(kind) => MuxError::Io(kind),
            _ => MuxError::Io(io::ErrorKind::Other),
        }
    }
}

pub type MuxResult<T> = result::Result<T, MuxError>;

/// Invoked with the multiplexer and the ready resource. May reentrantly call
/// `add`/`remove`; those changes take effect on the next `poll`. Must not
/// call `poll` itself.
pub type Callback = Arc<dyn Fn(&Multiplexer, &dyn IoResource) + Send + Sync>;

/// Observer invoked after a registration change with the remaining entry
/// count, the affected resource and the operation.
pub type Observer = Box<dyn Fn(usize, &Arc<dyn IoResource>, Operation) + Send + Sync>;

#[derive(Default)]
struct Observers {
    on_added: Option<Observer>,
    on_removed: Option<Observer>,
}

#[derive(Clone)]
struct Entry {
    resource: Arc<dyn IoResource>,
    operation: Operation,
    callback: Callback,
}

struct MuxState {
    resources: IndexMap<usize, Vec<Entry>>,
    count: usize,
    dirty: bool,
    stop: bool,
}

struct PollTable {
    fds: Vec<libc::pollfd>,
    // dispatch[i] corresponds to fds[i + 1]; slot 0 is the wakeup pipe.
    dispatch: Vec<Entry>,
}

/// The readiness-polling fabric. Shared behind an `Arc`; all operations take
/// `&self`.
pub struct Multiplexer {
    max_resources: usize,
    state: Mutex<MuxState>,
    table: Mutex<PollTable>,
    observers: Mutex<Observers>,
    wake: Pipe,
    log: Logger,
}

impl Multiplexer {
    /// Constructs a multiplexer holding at most `max_resources`
    /// registrations, the internal wakeup descriptor included.
    pub fn new<'a, L: Into<Option<&'a Logger>>>(
        max_resources: usize,
        log: L,
    ) -> crate::error::Result<Multiplexer> {
        let wake = Pipe::new()?;
        wake.set_read_nonblocking(true)?;
        wake.set_write_nonblocking(true)?;

        let mux_log = match log.into() {
            Some(log) => log.new(o!()),
            _ => logging::discard(),
        };

        Ok(Multiplexer {
            max_resources,
            state: Mutex::new(MuxState {
                resources: IndexMap::new(),
                count: 0,
                dirty: false,
                stop: false,
            }),
            table: Mutex::new(PollTable {
                fds: Vec::new(),
                dispatch: Vec::new(),
            }),
            observers: Mutex::new(Observers::default()),
            wake,
            log: mux_log,
        })
    }

    /// Constructs a multiplexer with the default capacity.
    pub fn with_defaults() -> crate::error::Result<Multiplexer> {
        Multiplexer::new(crate::config::DEFAULT_MAX_RESOURCE_COUNT, None)
    }

    /// Registers a resource with one callback per operation.
    pub fn add(&self, resource: Arc<dyn IoResource>, ops: Vec<(Operation, Callback)>) -> MuxResult<()> {
        if ops.is_empty() {
            return Err(MuxError::InvalidOperationList);
        }

        for first in 0..ops.len() {
            for second in first + 1..ops.len() {
                if ops[first].0 == ops[second].0 {
                    return Err(MuxError::InvalidOperationList);
                }
            }
        }

        let key = resource_key(&resource);
        let operations: Vec<Operation> = ops.iter().map(|(operation, _)| *operation).collect();

        let count = {
            let mut state = self.state.lock().expect("multiplexer state lock poisoned");

            // One slot is always spoken for by the wakeup pipe.
            if state.count + ops.len() + 1 > self.max_resources {
                return Err(MuxError::Capacity);
            }

            if state.resources.contains_key(&key) {
                return Err(MuxError::AlreadyRegistered);
            }

            let entries: Vec<Entry> = ops
                .into_iter()
                .map(|(operation, callback)| Entry {
                    resource: resource.clone(),
                    operation,
                    callback,
                })
                .collect();

            state.count += entries.len();
            state.resources.insert(key, entries);
            self.mark_dirty(&mut state);

            state.count
        };

        debug!(self.log, "resource added";
               "context" => "add",
               "resource_count" => count);

        let observers = self.observers.lock().expect("multiplexer observer lock poisoned");
        if let Some(on_added) = &observers.on_added {
            for operation in operations {
                on_added(count, &resource, operation);
            }
        }

        Ok(())
    }

    /// Registers a resource for read readiness only.
    #[inline]
    pub fn add_read(&self, resource: Arc<dyn IoResource>, callback: Callback) -> MuxResult<()> {
        self.add(resource, vec![(Operation::Read, callback)])
    }

    /// Registers a resource for write readiness only.
    #[inline]
    pub fn add_write(&self, resource: Arc<dyn IoResource>, callback: Callback) -> MuxResult<()> {
        self.add(resource, vec![(Operation::Write, callback)])
    }

    /// Removes all registrations of a resource.
    pub fn remove(&self, resource: &Arc<dyn IoResource>) -> MuxResult<()> {
        let key = resource_key(resource);

        let (count, removed) = {
            let mut state = self.state.lock().expect("multiplexer state lock poisoned");

            let entries = state.resources.shift_remove(&key).ok_or(MuxError::NotFound)?;
            state.count -= entries.len();
            self.mark_dirty(&mut state);

            let removed: Vec<Operation> = entries.iter().map(|entry| entry.operation).collect();
            (state.count, removed)
        };

        debug!(self.log, "resource removed";
               "context" => "remove",
               "resource_count" => count);

        self.notify_removed(count, resource, &removed);
        Ok(())
    }

    /// Removes a single (resource, operation) registration, dropping the
    /// resource entirely once its last operation is gone.
    pub fn remove_operation(
        &self,
        resource: &Arc<dyn IoResource>,
        operation: Operation,
    ) -> MuxResult<()> {
        let key = resource_key(resource);

        let count = {
            let mut state = self.state.lock().expect("multiplexer state lock poisoned");

            let entries = state.resources.get_mut(&key).ok_or(MuxError::NotFound)?;
            let index = entries
                .iter()
                .position(|entry| entry.operation == operation)
                .ok_or(MuxError::NotFound)?;

            entries.remove(index);
            if entries.is_empty() {
                state.resources.shift_remove(&key);
            }

            state.count -= 1;
            self.mark_dirty(&mut state);
            state.count
        };

        debug!(self.log, "operation removed";
               "context" => "remove",
               "operation" => ?operation,
               "resource_count" => count);

        self.notify_removed(count, resource, &[operation]);
        Ok(())
    }

    fn notify_removed(&self, count: usize, resource: &Arc<dyn IoResource>, operations: &[Operation]) {
        let observers = self.observers.lock().expect("multiplexer observer lock poisoned");
        if let Some(on_removed) = &observers.on_removed {
            for operation in operations {
                on_removed(count, resource, *operation);
            }
        }
    }

    /// Installs an observer invoked after every successful registration.
    pub fn set_on_added(&self, observer: Observer) {
        self.observers
            .lock()
            .expect("multiplexer observer lock poisoned")
            .on_added = Some(observer);
    }

    /// Installs an observer invoked after every removal.
    pub fn set_on_removed(&self, observer: Observer) {
        self.observers
            .lock()
            .expect("multiplexer observer lock poisoned")
            .on_removed = Some(observer);
    }

    /// Number of live registrations, callbacks counted individually.
    pub fn resource_count(&self) -> usize {
        self.state
            .lock()
            .expect("multiplexer state lock poisoned")
            .count
    }

    /// Waits for readiness and dispatches the callbacks of every ready
    /// registration. `timeout_ms < 0` blocks indefinitely. Only one thread
    /// should poll at a time; concurrent callers serialize on an internal
    /// lock.
    pub fn poll(&self, timeout_ms: i32) -> MuxResult<PollStatus> {
        let mut table = self.table.lock().expect("multiplexer poll lock poisoned");

        {
            let mut state = self.state.lock().expect("multiplexer state lock poisoned");

            if state.stop {
                return Ok(PollStatus::Stopped);
            }

            if state.resources.is_empty() {
                return Ok(PollStatus::Empty);
            }

            if state.dirty {
                Self::rebuild(&state, &mut table, self.wake.read_handle());
                state.dirty = false;

                trace!(self.log, "poll table rebuilt";
                       "context" => "poll",
                       "slots" => table.fds.len());
            }
        }

        for pfd in table.fds.iter_mut() {
            pfd.revents = 0;
        }

        let ready = unsafe {
            libc::poll(
                table.fds.as_mut_ptr(),
                table.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(PollStatus::Timeout);
            }
            return Err(MuxError::from(err));
        }

        {
            let state = self.state.lock().expect("multiplexer state lock poisoned");
            if state.stop {
                return Ok(PollStatus::Stopped);
            }
        }

        if ready == 0 {
            return Ok(PollStatus::Timeout);
        }

        let mut remaining = ready as usize;

        // Slot 0 is the wakeup pipe; drain it without dispatching.
        if table.fds[0].revents != 0 {
            let mut drain = [0u8; 64];
            let _ = self.wake.read(&mut drain);
            remaining -= 1;
        }

        for index in 1..table.fds.len() {
            if remaining == 0 {
                break;
            }

            if table.fds[index].revents == 0 {
                continue;
            }

            remaining -= 1;

            let entry = table.dispatch[index - 1].clone();

            trace!(self.log, "dispatching readiness";
                   "context" => "poll",
                   "operation" => ?entry.operation);

            (entry.callback)(self, entry.resource.as_ref());
        }

        Ok(PollStatus::Ready)
    }

    /// Latches the stop flag and wakes any blocked poller; every `poll`
    /// from here on returns `Stopped`.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().expect("multiplexer state lock poisoned");

            if state.stop {
                return;
            }

            state.stop = true;
        }

        let _ = self.wake.write(&[1]);

        debug!(self.log, "multiplexer stopped"; "context" => "stop");
    }

    /// True once `stop` has been requested.
    pub fn is_stopped(&self) -> bool {
        self.state
            .lock()
            .expect("multiplexer state lock poisoned")
            .stop
    }

    fn mark_dirty(&self, state: &mut MuxState) {
        if !state.dirty {
            state.dirty = true;
            let _ = self.wake.write(&[1]);
        }
    }

    fn rebuild(state: &MuxState, table: &mut PollTable, wake_fd: RawFd) {
        table.fds.clear();
        table.dispatch.clear();

        table.fds.push(libc::pollfd {
            fd: wake_fd,
            events: libc::POLLIN,
            revents: 0,
        });

        for entries in state.resources.values() {
            for entry in entries {
                let (fd, events) = match entry.operation {
                    Operation::Read => (entry.resource.read_handle(), libc::POLLIN),
                    Operation::Write => (entry.resource.write_handle(), libc::POLLOUT),
                };

                table.fds.push(libc::pollfd {
                    fd,
                    events,
                    revents: 0,
                });
                table.dispatch.push(entry.clone());
            }
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[inline]
fn resource_key(resource: &Arc<dyn IoResource>) -> usize {
    Arc::as_ptr(resource) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn counting_callback(counter: Arc<AtomicUsize>) -> Callback {
        Arc::new(move |_mux, _res| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn noop_callback() -> Callback {
        Arc::new(|_mux, _res| {})
    }

    #[test]
    fn test_poll_empty() {
        let mux = Multiplexer::with_defaults().unwrap();

        assert_eq!(mux.poll(0).unwrap(), PollStatus::Empty);
    }

    #[test]
    fn test_add_empty_operation_list() {
        let mux = Multiplexer::with_defaults().unwrap();
        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());

        assert_eq!(
            mux.add(pipe, vec![]).unwrap_err(),
            MuxError::InvalidOperationList
        );
    }

    #[test]
    fn test_add_duplicate_operation() {
        let mux = Multiplexer::with_defaults().unwrap();
        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());

        let result = mux.add(
            pipe,
            vec![
                (Operation::Read, noop_callback()),
                (Operation::Read, noop_callback()),
            ],
        );

        assert_eq!(result.unwrap_err(), MuxError::InvalidOperationList);
    }

    #[test]
    fn test_add_twice_fails() {
        let mux = Multiplexer::with_defaults().unwrap();
        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());

        mux.add_read(pipe.clone(), noop_callback()).unwrap();

        assert_eq!(
            mux.add_read(pipe, noop_callback()).unwrap_err(),
            MuxError::AlreadyRegistered
        );
    }

    #[test]
    fn test_remove_unknown_fails() {
        let mux = Multiplexer::with_defaults().unwrap();
        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());

        assert_eq!(mux.remove(&pipe).unwrap_err(), MuxError::NotFound);
    }

    #[test]
    fn test_capacity_limit() {
        // Two slots: the wakeup pipe plus one registration.
        let mux = Multiplexer::new(2, None).unwrap();

        let first: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        mux.add_read(first, noop_callback()).unwrap();

        let second: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        assert_eq!(
            mux.add_read(second, noop_callback()).unwrap_err(),
            MuxError::Capacity
        );
    }

    #[test]
    fn test_poll_dispatches_ready_pipe() {
        let mux = Multiplexer::with_defaults().unwrap();
        let pipe = Arc::new(Pipe::new().unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let resource: Arc<dyn IoResource> = pipe.clone();
        mux.add_read(resource, counting_callback(counter.clone())).unwrap();

        // The add left a wakeup byte behind; the first poll drains it
        // without dispatching.
        assert_eq!(mux.poll(0).unwrap(), PollStatus::Ready);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(mux.poll(0).unwrap(), PollStatus::Timeout);

        pipe.write(&[1]).unwrap();

        assert_eq!(mux.poll(0).unwrap(), PollStatus::Ready);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poll_fairness_over_persistently_ready_resources() {
        let mux = Multiplexer::with_defaults().unwrap();

        let mut counters = Vec::new();
        let mut pipes = Vec::new();

        for _ in 0..4 {
            let pipe = Arc::new(Pipe::new().unwrap());
            pipe.write(&[1]).unwrap();

            let counter = Arc::new(AtomicUsize::new(0));
            let resource: Arc<dyn IoResource> = pipe.clone();
            mux.add_read(resource, counting_callback(counter.clone())).unwrap();

            counters.push(counter);
            pipes.push(pipe);
        }

        // Nothing drains the pipes, so every resource stays ready and every
        // poll dispatches all of them.
        for _ in 0..3 {
            assert_eq!(mux.poll(0).unwrap(), PollStatus::Ready);
        }

        for counter in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 3);
        }
    }

    #[test]
    fn test_add_wakes_blocked_poll() {
        let mux = Arc::new(Multiplexer::with_defaults().unwrap());

        // Park a resource so the poll blocks instead of returning Empty.
        let parked: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        mux.add_read(parked, noop_callback()).unwrap();

        let poller = {
            let mux = mux.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let status = mux.poll(10_000).unwrap();
                (status, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));

        let late: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        mux.add_read(late, noop_callback()).unwrap();

        let (status, elapsed) = poller.join().unwrap();

        // The add must cut the 10s wait short; the wakeup byte is drained
        // without dispatching, so the poll reports Ready with no callbacks.
        assert_eq!(status, PollStatus::Ready);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_stop_wakes_blocked_poll() {
        let mux = Arc::new(Multiplexer::with_defaults().unwrap());

        let parked: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        mux.add_read(parked, noop_callback()).unwrap();

        let poller = {
            let mux = mux.clone();
            thread::spawn(move || mux.poll(10_000).unwrap())
        };

        thread::sleep(Duration::from_millis(50));
        mux.stop();

        assert_eq!(poller.join().unwrap(), PollStatus::Stopped);
        assert_eq!(mux.poll(0).unwrap(), PollStatus::Stopped);
    }

    #[test]
    fn test_remove_takes_effect_on_next_poll() {
        let mux = Multiplexer::with_defaults().unwrap();

        let pipe = Arc::new(Pipe::new().unwrap());
        pipe.write(&[1]).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let resource: Arc<dyn IoResource> = pipe.clone();
        mux.add_read(resource.clone(), counting_callback(counter.clone())).unwrap();

        assert_eq!(mux.poll(0).unwrap(), PollStatus::Ready);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        mux.remove(&resource).unwrap();

        // Still ready at the fd level, but no longer registered; with only
        // the wakeup pipe left the poll short-circuits to Empty.
        assert_eq!(mux.poll(0).unwrap(), PollStatus::Empty);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_remove_from_callback() {
        let mux = Arc::new(Multiplexer::with_defaults().unwrap());

        let pipe = Arc::new(Pipe::new().unwrap());
        pipe.write(&[1]).unwrap();

        let resource: Arc<dyn IoResource> = pipe.clone();
        let registered = resource.clone();
        let fired = Arc::new(AtomicUsize::new(0));

        let callback: Callback = {
            let fired = fired.clone();
            Arc::new(move |mux, _res| {
                fired.fetch_add(1, Ordering::SeqCst);
                mux.remove(&registered).unwrap();
            })
        };

        mux.add_read(resource, callback).unwrap();

        // The pipe is ready on the first poll; its callback fires once and
        // removes the registration from inside the dispatch.
        assert_eq!(mux.poll(0).unwrap(), PollStatus::Ready);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // The callback removed the only registration.
        assert_eq!(mux.poll(0).unwrap(), PollStatus::Empty);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_single_operation() {
        let mux = Multiplexer::with_defaults().unwrap();

        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        mux.add(
            pipe.clone(),
            vec![
                (Operation::Read, noop_callback()),
                (Operation::Write, noop_callback()),
            ],
        )
        .unwrap();

        assert_eq!(mux.resource_count(), 2);

        mux.remove_operation(&pipe, Operation::Write).unwrap();
        assert_eq!(mux.resource_count(), 1);

        // The write registration is already gone.
        assert_eq!(
            mux.remove_operation(&pipe, Operation::Write).unwrap_err(),
            MuxError::NotFound
        );

        // Removing the last operation drops the resource itself.
        mux.remove_operation(&pipe, Operation::Read).unwrap();
        assert_eq!(mux.remove(&pipe).unwrap_err(), MuxError::NotFound);
    }

    #[test]
    fn test_observers_fire_on_membership_changes() {
        let mux = Multiplexer::with_defaults().unwrap();

        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));

        {
            let added = added.clone();
            mux.set_on_added(Box::new(move |_count, _res, _op| {
                added.fetch_add(1, Ordering::SeqCst);
            }));
        }
        {
            let removed = removed.clone();
            mux.set_on_removed(Box::new(move |_count, _res, _op| {
                removed.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let pipe: Arc<dyn IoResource> = Arc::new(Pipe::new().unwrap());
        mux.add(
            pipe.clone(),
            vec![
                (Operation::Read, noop_callback()),
                (Operation::Write, noop_callback()),
            ],
        )
        .unwrap();

        assert_eq!(added.load(Ordering::SeqCst), 2);

        mux.remove(&pipe).unwrap();
        assert_eq!(removed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_read_and_write_registrations_on_one_resource() {
        let mux = Multiplexer::with_defaults().unwrap();

        let pipe = Arc::new(Pipe::new().unwrap());
        let reads = Arc::new(AtomicUsize::new(0));
        let writes = Arc::new(AtomicUsize::new(0));

        let resource: Arc<dyn IoResource> = pipe.clone();
        mux.add(
            resource,
            vec![
                (Operation::Read, counting_callback(reads.clone())),
                (Operation::Write, counting_callback(writes.clone())),
            ],
        )
        .unwrap();

        assert_eq!(mux.resource_count(), 2);

        // An empty pipe is writable but not readable.
        assert_eq!(mux.poll(0).unwrap(), PollStatus::Ready);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert_eq!(writes.load(Ordering::SeqCst), 1);

        pipe.write(&[1]).unwrap();

        assert_eq!(mux.poll(0).unwrap(), PollStatus::Ready);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }
}
