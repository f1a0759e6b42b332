//! A background thread driving a [`Multiplexer`]. Registration stays with
//! the shared multiplexer handle; the thread just keeps polling until the
//! stop latch flips.

use crate::config::DEFAULT_MAX_RESOURCE_COUNT;
use crate::error::Result;
use crate::logging::{self, o, trace, Logger};
use crate::mux::{Multiplexer, PollStatus};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Grace interval while the multiplexer has nothing registered; an empty
// poll returns immediately and must not spin.
const IDLE_WAIT: Duration = Duration::from_millis(20);

/// Owns a polling thread and the multiplexer it drives.
pub struct PollerThread {
    mux: Arc<Multiplexer>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PollerThread {
    /// Spawns a poller over a fresh multiplexer with the given capacity.
    pub fn new<'a, L: Into<Option<&'a Logger>>>(
        max_resources: usize,
        log: L,
    ) -> Result<PollerThread> {
        let poller_log = match log.into() {
            Some(log) => log.new(o!()),
            _ => logging::discard(),
        };

        let mux = Arc::new(Multiplexer::new(max_resources, Some(&poller_log))?);

        Ok(PollerThread::over(mux, poller_log))
    }

    /// Spawns a poller with the default capacity.
    pub fn with_defaults() -> Result<PollerThread> {
        PollerThread::new(DEFAULT_MAX_RESOURCE_COUNT, None)
    }

    /// Spawns a poller thread over an existing multiplexer.
    pub fn over(mux: Arc<Multiplexer>, log: Logger) -> PollerThread {
        let thread_mux = mux.clone();

        let thread = thread::spawn(move || loop {
            match thread_mux.poll(-1) {
                Ok(PollStatus::Stopped) => break,
                Ok(PollStatus::Empty) => thread::sleep(IDLE_WAIT),
                Ok(status) => {
                    trace!(log, "poller pass"; "context" => "run", "status" => ?status);
                }
                Err(err) => {
                    logging::error!(log, "poller failure"; "context" => "run", "error" => %err);
                    break;
                }
            }
        });

        PollerThread {
            mux,
            thread: Some(thread),
        }
    }

    /// The multiplexer this thread polls; use it to add and remove
    /// resources while the thread runs.
    #[inline]
    pub fn mux(&self) -> &Arc<Multiplexer> {
        &self.mux
    }

    /// Stops the multiplexer and waits for the thread to return.
    pub fn stop(&mut self) {
        self.mux.stop();

        if let Some(thread) = self.thread.take() {
            thread.join().expect("poller thread panicked");
        }
    }

    /// Lets the thread run on without an owner; it still exits when the
    /// multiplexer is stopped.
    pub fn detach(&mut self) {
        self.thread.take();
    }
}

impl Drop for PollerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::{Callback, IoResource};
    use crate::pipe::Pipe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_background_dispatch() {
        let mut poller = PollerThread::with_defaults().unwrap();

        let pipe = Arc::new(Pipe::new().unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let callback: Callback = {
            let counter = counter.clone();
            Arc::new(move |_mux, _res| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        };

        let resource: Arc<dyn IoResource> = pipe.clone();
        poller.mux().add_read(resource, callback).unwrap();

        pipe.write(&[1]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "background poller never fired");
            thread::sleep(Duration::from_millis(5));
        }

        poller.stop();
    }

    #[test]
    fn test_stop_joins_cleanly() {
        let mut poller = PollerThread::with_defaults().unwrap();

        // Nothing registered; the thread idles on Empty until stopped.
        thread::sleep(Duration::from_millis(50));
        poller.stop();

        assert_eq!(poller.mux().poll(0).unwrap(), PollStatus::Stopped);
    }

    #[test]
    fn test_drop_stops_the_thread() {
        let mux = {
            let poller = PollerThread::with_defaults().unwrap();
            poller.mux().clone()
        };

        assert_eq!(mux.poll(0).unwrap(), PollStatus::Stopped);
    }
}
