//! A mutex exposed as a pollable readiness source.
//!
//! The mutex is paired with a pipe: releasing the lock writes one signal
//! byte, blocked acquirers read one byte before retrying. An event loop can
//! therefore register the pipe's read end with the multiplexer and wait for
//! socket readiness and lock availability in the same `poll`.

use crate::error::{Error, Result};
use crate::pipe::Pipe;
use std::io;
use std::ops::{Deref, DerefMut};
use std::os::unix::io::RawFd;
use std::sync::{Mutex, MutexGuard, TryLockError};

pub struct Lockable<T> {
    pipe: Pipe,
    inner: Mutex<T>,
}

impl<T> Lockable<T> {
    pub fn new(value: T) -> Result<Lockable<T>> {
        let pipe = Pipe::new()?;
        // A full signal pipe already carries enough wakeups; releasing must
        // never block on it.
        pipe.set_write_nonblocking(true)?;

        Ok(Lockable {
            pipe,
            inner: Mutex::new(value),
        })
    }

    /// The descriptor that becomes readable when the lock was released.
    #[inline]
    pub fn signal_handle(&self) -> RawFd {
        self.pipe.read_handle()
    }

    /// Attempts to take the lock without touching the signal pipe.
    pub fn try_lock(&self) -> Option<LockableGuard<T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(LockableGuard {
                guard: Some(guard),
                owner: self,
            }),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(_)) => panic!("lockable resource poisoned"),
        }
    }

    /// Takes the lock, waiting on the signal pipe while it is contended.
    /// Fails only if the signal pipe was closed underneath the waiters.
    pub fn lock(&self) -> Result<LockableGuard<T>> {
        if let Some(guard) = self.try_lock() {
            return Ok(guard);
        }

        loop {
            let mut signal = [0u8; 1];
            let (_, open) = self.pipe.read(&mut signal)?;

            if !open {
                return Err(Error::Io(io::ErrorKind::BrokenPipe));
            }

            // Another waiter may have won the race; wait for the next
            // signal in that case.
            if let Some(guard) = self.try_lock() {
                return Ok(guard);
            }
        }
    }
}

/// Holds the lock; dropping releases the mutex and signals one waiter.
pub struct LockableGuard<'a, T> {
    guard: Option<MutexGuard<'a, T>>,
    owner: &'a Lockable<T>,
}

impl<'a, T> Deref for LockableGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.guard.as_ref().expect("guard accessed after release")
    }
}

impl<'a, T> DerefMut for LockableGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_mut().expect("guard accessed after release")
    }
}

impl<'a, T> Drop for LockableGuard<'a, T> {
    fn drop(&mut self) {
        // Release the mutex before the signal, otherwise the woken waiter
        // would immediately fail its try_lock.
        self.guard.take();
        let _ = self.owner.pipe.write(&[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_uncontended_lock() {
        let lockable = Lockable::new(5u32).unwrap();

        {
            let mut guard = lockable.lock().unwrap();
            *guard += 1;
        }

        assert_eq!(*lockable.lock().unwrap(), 6);
    }

    #[test]
    fn test_try_lock_contention() {
        let lockable = Lockable::new(()).unwrap();

        let held = lockable.try_lock().unwrap();
        assert!(lockable.try_lock().is_none());
        drop(held);

        assert!(lockable.try_lock().is_some());
    }

    #[test]
    fn test_lock_blocks_until_release() {
        let lockable = Arc::new(Lockable::new(0u32).unwrap());

        let guard = lockable.lock().unwrap();

        let waiter = {
            let lockable = lockable.clone();
            thread::spawn(move || {
                let mut guard = lockable.lock().unwrap();
                *guard += 1;
                *guard
            })
        };

        thread::sleep(Duration::from_millis(50));
        drop(guard);

        assert_eq!(waiter.join().unwrap(), 1);
    }

    #[test]
    fn test_many_contending_threads() {
        let lockable = Arc::new(Lockable::new(0u64).unwrap());
        let mut workers = Vec::new();

        for _ in 0..8 {
            let lockable = lockable.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..100 {
                    let mut guard = lockable.lock().unwrap();
                    *guard += 1;
                }
            }));
        }

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(*lockable.lock().unwrap(), 800);
    }

    #[test]
    fn test_release_makes_signal_pipe_readable() {
        let lockable = Lockable::new(()).unwrap();

        let guard = lockable.lock().unwrap();
        drop(guard);

        // The release wrote a signal byte; a fresh reader sees it.
        let mut signal = [0u8; 1];
        let (received, open) = lockable.pipe.read(&mut signal).unwrap();

        assert_eq!(received, 1);
        assert!(open);
    }
}
