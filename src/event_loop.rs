//! Readiness-based reactor for the sampler's single task.
//!
//! The contract is small: register a file descriptor under a token, wait
//! for readiness, and keep going until an explicit abort. The abort
//! primitive is an eventfd-backed waker paired with a stop flag, safe to
//! trigger from another thread such as a signal handler's.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::Error;

/// Token reserved for the abort waker.
pub const WAKE_TOKEN: Token = Token(0);

/// Single-threaded epoll wrapper.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl EventLoop {
    pub fn new() -> Result<Self, Error> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        Ok(Self {
            poll,
            events: Events::with_capacity(16),
            stop: Arc::new(AtomicBool::new(false)),
            waker,
        })
    }

    /// Registers `fd` for read readiness under `token`. [`WAKE_TOKEN`] is
    /// reserved.
    pub fn register(&self, fd: RawFd, token: Token) -> Result<(), Error> {
        if token == WAKE_TOKEN {
            return Err(Error::InvalidArgument("token reserved for the waker"));
        }
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token, Interest::READABLE)?;
        Ok(())
    }

    /// Blocks until readiness or abort and returns the ready tokens. The
    /// wake token is consumed internally; callers observe the abort
    /// through [`EventLoop::aborted`].
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<Token>, Error> {
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self
            .events
            .iter()
            .map(|event| event.token())
            .filter(|token| *token != WAKE_TOKEN)
            .collect())
    }

    pub fn aborted(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            stop: Arc::clone(&self.stop),
            waker: Arc::clone(&self.waker),
        }
    }
}

/// Cloneable, thread-safe handle that stops the loop.
#[derive(Clone)]
pub struct AbortHandle {
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl AbortHandle {
    /// Raises the stop flag and wakes the wait call.
    pub fn abort(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_times_out_empty() {
        let mut event_loop = EventLoop::new().unwrap();
        let tokens = event_loop
            .wait(Some(Duration::from_millis(10)))
            .unwrap();
        assert!(tokens.is_empty());
        assert!(!event_loop.aborted());
    }

    #[test]
    fn test_abort_wakes_the_wait() {
        let mut event_loop = EventLoop::new().unwrap();
        let handle = event_loop.abort_handle();

        let waiter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.abort();
        });

        // Blocks until the other thread aborts.
        let tokens = event_loop.wait(None).unwrap();
        assert!(tokens.is_empty());
        assert!(event_loop.aborted());

        waiter.join().unwrap();
    }

    #[test]
    fn test_wake_token_is_reserved() {
        let event_loop = EventLoop::new().unwrap();
        assert!(event_loop.register(0, WAKE_TOKEN).is_err());
    }
}
