//! Kernel timer descriptors registered on the reactor.

use std::os::fd::{AsFd, AsRawFd};
use std::time::Duration;

use mio::Token;
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};

use crate::error::Error;
use crate::event_loop::EventLoop;

/// A timerfd owned by its user and registered on the reactor.
///
/// The descriptor is created and registered on the first arm and kept for
/// the timer's lifetime; re-arming only updates the expiration. The
/// fire-and-drain discipline is: when the reactor reports readiness, call
/// [`Timer::drain`] to consume the expiration count, then act.
pub struct Timer {
    fd: Option<TimerFd>,
}

impl Timer {
    pub fn new() -> Self {
        Self { fd: None }
    }

    /// Arms a periodic expiration every `period`.
    pub fn arm_periodic(
        &mut self,
        event_loop: &EventLoop,
        token: Token,
        period: Duration,
    ) -> Result<(), Error> {
        self.arm(event_loop, token, Expiration::Interval(TimeSpec::from_duration(period)))
    }

    /// Arms a single expiration after `delay`.
    pub fn arm_oneshot(
        &mut self,
        event_loop: &EventLoop,
        token: Token,
        delay: Duration,
    ) -> Result<(), Error> {
        self.arm(event_loop, token, Expiration::OneShot(TimeSpec::from_duration(delay)))
    }

    fn arm(
        &mut self,
        event_loop: &EventLoop,
        token: Token,
        expiration: Expiration,
    ) -> Result<(), Error> {
        if self.fd.is_none() {
            let fd = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_CLOEXEC)?;
            event_loop.register(fd.as_fd().as_raw_fd(), token)?;
            self.fd = Some(fd);
        }

        let Some(fd) = &self.fd else {
            return Err(Error::NotOpen);
        };
        fd.set(expiration, TimerSetTimeFlags::empty())?;
        Ok(())
    }

    /// Stops the timer without releasing the descriptor.
    pub fn disarm(&mut self) -> Result<(), Error> {
        let Some(fd) = &self.fd else {
            return Err(Error::NotOpen);
        };
        fd.unset()?;
        Ok(())
    }

    /// Consumes the expiration count after the reactor reported readiness.
    /// The count itself is discarded; one tick runs per readiness event.
    pub fn drain(&self) {
        if let Some(fd) = &self.fd {
            let _ = fd.wait();
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oneshot_fires_on_the_loop() {
        let mut event_loop = EventLoop::new().unwrap();
        let mut timer = Timer::new();
        timer
            .arm_oneshot(&event_loop, Token(7), Duration::from_millis(5))
            .unwrap();

        let tokens = event_loop.wait(Some(Duration::from_secs(2))).unwrap();
        assert_eq!(tokens, [Token(7)]);
        timer.drain();
    }

    #[test]
    fn test_rearm_reuses_the_descriptor() {
        let mut event_loop = EventLoop::new().unwrap();
        let mut timer = Timer::new();
        timer
            .arm_periodic(&event_loop, Token(3), Duration::from_millis(5))
            .unwrap();
        timer
            .arm_periodic(&event_loop, Token(3), Duration::from_millis(7))
            .unwrap();

        let tokens = event_loop.wait(Some(Duration::from_secs(2))).unwrap();
        assert_eq!(tokens, [Token(3)]);
        timer.drain();

        timer.disarm().unwrap();
    }

    #[test]
    fn test_disarm_unarmed_timer_fails() {
        let mut timer = Timer::new();
        assert!(matches!(timer.disarm(), Err(Error::NotOpen)));
    }
}
