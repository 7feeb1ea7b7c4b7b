//! `Delay` and `Debounce` — the timer primitives every higher layer polls
//! against instead of reading the clock directly.
//!
//! Grounded verbatim on `arduino/lib/nb/src/nb/time.h`.

use crate::poll::Poll;
use crate::time::{Duration, Instant};

/// Fires exactly once, `duration` after construction.
pub struct Delay {
    start: Instant,
    duration: Duration,
}

impl Delay {
    pub fn new(now: Instant, duration: Duration) -> Self {
        Self { start: now, duration }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn poll(&self, now: Instant) -> Poll<()> {
        if now.saturating_duration_since(self.start) >= self.duration {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Re-arms itself on every `Ready`: a rate limiter emitting at most one tick
/// per `duration`.
pub struct Debounce {
    last: Instant,
    duration: Duration,
}

impl Debounce {
    pub fn new(now: Instant, duration: Duration) -> Self {
        Self { last: now, duration }
    }

    pub fn poll(&mut self, now: Instant) -> Poll<()> {
        if now.saturating_duration_since(self.last) >= self.duration {
            self.last = now;
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_fires_once_duration_elapsed() {
        let t0 = Instant::from_millis(0);
        let delay = Delay::new(t0, Duration::from_millis(100));

        assert_eq!(delay.poll(Instant::from_millis(50)), Poll::Pending);
        assert_eq!(delay.poll(Instant::from_millis(100)), Poll::Ready(()));
        assert_eq!(delay.poll(Instant::from_millis(200)), Poll::Ready(()));
    }

    #[test]
    fn debounce_rearms_after_each_fire() {
        let t0 = Instant::from_millis(0);
        let mut debounce = Debounce::new(t0, Duration::from_millis(100));

        assert_eq!(debounce.poll(Instant::from_millis(50)), Poll::Pending);
        assert_eq!(debounce.poll(Instant::from_millis(100)), Poll::Ready(()));
        assert_eq!(debounce.poll(Instant::from_millis(150)), Poll::Pending);
        assert_eq!(debounce.poll(Instant::from_millis(200)), Poll::Ready(()));
    }
}
