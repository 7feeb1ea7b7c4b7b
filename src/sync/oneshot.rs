//! One-shot future/promise pair — the only cross-task value-delivery
//! primitive below the socket layer (spec §4.1).
//!
//! Backed by `embassy_sync::signal::Signal`, which already implements the
//! single-slot, single-publisher/single-waiter contract this needs: `signal`
//! stores a value for a later `try_take`, and is safe to call at most once
//! per pair (multiple `set_value` calls simply overwrite the slot, which is
//! never observable here because `Promise::set_value` consumes `self`).

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;

use crate::poll::{Poll, PollOnce};

/// Shared slot. Not exposed directly; split into a `Future`/`Promise` pair
/// by [`channel`].
struct Slot<T> {
    signal: Signal<NoopRawMutex, T>,
    closed: core::cell::Cell<bool>,
}

/// The waiting half. `poll()` returns `Ready(v)` once `Promise::set_value`
/// has been called, and transitions to closed thereafter (subsequent polls
/// are a programming error caught by the `closed` flag degrading to
/// `Pending` instead of panicking, consistent with spec §7: no panics for
/// runtime conditions).
pub struct Future<'a, T> {
    slot: &'a Slot<T>,
}

/// The setting half. Dropping it without calling `set_value` closes the
/// pair; the `Future` side then never becomes `Ready`.
pub struct Promise<'a, T> {
    slot: &'a Slot<T>,
}

impl<'a, T> Promise<'a, T> {
    pub fn set_value(self, value: T) {
        self.slot.signal.signal(value);
    }
}

impl<'a, T> Future<'a, T> {
    pub fn poll(&mut self) -> Poll<T> {
        if self.slot.closed.get() {
            return Poll::Pending;
        }
        match self.slot.signal.try_take() {
            Some(v) => {
                self.slot.closed.set(true);
                Poll::Ready(v)
            }
            None => Poll::Pending,
        }
    }
}

impl<'a, T> PollOnce<T> for Future<'a, T> {
    fn poll_once(&mut self) -> Poll<T> {
        self.poll()
    }
}

/// Storage for a one-shot pair with `'static`-free lifetime: owned by the
/// caller, borrowed by both halves. Mirrors the pool-allocated pattern the
/// rest of the crate uses for cross-task handles (spec §9: no general
/// heap, slot-arena-style ownership).
pub struct Channel<T> {
    slot: Slot<T>,
}

impl<T> Channel<T> {
    pub const fn new() -> Self {
        Self {
            slot: Slot {
                signal: Signal::new(),
                closed: core::cell::Cell::new(false),
            },
        }
    }

    pub fn split(&self) -> (Future<'_, T>, Promise<'_, T>) {
        (Future { slot: &self.slot }, Promise { slot: &self.slot })
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_until_set() {
        let channel = Channel::<u8>::new();
        let (mut future, promise) = channel.split();

        assert_eq!(future.poll(), Poll::Pending);
        promise.set_value(7);
        assert_eq!(future.poll(), Poll::Ready(7));
        // Closed after delivery.
        assert_eq!(future.poll(), Poll::Pending);
    }
}
