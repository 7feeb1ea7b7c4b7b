//! Cooperative, non-blocking completion type.
//!
//! Every asynchronous operation in this crate exposes `poll(...) -> Poll<T>`
//! instead of a real `async fn`. `Pending` is the only legal interruption: a
//! component that returns it promises it made no observable progress the
//! caller needs to unwind, and the caller is free to call `poll` again later
//! (typically on the next tick).

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll as StdPoll, Waker};

/// Sum of `{Pending, Ready(T)}`. `Ready(())` is the unit completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a Poll<T> that is not inspected silently drops a completed value"]
pub enum Poll<T> {
    Pending,
    Ready(T),
}

pub use Poll::{Pending, Ready};

impl<T> Poll<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Poll::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Poll::Pending)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Poll<U> {
        match self {
            Poll::Ready(v) => Poll::Ready(f(v)),
            Poll::Pending => Poll::Pending,
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Poll<U>) -> Poll<U> {
        match self {
            Poll::Ready(v) => f(v),
            Poll::Pending => Poll::Pending,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Poll::Ready(v) => v,
            Poll::Pending => default,
        }
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Poll::Ready(v) => Some(v),
            Poll::Pending => None,
        }
    }
}

/// Returns the unit-ready value. Mirrors the original `nb::ready()`.
pub fn ready() -> Poll<()> {
    Poll::Ready(())
}

/// Early-return `Pending` from the enclosing function unless the given
/// sub-poll is `Ready`, otherwise binds the inner value. Mirrors the
/// original `POLL_UNWRAP_OR_RETURN`.
#[macro_export]
macro_rules! poll {
    ($e:expr) => {
        match $e {
            $crate::poll::Poll::Ready(v) => v,
            $crate::poll::Poll::Pending => return $crate::poll::Poll::Pending,
        }
    };
}

/// Anything that can be driven by repeated, externally-scheduled `poll`
/// calls to eventually produce a `T`. This is the trait bound the rest of
/// the crate programs against — not `core::future::Future` — because the
/// caller supplies time/rand explicitly rather than relying on a waker.
pub trait PollOnce<T> {
    fn poll_once(&mut self) -> Poll<T>;
}

/// Thin adapter exposing a [`PollOnce`] type as a real `core::future::Future`,
/// for hosts that prefer `.await` over manually re-polling. The adapter
/// itself never registers for a wakeup; it is meant to be driven by an
/// executor that simply polls eagerly (as a host test harness might), not as
/// the core scheduler's main driving mechanism.
pub struct FutureAdapter<P, T> {
    inner: P,
    _marker: core::marker::PhantomData<T>,
}

impl<P, T> FutureAdapter<P, T> {
    pub fn new(inner: P) -> Self {
        Self { inner, _marker: core::marker::PhantomData }
    }
}

impl<T: Unpin, P: PollOnce<T> + Unpin> Future for FutureAdapter<P, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> StdPoll<T> {
        let this = self.get_mut();
        match this.inner.poll_once() {
            Poll::Ready(v) => StdPoll::Ready(v),
            Poll::Pending => {
                cx.waker().wake_by_ref();
                StdPoll::Pending
            }
        }
    }
}

/// A `Waker` that does nothing, for tests that need to construct a
/// `Context` without a real executor behind it.
pub fn noop_waker() -> Waker {
    use core::task::{RawWaker, RawWakerVTable};

    fn clone(_: *const ()) -> RawWaker {
        raw_waker()
    }
    fn wake(_: *const ()) {}
    fn wake_by_ref(_: *const ()) {}
    fn drop(_: *const ()) {}

    fn raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);
        RawWaker::new(core::ptr::null(), &VTABLE)
    }

    unsafe { Waker::from_raw(raw_waker()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_and_and_then() {
        let p: Poll<u8> = Poll::Ready(3);
        assert_eq!(p.map(|v| v + 1), Poll::Ready(4));
        assert_eq!(Poll::<u8>::Pending.map(|v| v + 1), Poll::Pending);

        let p: Poll<u8> = Poll::Ready(3);
        assert_eq!(p.and_then(|v| Poll::Ready(v * 2)), Poll::Ready(6));
    }

    struct Countdown(u8);
    impl PollOnce<u8> for Countdown {
        fn poll_once(&mut self) -> Poll<u8> {
            if self.0 == 0 {
                Poll::Ready(42)
            } else {
                self.0 -= 1;
                Poll::Pending
            }
        }
    }

    #[test]
    fn future_adapter_eventually_completes() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = FutureAdapter::new(Countdown(2));
        let mut fut = Pin::new(&mut fut);

        assert_eq!(fut.as_mut().poll(&mut cx), StdPoll::Pending);
        assert_eq!(fut.as_mut().poll(&mut cx), StdPoll::Pending);
        assert_eq!(fut.as_mut().poll(&mut cx), StdPoll::Ready(42));
    }
}
