//! A single-threaded mutex with an explicit, droppable guard.
//!
//! Unlike `embassy_sync::mutex::Mutex`, which is awaited, this type is
//! polled for exclusive access exactly once per acquisition (`try_lock`)
//! and is not `Sync` — spec §5 guarantees there is no preemption inside the
//! core, so a borrow flag is all the synchronization that is needed.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

pub struct Mutex<T> {
    value: UnsafeCell<T>,
    locked: core::cell::Cell<bool>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            locked: core::cell::Cell::new(false),
        }
    }

    /// Returns a guard if no other guard is currently outstanding.
    pub fn try_lock(&self) -> Option<Guard<'_, T>> {
        if self.locked.get() {
            None
        } else {
            self.locked.set(true);
            Some(Guard { mutex: self })
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }
}

pub struct Guard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> Deref for Guard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<'a, T> DerefMut for Guard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<'a, T> Drop for Guard<'a, T> {
    fn drop(&mut self) {
        self.mutex.locked.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_then_contended_lock_fails() {
        let m = Mutex::new(0u8);
        let guard = m.try_lock();
        assert!(guard.is_some());
        assert!(m.try_lock().is_none());
    }

    #[test]
    fn drop_releases() {
        let m = Mutex::new(0u8);
        {
            let mut guard = m.try_lock().unwrap();
            *guard = 5;
        }
        let guard = m.try_lock().unwrap();
        assert_eq!(*guard, 5);
    }
}
