//! Outbound link frame queue with time-based eviction (spec §4.3, §4.7;
//! grounded on `arduino/lib/net/src/net/link/constants.h` for the
//! expiration constant and `link/core_link.h`'s enqueue/dequeue contract).

use heapless::Vec;

use crate::buffer::FrameBufferReader;
use crate::link::address::LinkAddress;
use crate::link::frame::ProtocolNumber;
use crate::time::{Duration, Instant};

/// A frame waits at most this long in the outbound queue before it is
/// eligible for eviction to make room for newer traffic.
pub const FRAME_EXPIRATION: Duration = Duration::from_secs(5);

pub struct QueuedFrame<'a, const N: usize, const K: usize> {
    pub protocol_number: ProtocolNumber,
    pub destination: LinkAddress,
    pub reader: FrameBufferReader<'a, N, K>,
    pub enqueued_at: Instant,
}

/// Bounded FIFO of frames waiting to go out over a medium. When full, a
/// push first tries to evict the oldest *expired* entry to make room; if
/// nothing has expired yet the push is refused outright rather than
/// evicting live traffic.
pub struct LinkFrameQueue<'a, const N: usize, const K: usize, const Q: usize> {
    entries: Vec<QueuedFrame<'a, N, K>, Q>,
}

impl<'a, const N: usize, const K: usize, const Q: usize> LinkFrameQueue<'a, N, K, Q> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn oldest_expired_index(&self, now: Instant) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, f)| now.saturating_duration_since(f.enqueued_at) >= FRAME_EXPIRATION)
            .min_by_key(|(_, f)| f.enqueued_at)
            .map(|(idx, _)| idx)
    }

    /// Enqueues a frame, returning `false` (frame dropped, caller signaled)
    /// if the queue is full and nothing is evictable.
    pub fn push(&mut self, frame: QueuedFrame<'a, N, K>) -> bool {
        if self.entries.is_full() {
            match self.oldest_expired_index(frame.enqueued_at) {
                Some(idx) => {
                    self.entries.remove(idx);
                }
                None => {
                    log::warn!("link frame queue full, dropping frame for {:?}", frame.protocol_number);
                    return false;
                }
            }
        }
        let ok = self.entries.push(frame).is_ok();
        if ok {
            log::debug!("link frame enqueued, {} pending", self.entries.len());
        }
        ok
    }

    pub fn pop_front(&mut self) -> Option<QueuedFrame<'a, N, K>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn peek_front(&self) -> Option<&QueuedFrame<'a, N, K>> {
        self.entries.first()
    }

    /// Sweeps expired entries. Returns how many were dropped, so the caller
    /// can surface the count to whatever signaled interest (spec §4.3
    /// "dropped" notification).
    pub fn execute(&mut self, now: Instant) -> usize {
        let mut dropped = 0;
        let mut i = 0;
        while i < self.entries.len() {
            if now.saturating_duration_since(self.entries[i].enqueued_at) >= FRAME_EXPIRATION {
                self.entries.remove(i);
                dropped += 1;
            } else {
                i += 1;
            }
        }
        if dropped > 0 {
            log::debug!("evicted {dropped} expired link frame(s)");
        }
        dropped
    }
}

impl<'a, const N: usize, const K: usize, const Q: usize> Default for LinkFrameQueue<'a, N, K, Q> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;

    fn queued<'a, const N: usize, const K: usize>(
        pool: &'a BufferPool<N, K>,
        enqueued_at: Instant,
    ) -> QueuedFrame<'a, N, K> {
        let (reader, _writer) = pool.allocate(4).unwrap();
        QueuedFrame {
            protocol_number: ProtocolNumber::Rpc,
            destination: LinkAddress::Uhf(1),
            reader,
            enqueued_at,
        }
    }

    #[test]
    fn full_queue_refuses_push_with_nothing_expired() {
        let pool: BufferPool<4, 4> = BufferPool::new();
        let mut queue: LinkFrameQueue<4, 4, 1> = LinkFrameQueue::new();
        let t0 = Instant::from_millis(0);
        assert!(queue.push(queued(&pool, t0)));
        assert!(!queue.push(queued(&pool, t0)));
    }

    #[test]
    fn full_queue_evicts_oldest_expired_to_make_room() {
        let pool: BufferPool<4, 4> = BufferPool::new();
        let mut queue: LinkFrameQueue<4, 4, 1> = LinkFrameQueue::new();
        let t0 = Instant::from_millis(0);
        assert!(queue.push(queued(&pool, t0)));

        let later = t0 + FRAME_EXPIRATION;
        assert!(queue.push(queued(&pool, later)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn execute_sweeps_expired_entries() {
        let pool: BufferPool<4, 4> = BufferPool::new();
        let mut queue: LinkFrameQueue<4, 4, 4> = LinkFrameQueue::new();
        let t0 = Instant::from_millis(0);
        queue.push(queued(&pool, t0));
        queue.push(queued(&pool, t0 + Duration::from_millis(1)));

        let dropped = queue.execute(t0 + FRAME_EXPIRATION);
        assert_eq!(dropped, 2);
        assert!(queue.is_empty());
    }
}
