//! Owns the buffer pool and brokers frame allocation plus transmission/
//! reception draining between the link layer and the net services
//! (spec §4.8).

use crate::buffer::{BufferPool, FrameBufferReader, FrameBufferWriter};
use crate::link::queue::{LinkFrameQueue, QueuedFrame};
use crate::link::ProtocolNumber;
use crate::poll::Poll;

pub struct FrameService<'a, const N: usize, const K: usize, const Q: usize> {
    pool: &'a BufferPool<N, K>,
    outbound: LinkFrameQueue<'a, N, K, Q>,
    inbound: LinkFrameQueue<'a, N, K, Q>,
}

impl<'a, const N: usize, const K: usize, const Q: usize> FrameService<'a, N, K, Q> {
    pub fn new(pool: &'a BufferPool<N, K>) -> Self {
        Self { pool, outbound: LinkFrameQueue::new(), inbound: LinkFrameQueue::new() }
    }

    pub fn pool(&self) -> &'a BufferPool<N, K> {
        self.pool
    }

    pub fn outbound_mut(&mut self) -> &mut LinkFrameQueue<'a, N, K, Q> {
        &mut self.outbound
    }

    pub fn inbound_mut(&mut self) -> &mut LinkFrameQueue<'a, N, K, Q> {
        &mut self.inbound
    }

    /// Allocates a buffer of size `>= length`. `Pending` on pool
    /// exhaustion (spec §4.8 "back-pressure").
    pub fn request_frame_writer(&self, length: usize) -> Poll<(FrameBufferReader<'a, N, K>, FrameBufferWriter<'a, N, K>)> {
        match self.pool.allocate(length) {
            Some(pair) => Poll::Ready(pair),
            None => Poll::Pending,
        }
    }

    /// Drains the outbound queue for the first entry matching `predicate`
    /// (e.g. "destined for this medium"), handing it to the caller so it
    /// can push the bytes to a driver.
    pub fn poll_transmission_request(
        &mut self,
        mut predicate: impl FnMut(&QueuedFrame<'a, N, K>) -> bool,
    ) -> Poll<QueuedFrame<'a, N, K>> {
        if let Some(frame) = self.outbound.peek_front() {
            if predicate(frame) {
                return Poll::Ready(self.outbound.pop_front().expect("just peeked"));
            }
        }
        Poll::Pending
    }

    /// Drains the next inbound frame for any protocol; sockets filter by
    /// `protocol_number` themselves (spec §4.11).
    pub fn poll_reception_notification(&mut self) -> Poll<QueuedFrame<'a, N, K>> {
        match self.inbound.pop_front() {
            Some(frame) => Poll::Ready(frame),
            None => Poll::Pending,
        }
    }

    /// Drains the next inbound frame matching a specific protocol number,
    /// leaving frames for other protocols in place.
    pub fn poll_reception_for(&mut self, protocol_number: ProtocolNumber) -> Poll<QueuedFrame<'a, N, K>> {
        if let Some(frame) = self.inbound.peek_front() {
            if frame.protocol_number == protocol_number {
                return Poll::Ready(self.inbound.pop_front().expect("just peeked"));
            }
        }
        Poll::Pending
    }
}
