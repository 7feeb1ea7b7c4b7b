//! `BufferPool<N, K>` — `N` fixed slots of capacity `K`, each shared by a
//! reader and a writer half via a refcount stored in the slot itself.
//!
//! Grounded on `arduino/lib/memory/src/memory/{rc.h,rc_pool.h,shared.h}`:
//! the original allocates a refcount cell from a fixed pool and hands back
//! `(counter*, value*)`; this port collapses that into `(slab_index, role)`
//! pairs per spec §9's design note, since Rust has no placement-new step
//! requiring the original's separate deferred-init phase.

use core::cell::UnsafeCell;

use crate::poll::Poll;
use crate::serde::{AsyncReadable, AsyncWritable};

struct Slot<const K: usize> {
    used: bool,
    refcount: u8,
    max_size: usize,
    write_index: usize,
    data: [u8; K],
}

impl<const K: usize> Slot<K> {
    const fn empty() -> Self {
        Self {
            used: false,
            refcount: 0,
            max_size: 0,
            write_index: 0,
            data: [0u8; K],
        }
    }
}

pub struct BufferPool<const N: usize, const K: usize> {
    slots: UnsafeCell<[Slot<K>; N]>,
}

// Single-threaded cooperative model only (spec §5): never shared across an
// execution boundary that could race.
impl<const N: usize, const K: usize> BufferPool<N, K> {
    pub fn new() -> Self {
        Self {
            slots: UnsafeCell::new(core::array::from_fn(|_| Slot::empty())),
        }
    }

    fn slots(&self) -> &mut [Slot<K>; N] {
        unsafe { &mut *self.slots.get() }
    }

    /// Allocates a buffer declaring `max_size <= K`. Returns `None` if no
    /// slot is free (spec §4.2: no GC of zero-count entries beyond lazy
    /// reclamation on the next allocate, which here is immediate since
    /// `release` frees the slot synchronously on last-drop).
    pub fn allocate(&self, max_size: usize) -> Option<(FrameBufferReader<'_, N, K>, FrameBufferWriter<'_, N, K>)> {
        debug_assert!(max_size <= K);
        let slots = self.slots();
        let index = slots.iter().position(|s| !s.used)?;
        let slot = &mut slots[index];
        slot.used = true;
        slot.refcount = 2;
        slot.max_size = max_size;
        slot.write_index = 0;

        Some((
            FrameBufferReader { pool: self, index, read_index: 0 },
            FrameBufferWriter { pool: self, index },
        ))
    }

    pub fn slot_count_in_use(&self) -> usize {
        self.slots().iter().filter(|s| s.used).count()
    }

    fn release(&self, index: usize) {
        let slot = &mut self.slots()[index];
        debug_assert!(slot.refcount > 0);
        slot.refcount -= 1;
        if slot.refcount == 0 {
            slot.used = false;
        }
    }
}

impl<const N: usize, const K: usize> Default for BufferPool<N, K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FrameBufferWriter<'a, const N: usize, const K: usize> {
    pool: &'a BufferPool<N, K>,
    index: usize,
}

impl<'a, const N: usize, const K: usize> FrameBufferWriter<'a, N, K> {
    pub fn max_size(&self) -> usize {
        self.pool.slots()[self.index].max_size
    }

    pub fn write_index(&self) -> usize {
        self.pool.slots()[self.index].write_index
    }

    pub fn writable_count(&self) -> usize {
        let slot = &self.pool.slots()[self.index];
        slot.max_size - slot.write_index
    }

    /// Writes as many bytes as fit, returns the count actually written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let slot = &mut self.pool.slots()[self.index];
        let available = slot.max_size - slot.write_index;
        let n = core::cmp::min(available, bytes.len());
        slot.data[slot.write_index..slot.write_index + n].copy_from_slice(&bytes[..n]);
        slot.write_index += n;
        n
    }

    pub fn write_byte(&mut self, byte: u8) -> bool {
        self.write(&[byte]) == 1
    }

    /// Shrinks `max_size` down to the number of bytes actually written, so
    /// trailing declared-but-unused capacity isn't exposed to readers.
    /// Grounded on `net/stream/frame.h`'s `shrink_frame_length_to_fit`.
    pub fn shrink_to_fit(&mut self) {
        let slot = &mut self.pool.slots()[self.index];
        slot.max_size = slot.write_index;
    }

    /// Produces an additional reader aliasing byte 0, visible to later
    /// writes (spec §4.2 "initial reader"): lets a sender's frame be handed
    /// to the driver while the application is still filling the tail.
    pub fn make_initial_reader(&self) -> FrameBufferReader<'a, N, K> {
        self.pool.slots()[self.index].refcount += 1;
        FrameBufferReader { pool: self.pool, index: self.index, read_index: 0 }
    }
}

impl<'a, const N: usize, const K: usize> Drop for FrameBufferWriter<'a, N, K> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

pub struct FrameBufferReader<'a, const N: usize, const K: usize> {
    pool: &'a BufferPool<N, K>,
    index: usize,
    read_index: usize,
}

impl<'a, const N: usize, const K: usize> FrameBufferReader<'a, N, K> {
    pub fn readable_count(&self) -> usize {
        let slot = &self.pool.slots()[self.index];
        slot.write_index - self.read_index
    }

    /// Bytes at or past `max_size` that the writer still intends to
    /// produce. A reader that has consumed everything written so far but
    /// not yet reached `max_size` is still waiting, not at EOF.
    pub fn is_complete(&self) -> bool {
        let slot = &self.pool.slots()[self.index];
        self.read_index >= slot.max_size
    }

    pub fn poll_read_byte(&mut self) -> Poll<u8> {
        let slot = &self.pool.slots()[self.index];
        if self.read_index < slot.write_index {
            let byte = slot.data[self.read_index];
            self.read_index += 1;
            Poll::Ready(byte)
        } else {
            Poll::Pending
        }
    }

    /// Reads up to `buf.len()` bytes, returning the number actually read
    /// (possibly zero if nothing is available yet).
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let slot = &self.pool.slots()[self.index];
        let available = slot.write_index - self.read_index;
        let n = core::cmp::min(available, buf.len());
        buf[..n].copy_from_slice(&slot.data[self.read_index..self.read_index + n]);
        self.read_index += n;
        n
    }
}

impl<'a, const N: usize, const K: usize> Drop for FrameBufferReader<'a, N, K> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

/// Lets the serde combinators (built against [`AsyncReadable`]/
/// [`AsyncWritable`]) run directly against a pooled frame buffer, e.g. to
/// decode a [`crate::routing::LinkStateFrame`] out of a received frame's
/// payload without an intermediate copy.
impl<'a, const N: usize, const K: usize> AsyncReadable for FrameBufferReader<'a, N, K> {
    fn cursor(&self) -> usize {
        self.read_index
    }

    fn rewind(&mut self, cursor: usize) {
        self.read_index = cursor;
    }

    fn poll_readable(&mut self) -> Poll<()> {
        if self.readable_count() > 0 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    fn read_unchecked(&mut self) -> u8 {
        let slot = &self.pool.slots()[self.index];
        let byte = slot.data[self.read_index];
        self.read_index += 1;
        byte
    }
}

impl<'a, const N: usize, const K: usize> AsyncWritable for FrameBufferWriter<'a, N, K> {
    fn poll_writable(&mut self) -> Poll<()> {
        if self.writable_count() > 0 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    fn write_unchecked(&mut self, byte: u8) {
        self.write_byte(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_conserves_pool_slots() {
        let pool: BufferPool<2, 16> = BufferPool::new();
        {
            let (_r1, _w1) = pool.allocate(8).unwrap();
            let (_r2, _w2) = pool.allocate(8).unwrap();
            assert!(pool.allocate(8).is_none());
            assert_eq!(pool.slot_count_in_use(), 2);
        }
        assert_eq!(pool.slot_count_in_use(), 0);
        assert!(pool.allocate(8).is_some());
    }

    #[test]
    fn reader_trails_writer_and_blocks() {
        let pool: BufferPool<1, 16> = BufferPool::new();
        let (mut reader, mut writer) = pool.allocate(5).unwrap();

        assert_eq!(reader.poll_read_byte(), Poll::Pending);
        writer.write(b"HE");
        assert_eq!(reader.poll_read_byte(), Poll::Ready(b'H'));
        assert_eq!(reader.poll_read_byte(), Poll::Ready(b'E'));
        assert_eq!(reader.poll_read_byte(), Poll::Pending);
        writer.write(b"LLO");
        assert_eq!(reader.readable_count(), 3);
    }

    #[test]
    fn initial_reader_aliases_from_zero() {
        let pool: BufferPool<1, 16> = BufferPool::new();
        let (_reader, mut writer) = pool.allocate(5).unwrap();
        writer.write(b"HEL");

        let mut initial = writer.make_initial_reader();
        assert_eq!(initial.readable_count(), 3);
        writer.write(b"LO");
        assert_eq!(initial.readable_count(), 5);
        let mut buf = [0u8; 5];
        let n = initial.read(&mut buf);
        assert_eq!(n, 5);
        assert_eq!(&buf, b"HELLO");
    }

    #[test]
    fn shrink_to_fit_caps_visible_length() {
        let pool: BufferPool<1, 16> = BufferPool::new();
        let (mut reader, mut writer) = pool.allocate(10).unwrap();
        writer.write(b"HI");
        writer.shrink_to_fit();
        assert!(reader.is_complete() == false);
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf), 2);
        assert!(reader.is_complete());
    }
}
