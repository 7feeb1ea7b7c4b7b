//! Reference-counted frame-buffer pool (spec §3 "FrameBuffer", §4.2).
//!
//! `FrameBuffer` itself isn't exposed as a standalone type: its state (the
//! byte array, `read_index`/`write_index`, refcount) lives in a pool slot,
//! and applications only ever see the [`pool::FrameBufferReader`] /
//! [`pool::FrameBufferWriter`] handles onto that slot.

pub mod pool;

pub use pool::{BufferPool, FrameBufferReader, FrameBufferWriter};
