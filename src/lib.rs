//! Cooperative, non-blocking networking core for a multi-radio mesh node.
//!
//! `#![no_std]`, no-`alloc`: every buffer is pooled from a fixed-size
//! `BufferPool`, every collection is `heapless`, and every asynchronous
//! operation is a `poll(now, rand)`-style call the embedding firmware
//! drives from its own tick loop rather than a real `async fn` relying on
//! wakers. See [`app::App`] for the top-level composition and
//! [`app::App::execute`] for the per-tick scheduling order.

#![no_std]

pub mod app;
pub mod buffer;
pub mod frame_service;
pub mod link;
pub mod node;
pub mod poll;
pub mod routing;
pub mod serde;
pub mod socket;
pub mod sync;
pub mod time;

pub use app::App;
