//! Core socket: the shared machinery every protocol-specific socket wraps
//! (spec §4.11; grounded on the original `net/rpc/request_id.h` family's
//! shared base, the "core socket" named explicitly in the GLOSSARY).

use crate::buffer::{FrameBufferReader, FrameBufferWriter};
use crate::frame_service::FrameService;
use crate::link::queue::QueuedFrame;
use crate::link::{LinkAddress, ProtocolNumber, SendFrameError};
use crate::poll::Poll;
use crate::sync::DelayPool;
use crate::time::{Duration, Instant};

/// Per-socket egress pacing pool capacity (spec §4.11 "per-socket
/// `DelayPool`").
pub const DELAY_POOL_CAPACITY: usize = 8;

pub struct CoreSocket<'a, const N: usize, const K: usize> {
    protocol_number: ProtocolNumber,
    delaying: DelayPool<QueuedFrame<'a, N, K>, DELAY_POOL_CAPACITY>,
}

impl<'a, const N: usize, const K: usize> CoreSocket<'a, N, K> {
    pub fn new(protocol_number: ProtocolNumber) -> Self {
        Self { protocol_number, delaying: DelayPool::new() }
    }

    pub fn protocol_number(&self) -> ProtocolNumber {
        self.protocol_number
    }

    pub fn poll_frame_writer<const Q: usize>(
        &self,
        service: &FrameService<'a, N, K, Q>,
        length: usize,
    ) -> Poll<(FrameBufferReader<'a, N, K>, FrameBufferWriter<'a, N, K>)> {
        service.request_frame_writer(length)
    }

    /// Drains the link inbound queue for this socket's own protocol number.
    pub fn poll_receive_link_frame<const Q: usize>(
        &self,
        service: &mut FrameService<'a, N, K, Q>,
    ) -> Poll<QueuedFrame<'a, N, K>> {
        let frame = service.poll_reception_for(self.protocol_number);
        if frame.is_ready() {
            log::trace!("{:?} socket received frame", self.protocol_number);
        }
        frame
    }

    pub fn poll_push_delaying_frame(&mut self, frame: QueuedFrame<'a, N, K>, delay: Duration, now: Instant) -> bool {
        self.delaying.push(frame, delay, now)
    }

    pub fn poll_receive_frame(&mut self, now: Instant) -> Poll<QueuedFrame<'a, N, K>> {
        self.delaying.poll_pop_expired(now)
    }

    /// Hands a frame to the link layer's outbound queue. Fails with
    /// `QueueFull` rather than blocking (spec §4.11, §7).
    pub fn poll_send_frame<const Q: usize>(
        &self,
        service: &mut FrameService<'a, N, K, Q>,
        destination: LinkAddress,
        reader: FrameBufferReader<'a, N, K>,
        now: Instant,
    ) -> Result<(), SendFrameError> {
        log::trace!("{:?} socket sending frame to {:?}", self.protocol_number, destination);
        let queued = QueuedFrame { protocol_number: self.protocol_number, destination, reader, enqueued_at: now };
        if service.outbound_mut().push(queued) {
            Ok(())
        } else {
            Err(SendFrameError::QueueFull)
        }
    }
}
