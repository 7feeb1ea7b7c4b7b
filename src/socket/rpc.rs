//! RPC socket: request/response with a single in-flight request tracked by
//! a request id (spec §4.11, §4.13; grounded on the original
//! `net/rpc/request_id.h`'s single-outstanding-request contract).
//!
//! Wire form: the first two bytes of the frame payload are the request id
//! (LE), matching the response to the request that spawned it.

use crate::buffer::FrameBufferReader;
use crate::frame_service::FrameService;
use crate::link::queue::QueuedFrame;
use crate::link::{LinkAddress, ProtocolNumber, SendFrameError};
use crate::poll::Poll;
use crate::socket::core_socket::CoreSocket;
use crate::time::{Duration, Instant};

/// A request left unanswered this long is considered abandoned and frees
/// the socket for a new one (spec §4.13 Open Question: no timeout is named
/// explicitly, so this follows the link layer's `DEFAULT_TASK_TIMEOUT`
/// family at a slower, application-tier multiple).
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcError {
    /// A request is already in flight and hasn't timed out yet.
    Busy,
    Queue(SendFrameError),
}

struct InFlight {
    id: RequestId,
    sent_at: Instant,
}

pub struct RpcSocket<'a, const N: usize, const K: usize> {
    core: CoreSocket<'a, N, K>,
    next_id: u16,
    in_flight: Option<InFlight>,
}

impl<'a, const N: usize, const K: usize> RpcSocket<'a, N, K> {
    pub fn new() -> Self {
        Self { core: CoreSocket::new(ProtocolNumber::Rpc), next_id: 0, in_flight: None }
    }

    pub fn is_busy(&self, now: Instant) -> bool {
        self.in_flight.is_some() && !self.has_timed_out(now)
    }

    fn has_timed_out(&self, now: Instant) -> bool {
        match &self.in_flight {
            Some(f) => now.saturating_duration_since(f.sent_at) >= RPC_REQUEST_TIMEOUT,
            None => false,
        }
    }

    pub fn poll_frame_writer<const Q: usize>(
        &self,
        service: &FrameService<'a, N, K, Q>,
        length: usize,
    ) -> Poll<(FrameBufferReader<'a, N, K>, crate::buffer::FrameBufferWriter<'a, N, K>)> {
        self.core.poll_frame_writer(service, length)
    }

    /// Sends `reader`'s frame as the new in-flight request. `reader` must
    /// already carry the request id as its first two bytes, obtained from
    /// the `RequestId` this call returns... the caller is expected to have
    /// pre-reserved the id via [`Self::reserve_request_id`] before writing.
    pub fn reserve_request_id(&mut self, now: Instant) -> Result<RequestId, RpcError> {
        if self.is_busy(now) {
            return Err(RpcError::Busy);
        }
        let id = RequestId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.in_flight = Some(InFlight { id, sent_at: now });
        Ok(id)
    }

    pub fn poll_send_request<const Q: usize>(
        &mut self,
        service: &mut FrameService<'a, N, K, Q>,
        destination: LinkAddress,
        reader: FrameBufferReader<'a, N, K>,
        now: Instant,
    ) -> Result<(), RpcError> {
        self.core.poll_send_frame(service, destination, reader, now).map_err(|e| {
            self.in_flight = None;
            RpcError::Queue(e)
        })
    }

    /// Polls for the response to the currently in-flight request. Frames
    /// tagged with a stale or mismatched request id are discarded, not
    /// delivered (spec §4.13 "single in-flight request").
    pub fn poll_receive_response<const Q: usize>(
        &mut self,
        service: &mut FrameService<'a, N, K, Q>,
        now: Instant,
    ) -> Poll<QueuedFrame<'a, N, K>> {
        if self.has_timed_out(now) {
            self.in_flight = None;
        }
        let Some(expected) = self.in_flight.as_ref().map(|f| f.id) else {
            return Poll::Pending;
        };
        loop {
            match self.core.poll_receive_link_frame(service) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(mut frame) => {
                    let mut header = [0u8; 2];
                    if frame.reader.read(&mut header) != 2 {
                        continue;
                    }
                    if RequestId(u16::from_le_bytes(header)) == expected {
                        self.in_flight = None;
                        return Poll::Ready(frame);
                    }
                }
            }
        }
    }
}

impl<'a, const N: usize, const K: usize> Default for RpcSocket<'a, N, K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::link::LinkAddress;

    #[test]
    fn second_request_refused_while_first_in_flight() {
        let mut rpc: RpcSocket<4, 16> = RpcSocket::new();
        let t0 = Instant::from_millis(0);
        assert!(rpc.reserve_request_id(t0).is_ok());
        assert_eq!(rpc.reserve_request_id(t0), Err(RpcError::Busy));
    }

    #[test]
    fn request_id_reusable_after_timeout() {
        let mut rpc: RpcSocket<4, 16> = RpcSocket::new();
        let t0 = Instant::from_millis(0);
        assert!(rpc.reserve_request_id(t0).is_ok());
        let later = t0 + RPC_REQUEST_TIMEOUT;
        assert!(rpc.reserve_request_id(later).is_ok());
    }

    #[test]
    fn mismatched_response_is_discarded_not_delivered() {
        let pool: BufferPool<4, 16> = BufferPool::new();
        let mut service: FrameService<4, 16, 4> = FrameService::new(&pool);
        let mut rpc: RpcSocket<4, 16> = RpcSocket::new();
        let t0 = Instant::from_millis(0);
        let expected = rpc.reserve_request_id(t0).unwrap();

        // A response tagged with a different id than the in-flight one.
        let (reader, mut writer) = pool.allocate(4).unwrap();
        let wrong_id = RequestId(expected.0.wrapping_add(1));
        writer.write(&wrong_id.0.to_le_bytes());
        writer.write(b"hi");
        service.inbound_mut().push(QueuedFrame {
            protocol_number: ProtocolNumber::Rpc,
            destination: LinkAddress::Uhf(1),
            reader,
            enqueued_at: t0,
        });

        assert!(rpc.poll_receive_response(&mut service, t0).is_pending());
    }
}
