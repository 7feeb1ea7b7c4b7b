//! Observer socket: receive-only delivery of publish frames (spec §4.11,
//! §4.13; grounded on the original `net/observer/frame/subscription.h`,
//! where a subscriber only ever consumes, never emits, notifications).

use crate::frame_service::FrameService;
use crate::link::queue::QueuedFrame;
use crate::link::ProtocolNumber;
use crate::poll::Poll;
use crate::socket::core_socket::CoreSocket;

pub struct ObserverSocket<'a, const N: usize, const K: usize> {
    core: CoreSocket<'a, N, K>,
}

impl<'a, const N: usize, const K: usize> ObserverSocket<'a, N, K> {
    pub fn new() -> Self {
        Self { core: CoreSocket::new(ProtocolNumber::Observer) }
    }

    /// The only operation this socket exposes: drain the next published
    /// frame addressed to this node's observer protocol number.
    pub fn poll_receive_frame<const Q: usize>(
        &self,
        service: &mut FrameService<'a, N, K, Q>,
    ) -> Poll<QueuedFrame<'a, N, K>> {
        self.core.poll_receive_link_frame(service)
    }
}

impl<'a, const N: usize, const K: usize> Default for ObserverSocket<'a, N, K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::link::LinkAddress;
    use crate::time::Instant;

    #[test]
    fn delivers_published_frame() {
        let pool: BufferPool<2, 16> = BufferPool::new();
        let mut service: FrameService<2, 16, 2> = FrameService::new(&pool);
        let observer: ObserverSocket<2, 16> = ObserverSocket::new();

        let (reader, _writer) = pool.allocate(3).unwrap();
        service.inbound_mut().push(QueuedFrame {
            protocol_number: ProtocolNumber::Observer,
            destination: LinkAddress::Uhf(1),
            reader,
            enqueued_at: Instant::from_millis(0),
        });

        assert!(observer.poll_receive_frame(&mut service).is_ready());
        assert!(observer.poll_receive_frame(&mut service).is_pending());
    }
}
