//! Tunnel socket: opaque bidirectional pass-through with no framing of its
//! own (spec §4.11, §4.13; grounded on the original `net/tunnel/service.h`,
//! which forwards payloads verbatim between the link layer and whatever
//! higher-level byte stream is tunneled over it).

use crate::buffer::{FrameBufferReader, FrameBufferWriter};
use crate::frame_service::FrameService;
use crate::link::queue::QueuedFrame;
use crate::link::{LinkAddress, ProtocolNumber, SendFrameError};
use crate::poll::Poll;
use crate::socket::core_socket::CoreSocket;
use crate::time::Instant;

pub struct TunnelSocket<'a, const N: usize, const K: usize> {
    core: CoreSocket<'a, N, K>,
}

impl<'a, const N: usize, const K: usize> TunnelSocket<'a, N, K> {
    pub fn new() -> Self {
        Self { core: CoreSocket::new(ProtocolNumber::Tunnel) }
    }

    pub fn poll_frame_writer<const Q: usize>(
        &self,
        service: &FrameService<'a, N, K, Q>,
        length: usize,
    ) -> Poll<(FrameBufferReader<'a, N, K>, FrameBufferWriter<'a, N, K>)> {
        self.core.poll_frame_writer(service, length)
    }

    pub fn poll_send_frame<const Q: usize>(
        &self,
        service: &mut FrameService<'a, N, K, Q>,
        destination: LinkAddress,
        reader: FrameBufferReader<'a, N, K>,
        now: Instant,
    ) -> Result<(), SendFrameError> {
        self.core.poll_send_frame(service, destination, reader, now)
    }

    pub fn poll_receive_frame<const Q: usize>(
        &self,
        service: &mut FrameService<'a, N, K, Q>,
    ) -> Poll<QueuedFrame<'a, N, K>> {
        self.core.poll_receive_link_frame(service)
    }
}

impl<'a, const N: usize, const K: usize> Default for TunnelSocket<'a, N, K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;

    #[test]
    fn forwards_payload_bytes_unmodified() {
        let pool: BufferPool<2, 16> = BufferPool::new();
        let mut service: FrameService<2, 16, 2> = FrameService::new(&pool);
        let tunnel: TunnelSocket<2, 16> = TunnelSocket::new();

        let (reader, mut writer) = tunnel.poll_frame_writer(&service, 4).ready().unwrap();
        writer.write(b"ABCD");
        drop(writer);

        let now = Instant::from_millis(0);
        assert!(tunnel.poll_send_frame(&mut service, LinkAddress::Uhf(2), reader, now).is_ok());

        let queued = service.outbound_mut().pop_front().unwrap();
        let mut buf = [0u8; 4];
        let mut reader = queued.reader;
        assert_eq!(reader.read(&mut buf), 4);
        assert_eq!(&buf, b"ABCD");
    }
}
