//! Top-level node composition: owns the buffer pool's frame service, the
//! (at most one, auto-detected) medium driver, and every net/application
//! service layered on top, and drives them all from one `execute` tick
//! (spec §4.1, §4.12).

use crate::buffer::{BufferPool, FrameBufferReader};
use crate::frame_service::FrameService;
use crate::link::media::MediaDetector;
use crate::link::queue::QueuedFrame;
use crate::link::serial::SerialDriver;
use crate::link::uhf::UhfDriver;
use crate::link::wifi::WifiDriver;
use crate::link::{LinkAddress, Measurement, ProtocolNumber, SendFrameError};
use crate::node::{
    Destination, DynamicCostUpdater, LocalNode, LocalNodeConfig, NeighborTable, NodeId, NotificationService, Source,
};
use crate::poll::Poll;
use crate::routing::{
    accept_and_should_rebroadcast, InboundDisposition, LinkStateDeserializer, LinkStateFrame, LinkStateSerializer,
    NodeIndex, RoutingHeader, RoutingHeaderDeserializer, RoutingHeaderSerializer, RoutingSocket,
    ROUTING_HEADER_WIRE_LEN,
};
use crate::serde::{AsyncDeserialize, AsyncReadable, AsyncWritable};
use crate::socket::{ObserverSocket, RpcSocket, TunnelSocket};
use crate::time::{Instant, Rand};

/// Owns one node's whole runtime: the frame service and its pool, whichever
/// medium driver auto-detection settles on, the neighbor/routing/cost
/// services, and the three application sockets. Generic over the three
/// possible stream types so the embedding firmware supplies its own
/// UART/SPI/whatever transports; at most one of `uhf`/`wifi`/`serial` is
/// ever actually driven once the medium is known (spec §4.7).
pub struct App<'a, SU, SW, SS, const N: usize, const K: usize, const Q: usize, const P: usize, const M: usize> {
    service: FrameService<'a, N, K, Q>,
    detector: MediaDetector,
    uhf: Option<UhfDriver<'a, SU, N, K>>,
    wifi: Option<WifiDriver<'a, SW, N, K>>,
    serial: Option<SerialDriver<'a, SS, N, K, P>>,
    local_node: LocalNode,
    neighbors: NeighborTable<M>,
    notifications: NotificationService,
    dynamic_cost: DynamicCostUpdater,
    measurement: Measurement,
    routing: RoutingSocket<M>,
    node_index: NodeIndex<M>,
    rpc: RpcSocket<'a, N, K>,
    observer: ObserverSocket<'a, N, K>,
    tunnel: TunnelSocket<'a, N, K>,
}

impl<'a, SU, SW, SS, const N: usize, const K: usize, const Q: usize, const P: usize, const M: usize>
    App<'a, SU, SW, SS, N, K, Q, P, M>
where
    SU: AsyncReadable + AsyncWritable,
    SW: AsyncReadable + AsyncWritable,
    SS: AsyncReadable + AsyncWritable,
{
    pub fn new(pool: &'a BufferPool<N, K>, config: LocalNodeConfig, now: Instant) -> Self {
        Self {
            service: FrameService::new(pool),
            detector: MediaDetector::new(),
            uhf: None,
            wifi: None,
            serial: None,
            local_node: LocalNode::new(config),
            neighbors: NeighborTable::new(),
            notifications: NotificationService::new(),
            dynamic_cost: DynamicCostUpdater::new(now),
            measurement: Measurement::new(),
            routing: RoutingSocket::new(),
            node_index: NodeIndex::new(),
            rpc: RpcSocket::new(),
            observer: ObserverSocket::new(),
            tunnel: TunnelSocket::new(),
        }
    }

    pub fn with_uhf(mut self, stream: SU) -> Self {
        self.uhf = Some(UhfDriver::new(stream, self.service.pool()));
        self
    }

    pub fn with_wifi(mut self, stream: SW) -> Self {
        self.wifi = Some(WifiDriver::new(stream, self.service.pool()));
        self
    }

    pub fn with_serial(mut self, stream: SS, preamble: [u8; P], self_addr: u8) -> Self {
        self.serial = Some(SerialDriver::new(stream, self.service.pool(), preamble, self_addr));
        self
    }

    pub fn service(&self) -> &FrameService<'a, N, K, Q> {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut FrameService<'a, N, K, Q> {
        &mut self.service
    }

    pub fn local_node(&self) -> &LocalNode {
        &self.local_node
    }

    pub fn neighbors(&self) -> &NeighborTable<M> {
        &self.neighbors
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationService {
        &mut self.notifications
    }

    pub fn routing_mut(&mut self) -> &mut RoutingSocket<M> {
        &mut self.routing
    }

    pub fn node_index_mut(&mut self) -> &mut NodeIndex<M> {
        &mut self.node_index
    }

    pub fn rpc_mut(&mut self) -> &mut RpcSocket<'a, N, K> {
        &mut self.rpc
    }

    pub fn observer(&self) -> &ObserverSocket<'a, N, K> {
        &self.observer
    }

    pub fn tunnel(&self) -> &TunnelSocket<'a, N, K> {
        &self.tunnel
    }

    pub fn uhf_mut(&mut self) -> Option<&mut UhfDriver<'a, SU, N, K>> {
        self.uhf.as_mut()
    }

    pub fn wifi_mut(&mut self) -> Option<&mut WifiDriver<'a, SW, N, K>> {
        self.wifi.as_mut()
    }

    pub fn serial_mut(&mut self) -> Option<&mut SerialDriver<'a, SS, N, K, P>> {
        self.serial.as_mut()
    }

    fn local_source(&self) -> Poll<Source> {
        match self.local_node.poll_info() {
            Poll::Ready(info) => Poll::Ready(info.source),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Sends an Rpc/Observer/Tunnel payload through the routing socket
    /// (spec §4.11): injects the routing header, then resolves a
    /// first-hop neighbor via gateway resolution (or floods every known
    /// neighbor for [`Destination::Broadcast`]) rather than handing the
    /// link layer a bare application-supplied address.
    pub fn poll_send_app_frame(
        &mut self,
        protocol: ProtocolNumber,
        destination: Destination,
        payload: &[u8],
        rand: &mut impl Rand,
        now: Instant,
    ) -> Result<(), SendFrameError> {
        let Poll::Ready(local) = self.local_source() else {
            return Err(SendFrameError::QueueFull);
        };
        let header = self.routing.prepare_outbound(rand, local, destination);

        let Poll::Ready((initial_reader, mut writer)) =
            self.service.request_frame_writer(ROUTING_HEADER_WIRE_LEN + payload.len())
        else {
            return Err(SendFrameError::QueueFull);
        };
        drop(initial_reader);
        let mut serializer = RoutingHeaderSerializer::new(&header);
        let _ = serializer.poll_serialize(&mut writer);
        writer.write(payload);

        if matches!(destination, Destination::Broadcast) {
            let mut sent = false;
            for neighbor in self.neighbors.iter() {
                let queued = QueuedFrame {
                    protocol_number: protocol,
                    destination: neighbor.link_address,
                    reader: writer.make_initial_reader(),
                    enqueued_at: now,
                };
                if self.service.outbound_mut().push(queued) {
                    sent = true;
                }
            }
            return if sent { Ok(()) } else { Err(SendFrameError::QueueFull) };
        }

        let dst_node_id = match destination {
            Destination::NodeId(id) | Destination::NodeIdAndClusterId(id, _) => id,
            // No per-cluster vertex exists in the adjacency graph to
            // resolve a gateway against; a bare cluster destination with
            // no node id can't be routed.
            Destination::ClusterId(_) | Destination::Broadcast => return Err(SendFrameError::QueueFull),
        };
        let Some(next_hop) = self.resolve_first_hop(local.node_id, dst_node_id) else {
            return Err(SendFrameError::QueueFull);
        };

        let queued = QueuedFrame {
            protocol_number: protocol,
            destination: next_hop,
            reader: writer.make_initial_reader(),
            enqueued_at: now,
        };
        if self.service.outbound_mut().push(queued) {
            Ok(())
        } else {
            Err(SendFrameError::QueueFull)
        }
    }

    /// Drains routed application traffic for `protocol`: decrements hop
    /// count and consults the flood cache via the routing socket, best-
    /// effort forwarding frames addressed elsewhere toward their resolved
    /// next hop instead of handing them to the caller (spec §4.11).
    pub fn poll_receive_app_frame(&mut self, protocol: ProtocolNumber, now: Instant) -> Poll<QueuedFrame<'a, N, K>> {
        loop {
            let Poll::Ready(frame) = self.service.poll_reception_for(protocol) else {
                return Poll::Pending;
            };
            let Poll::Ready(local) = self.local_source() else {
                continue;
            };
            let mut reader = frame.reader;
            let mut deserializer = RoutingHeaderDeserializer::new();
            let mut header = match deserializer.poll_deserialize(&mut reader) {
                Poll::Ready(Ok(header)) => header,
                // Too short to carry a routing header, or an unrecognized
                // destination tag: malformed, simply invisible (spec §7).
                _ => continue,
            };

            let Some(src_vertex) = self.node_index.vertex_for(local.node_id) else {
                continue;
            };
            let dst_vertex = match header.destination {
                Destination::NodeId(id) | Destination::NodeIdAndClusterId(id, _) => self.node_index.vertex_for(id),
                Destination::Broadcast | Destination::ClusterId(_) => None,
            };

            match self.routing.handle_inbound(&mut header, local, src_vertex, dst_vertex) {
                InboundDisposition::DeliverLocal => {
                    return Poll::Ready(QueuedFrame {
                        protocol_number: frame.protocol_number,
                        destination: frame.destination,
                        reader,
                        enqueued_at: frame.enqueued_at,
                    });
                }
                InboundDisposition::Seen | InboundDisposition::Drop => continue,
                InboundDisposition::Rebroadcast(next_hop_vertex) => {
                    self.forward_routed_frame(protocol, &header, &mut reader, next_hop_vertex, now);
                    continue;
                }
            }
        }
    }

    fn resolve_first_hop(&mut self, local_node_id: NodeId, dst_node_id: NodeId) -> Option<LinkAddress> {
        let src_vertex = self.node_index.vertex_for(local_node_id)?;
        let dst_vertex = self.node_index.vertex_for(dst_node_id)?;
        let next_hop_vertex = self.routing.resolve_next_hop(src_vertex, dst_vertex)?;
        let next_hop_id = self.node_index.node_id_of(next_hop_vertex)?;
        self.neighbors.find(next_hop_id).map(|n| n.link_address)
    }

    /// Re-serializes `header` (hop count already incremented by
    /// [`RoutingSocket::handle_inbound`]) followed by `reader`'s remaining
    /// payload bytes into a fresh buffer addressed to the resolved next
    /// hop.
    fn forward_routed_frame(
        &mut self,
        protocol: ProtocolNumber,
        header: &RoutingHeader,
        reader: &mut FrameBufferReader<'a, N, K>,
        next_hop_vertex: usize,
        now: Instant,
    ) {
        let Some(next_hop_id) = self.node_index.node_id_of(next_hop_vertex) else { return };
        let Some(link_address) = self.neighbors.find(next_hop_id).map(|n| n.link_address) else { return };

        let remaining = reader.readable_count();
        let Poll::Ready((initial_reader, mut writer)) =
            self.service.request_frame_writer(ROUTING_HEADER_WIRE_LEN + remaining)
        else {
            return;
        };
        drop(initial_reader);
        let mut serializer = RoutingHeaderSerializer::new(header);
        let _ = serializer.poll_serialize(&mut writer);

        let mut byte = [0u8; 1];
        while reader.read(&mut byte) == 1 {
            writer.write(&byte);
        }

        let queued = QueuedFrame { protocol_number: protocol, destination: link_address, reader: writer.make_initial_reader(), enqueued_at: now };
        let _ = self.service.outbound_mut().push(queued);
    }

    /// One cooperative tick: media service, then net service, then the
    /// outbound queue's time-based eviction sweep (spec §4.12).
    pub fn execute(&mut self, now: Instant, rand: &mut impl Rand) {
        self.poll_media(now);
        self.drive_media(now, rand);
        self.drive_net_services(now);
        self.service.outbound_mut().execute(now);
        self.service.inbound_mut().execute(now);
    }

    fn poll_media(&mut self, now: Instant) {
        if self.detector.poll_media_detection(now).is_ready() {
            return;
        }
        if let Some(uhf) = &mut self.uhf {
            uhf.poll_probe(&mut self.detector);
        }
        if let Some(wifi) = &mut self.wifi {
            wifi.poll_probe(&mut self.detector);
        }
        if let Some(serial) = &mut self.serial {
            serial.poll_probe(now, &mut self.detector);
        }
    }

    fn drive_media(&mut self, now: Instant, rand: &mut impl Rand) {
        if let Some(uhf) = &mut self.uhf {
            uhf.execute(now, rand, self.service.inbound_mut());
        }
        if let Some(wifi) = &mut self.wifi {
            wifi.execute(now, self.service.inbound_mut());
        }
        if let Some(serial) = &mut self.serial {
            serial.execute(now, self.service.inbound_mut());
            serial.poll_send(self.service.outbound_mut());
        }
    }

    fn drive_net_services(&mut self, now: Instant) {
        self.neighbors.execute(now, &mut self.notifications);

        if self.local_node.config.enable_dynamic_cost_update {
            if let Some(cost) = self.dynamic_cost.poll_update(now, &mut self.measurement) {
                if self.local_node.set_cost(cost) {
                    self.notifications.notify(crate::node::Notification::SelfUpdated);
                }
            }
        }

        while let Poll::Ready(frame) = self.service.poll_reception_for(ProtocolNumber::LinkState) {
            self.handle_link_state(frame, now);
        }
    }

    /// Decodes an inbound link-state advertisement, folds it into the
    /// adjacency graph, and best-effort rebroadcasts it to every currently
    /// known neighbor (spec §4.10 "Flood rule").
    fn handle_link_state(&mut self, frame: QueuedFrame<'a, N, K>, now: Instant) {
        let mut reader = frame.reader;
        let mut deserializer = LinkStateDeserializer::new();
        let link_state = match deserializer.poll_deserialize(&mut reader) {
            Poll::Ready(Ok(link_state)) => link_state,
            // Pending here means the frame was shorter than a valid
            // advertisement; since this reader will never receive more
            // bytes, that is a malformed frame, not a stall.
            _ => return,
        };

        if !accept_and_should_rebroadcast(&mut self.routing.cache, link_state.frame_id) {
            return;
        }

        if let Some(origin_vertex) = self.node_index.vertex_for(link_state.origin) {
            for neighbor in &link_state.neighbors {
                if let Some(vertex) = self.node_index.vertex_for(neighbor.neighbor_id) {
                    let cost = neighbor.link_cost.min(u8::MAX as u16) as u8;
                    self.routing.graph.set_edge(origin_vertex, vertex, cost);
                }
            }
        }

        self.rebroadcast_link_state(&link_state, now);
    }

    fn rebroadcast_link_state(&mut self, link_state: &LinkStateFrame, now: Instant) {
        let payload_len = 1 + 2 + 2 + 1 + link_state.neighbors.len() * 4;
        let Poll::Ready((initial_reader, mut writer)) = self.service.request_frame_writer(payload_len) else {
            return;
        };
        drop(initial_reader);

        writer.write(&[ProtocolNumber::LinkState as u8]);
        let mut serializer = LinkStateSerializer::new(link_state);
        let _ = serializer.poll_serialize(&mut writer);

        for neighbor in self.neighbors.iter() {
            let queued = QueuedFrame {
                protocol_number: ProtocolNumber::LinkState,
                destination: neighbor.link_address,
                reader: writer.make_initial_reader(),
                enqueued_at: now,
            };
            if !self.service.outbound_mut().push(queued) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::node::identity::ClusterId;
    use crate::routing::FrameId;
    use crate::serde::test_support::FakeStream;
    use crate::time::test_support::DeterministicRand;

    type TestApp<'a> = App<'a, FakeStream<1>, FakeStream<1>, FakeStream<1>, 4, 32, 4, 4, 4>;

    fn node_app<'a>(pool: &'a BufferPool<4, 32>, local_id: NodeId, now: Instant) -> TestApp<'a> {
        let mut app: TestApp<'a> = App::new(pool, LocalNodeConfig::default(), now);
        app.local_node.set_source(Source { node_id: local_id, cluster_id: ClusterId::NONE }, 0);
        app
    }

    // A(1) -- B(2) -- C(3), A sends to C and the frame routes via B.
    #[test]
    fn routed_send_picks_the_gateway_neighbor_toward_a_two_hop_destination() {
        let pool: BufferPool<4, 32> = BufferPool::new();
        let t0 = Instant::from_millis(0);
        let mut app = node_app(&pool, 1, t0);
        let mut rand = DeterministicRand::new(0);

        app.neighbors.observe(2, LinkAddress::Uhf(2), 1, t0, &mut app.notifications);

        let a = app.node_index.vertex_for(1).unwrap();
        let b = app.node_index.vertex_for(2).unwrap();
        let c = app.node_index.vertex_for(3).unwrap();
        app.routing.graph.set_edge(a, b, 1);
        app.routing.graph.set_edge(b, c, 1);

        app.poll_send_app_frame(ProtocolNumber::Rpc, Destination::NodeId(3), b"hello", &mut rand, t0)
            .expect("routable destination");

        let queued = app.service.outbound_mut().pop_front().expect("frame was queued");
        assert_eq!(queued.destination, LinkAddress::Uhf(2));

        let mut reader = queued.reader;
        let mut deserializer = RoutingHeaderDeserializer::new();
        let header = match deserializer.poll_deserialize(&mut reader) {
            Poll::Ready(Ok(header)) => header,
            other => panic!("expected a decodable routing header, got {other:?}"),
        };
        assert_eq!(header.origin, 1);
        assert_eq!(header.destination, Destination::NodeId(3));
        assert_eq!(header.hop_count, 0);

        let mut payload = [0u8; 5];
        assert_eq!(reader.read(&mut payload), 5);
        assert_eq!(&payload, b"hello");
    }

    #[test]
    fn broadcast_send_floods_every_known_neighbor() {
        let pool: BufferPool<4, 32> = BufferPool::new();
        let t0 = Instant::from_millis(0);
        let mut app = node_app(&pool, 1, t0);
        let mut rand = DeterministicRand::new(0);

        app.neighbors.observe(2, LinkAddress::Uhf(2), 1, t0, &mut app.notifications);
        app.neighbors.observe(3, LinkAddress::Uhf(3), 1, t0, &mut app.notifications);

        app.poll_send_app_frame(ProtocolNumber::Observer, Destination::Broadcast, b"hi", &mut rand, t0)
            .expect("broadcast always has somewhere to go once there is at least one neighbor");

        assert_eq!(app.service.outbound_mut().len(), 2);
    }

    // A(1) -- B(2) -- C(3). An inbound frame at B addressed to C gets its
    // hop count bumped and is forwarded on toward C, not handed to the
    // caller.
    #[test]
    fn inbound_frame_for_another_node_is_rebroadcast_toward_its_gateway() {
        let pool: BufferPool<4, 32> = BufferPool::new();
        let t0 = Instant::from_millis(0);
        let mut app = node_app(&pool, 2, t0);

        app.neighbors.observe(3, LinkAddress::Uhf(3), 1, t0, &mut app.notifications);

        let a = app.node_index.vertex_for(1).unwrap();
        let b = app.node_index.vertex_for(2).unwrap();
        let c = app.node_index.vertex_for(3).unwrap();
        app.routing.graph.set_edge(a, b, 1);
        app.routing.graph.set_edge(b, c, 1);

        let header = RoutingHeader {
            frame_id: FrameId(7),
            origin: 1,
            destination: Destination::NodeId(3),
            hop_count: 0,
            cluster_id: ClusterId::NONE,
        };
        let Poll::Ready((_initial_reader, mut writer)) = app.service.request_frame_writer(ROUTING_HEADER_WIRE_LEN + 3)
        else {
            panic!("buffer pool should have room")
        };
        let mut serializer = RoutingHeaderSerializer::new(&header);
        assert_eq!(serializer.poll_serialize(&mut writer), Poll::Ready(()));
        writer.write(b"bye");
        let inbound = QueuedFrame {
            protocol_number: ProtocolNumber::Rpc,
            destination: LinkAddress::Uhf(2),
            reader: writer.make_initial_reader(),
            enqueued_at: t0,
        };
        assert!(app.service.inbound_mut().push(inbound));

        assert!(app.poll_receive_app_frame(ProtocolNumber::Rpc, t0).is_pending());

        let forwarded = app.service.outbound_mut().pop_front().expect("frame was forwarded");
        assert_eq!(forwarded.destination, LinkAddress::Uhf(3));

        let mut reader = forwarded.reader;
        let mut deserializer = RoutingHeaderDeserializer::new();
        let forwarded_header = match deserializer.poll_deserialize(&mut reader) {
            Poll::Ready(Ok(header)) => header,
            other => panic!("expected a decodable routing header, got {other:?}"),
        };
        assert_eq!(forwarded_header.hop_count, 1);
        let mut payload = [0u8; 3];
        assert_eq!(reader.read(&mut payload), 3);
        assert_eq!(&payload, b"bye");
    }

    #[test]
    fn inbound_frame_matching_local_destination_is_delivered() {
        let pool: BufferPool<4, 32> = BufferPool::new();
        let t0 = Instant::from_millis(0);
        let mut app = node_app(&pool, 3, t0);

        let header = RoutingHeader {
            frame_id: FrameId(8),
            origin: 1,
            destination: Destination::NodeId(3),
            hop_count: 1,
            cluster_id: ClusterId::NONE,
        };
        let Poll::Ready((_initial_reader, mut writer)) = app.service.request_frame_writer(ROUTING_HEADER_WIRE_LEN + 2)
        else {
            panic!("buffer pool should have room")
        };
        let mut serializer = RoutingHeaderSerializer::new(&header);
        assert_eq!(serializer.poll_serialize(&mut writer), Poll::Ready(()));
        writer.write(b"hi");
        let inbound = QueuedFrame {
            protocol_number: ProtocolNumber::Rpc,
            destination: LinkAddress::Uhf(3),
            reader: writer.make_initial_reader(),
            enqueued_at: t0,
        };
        assert!(app.service.inbound_mut().push(inbound));

        let Poll::Ready(mut delivered) = app.poll_receive_app_frame(ProtocolNumber::Rpc, t0) else {
            panic!("expected the frame to be delivered locally");
        };
        let mut payload = [0u8; 2];
        assert_eq!(delivered.reader.read(&mut payload), 2);
        assert_eq!(&payload, b"hi");
    }
}
