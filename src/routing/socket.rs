//! Routing socket: composes a core socket, frame-id cache, and gateway
//! resolver; injects/strips the routing header (spec §4.11).
//!
//! Routing header wire form (spec §6): `frame_id(u16) | origin_node_id |
//! destination | hop_count(u8) | cluster_id(u8)`.

use crate::node::identity::{ClusterId, Destination, NodeId, Source};
use crate::poll::Poll;
use crate::routing::frame_id::{FrameId, FrameIdCache};
use crate::routing::graph::AdjacencyGraph;
use crate::serde::combinators::{LeU16, LeU8};
use crate::serde::{AsyncDeserialize, AsyncReadable, AsyncWritable, ReadStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingHeader {
    pub frame_id: FrameId,
    pub origin: NodeId,
    pub destination: Destination,
    pub hop_count: u8,
    pub cluster_id: ClusterId,
}

/// Byte length of the wire-encoded header (spec §6): `frame_id(u16) |
/// origin_node_id(u16) | destination(tag(u8) + node_id(u16) +
/// cluster_id(u8)) | hop_count(u8) | cluster_id(u8)`.
pub const ROUTING_HEADER_WIRE_LEN: usize = 2 + 2 + (1 + 2 + 1) + 1 + 1;

const DEST_TAG_BROADCAST: u8 = 0;
const DEST_TAG_NODE_ID: u8 = 1;
const DEST_TAG_CLUSTER_ID: u8 = 2;
const DEST_TAG_NODE_AND_CLUSTER: u8 = 3;

fn encode_destination(destination: Destination) -> (u8, NodeId, u8) {
    match destination {
        Destination::Broadcast => (DEST_TAG_BROADCAST, 0, ClusterId::NONE.value()),
        Destination::NodeId(id) => (DEST_TAG_NODE_ID, id, ClusterId::NONE.value()),
        Destination::ClusterId(cluster) => (DEST_TAG_CLUSTER_ID, 0, cluster.value()),
        Destination::NodeIdAndClusterId(id, cluster) => (DEST_TAG_NODE_AND_CLUSTER, id, cluster.value()),
    }
}

fn decode_destination(tag: u8, node_id: NodeId, cluster: u8) -> Result<Destination, ReadStatus> {
    match tag {
        DEST_TAG_BROADCAST => Ok(Destination::Broadcast),
        DEST_TAG_NODE_ID => Ok(Destination::NodeId(node_id)),
        DEST_TAG_CLUSTER_ID => Ok(Destination::ClusterId(ClusterId::new(cluster))),
        DEST_TAG_NODE_AND_CLUSTER => Ok(Destination::NodeIdAndClusterId(node_id, ClusterId::new(cluster))),
        _ => Err(ReadStatus::Invalid),
    }
}

/// Writes a [`RoutingHeader`] in the spec §6 wire order. Restartable the
/// same way [`crate::routing::link_state::LinkStateSerializer`] is: the
/// whole header is pre-flattened into a fixed buffer up front, so a
/// `Pending` write can resume exactly where it left off.
pub struct RoutingHeaderSerializer {
    bytes: heapless::Vec<u8, ROUTING_HEADER_WIRE_LEN>,
    written: usize,
}

impl RoutingHeaderSerializer {
    pub fn new(header: &RoutingHeader) -> Self {
        let mut bytes = heapless::Vec::new();
        let _ = bytes.extend_from_slice(&header.frame_id.0.to_le_bytes());
        let _ = bytes.extend_from_slice(&header.origin.to_le_bytes());
        let (tag, dest_node_id, dest_cluster) = encode_destination(header.destination);
        let _ = bytes.push(tag);
        let _ = bytes.extend_from_slice(&dest_node_id.to_le_bytes());
        let _ = bytes.push(dest_cluster);
        let _ = bytes.push(header.hop_count);
        let _ = bytes.push(header.cluster_id.value());
        Self { bytes, written: 0 }
    }

    pub fn poll_serialize<W: AsyncWritable>(&mut self, writer: &mut W) -> Poll<()> {
        while self.written < self.bytes.len() {
            match writer.poll_writable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    writer.write_unchecked(self.bytes[self.written]);
                    self.written += 1;
                }
            }
        }
        Poll::Ready(())
    }
}

enum HeaderField {
    FrameId(LeU16),
    Origin(LeU16),
    DestTag(LeU8),
    DestNodeId(u8, LeU16),
    DestCluster(u8, NodeId, LeU8),
    HopCount(LeU8),
    ClusterId(u8, LeU8),
}

/// Reads a [`RoutingHeader`] field by field, grounded on
/// [`crate::routing::link_state::LinkStateDeserializer`]'s one-field-at-a-
/// time shape so a frame arriving byte-by-byte resumes cleanly across
/// ticks.
pub struct RoutingHeaderDeserializer {
    frame_id: Option<u16>,
    origin: Option<u16>,
    destination: Option<Destination>,
    field: HeaderField,
}

impl RoutingHeaderDeserializer {
    pub fn new() -> Self {
        Self { frame_id: None, origin: None, destination: None, field: HeaderField::FrameId(LeU16::new()) }
    }
}

impl Default for RoutingHeaderDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AsyncReadable> AsyncDeserialize<R> for RoutingHeaderDeserializer {
    type Output = RoutingHeader;

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<RoutingHeader, ReadStatus>> {
        loop {
            match &mut self.field {
                HeaderField::FrameId(d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(v)) => {
                        self.frame_id = Some(v);
                        self.field = HeaderField::Origin(LeU16::new());
                    }
                },
                HeaderField::Origin(d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(v)) => {
                        self.origin = Some(v);
                        self.field = HeaderField::DestTag(LeU8::new());
                    }
                },
                HeaderField::DestTag(d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(tag)) => {
                        self.field = HeaderField::DestNodeId(tag, LeU16::new());
                    }
                },
                HeaderField::DestNodeId(tag, d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(node_id)) => {
                        self.field = HeaderField::DestCluster(*tag, node_id, LeU8::new());
                    }
                },
                HeaderField::DestCluster(tag, node_id, d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(cluster)) => {
                        let destination = match decode_destination(*tag, *node_id, cluster) {
                            Ok(d) => d,
                            Err(e) => return Poll::Ready(Err(e)),
                        };
                        self.destination = Some(destination);
                        self.field = HeaderField::HopCount(LeU8::new());
                    }
                },
                HeaderField::HopCount(d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(hop_count)) => {
                        self.field = HeaderField::ClusterId(hop_count, LeU8::new());
                    }
                },
                HeaderField::ClusterId(hop_count, d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(cluster_id)) => {
                        return Poll::Ready(Ok(RoutingHeader {
                            frame_id: FrameId(self.frame_id.unwrap()),
                            origin: self.origin.unwrap(),
                            destination: self.destination.unwrap(),
                            hop_count: *hop_count,
                            cluster_id: ClusterId::new(cluster_id),
                        }));
                    }
                },
            }
        }
    }
}

/// Outcome of handling an inbound routed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    /// Deliver locally (destination matches this node).
    DeliverLocal,
    /// Already seen this `frame_id`; drop.
    Seen,
    /// Forward to the given next-hop vertex.
    Rebroadcast(usize),
    /// Destination unreachable or hop count exhausted.
    Drop,
}

pub const MAX_HOP_COUNT: u8 = 16;

pub struct RoutingSocket<const M: usize> {
    pub cache: FrameIdCache,
    pub graph: AdjacencyGraph<M>,
}

impl<const M: usize> RoutingSocket<M> {
    pub fn new() -> Self {
        Self { cache: FrameIdCache::new(), graph: AdjacencyGraph::new() }
    }

    /// Builds the outbound header for a fresh send, choosing the first-hop
    /// neighbor via gateway resolution.
    pub fn prepare_outbound(
        &mut self,
        rand: &mut impl crate::time::Rand,
        local: Source,
        destination: Destination,
    ) -> RoutingHeader {
        RoutingHeader {
            frame_id: self.cache.generate(rand),
            origin: local.node_id,
            destination,
            hop_count: 0,
            cluster_id: local.cluster_id,
        }
    }

    /// Resolves the next-hop vertex for `header.destination` from `src`,
    /// given a way to map a `NodeId` to its graph vertex index.
    pub fn resolve_next_hop(&self, src_vertex: usize, dst_vertex: usize) -> Option<usize> {
        self.graph.resolve_gateway_vertex(src_vertex, dst_vertex)
    }

    /// Inbound handling: decrement hop count, consult the flood cache, and
    /// decide whether to deliver, drop, or rebroadcast.
    pub fn handle_inbound(
        &mut self,
        header: &mut RoutingHeader,
        local: Source,
        src_vertex: usize,
        dst_vertex: Option<usize>,
    ) -> InboundDisposition {
        if header.destination.matches(local) {
            return InboundDisposition::DeliverLocal;
        }
        if self.cache.contains(header.frame_id) {
            return InboundDisposition::Seen;
        }
        self.cache.insert(header.frame_id);

        if header.hop_count >= MAX_HOP_COUNT {
            return InboundDisposition::Drop;
        }
        header.hop_count += 1;

        match dst_vertex {
            Some(dst) => match self.graph.resolve_gateway_vertex(src_vertex, dst) {
                Some(next_hop) => InboundDisposition::Rebroadcast(next_hop),
                None => InboundDisposition::Drop,
            },
            None => InboundDisposition::Drop,
        }
    }
}

impl<const M: usize> Default for RoutingSocket<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::test_support::DeterministicRand;

    #[test]
    fn inbound_matching_destination_delivers_locally() {
        let mut socket: RoutingSocket<4> = RoutingSocket::new();
        let local = Source { node_id: 1, cluster_id: ClusterId::NONE };
        let mut header = RoutingHeader {
            frame_id: FrameId(1),
            origin: 2,
            destination: Destination::NodeId(1),
            hop_count: 0,
            cluster_id: ClusterId::NONE,
        };
        assert_eq!(
            socket.handle_inbound(&mut header, local, 0, Some(1)),
            InboundDisposition::DeliverLocal
        );
    }

    #[test]
    fn repeated_frame_id_is_dropped_as_seen() {
        let mut socket: RoutingSocket<4> = RoutingSocket::new();
        let local = Source { node_id: 1, cluster_id: ClusterId::NONE };
        let mut rand = DeterministicRand::new(0);
        let id = socket.cache.generate(&mut rand);
        let mut header = RoutingHeader {
            frame_id: id,
            origin: 2,
            destination: Destination::NodeId(9),
            hop_count: 0,
            cluster_id: ClusterId::NONE,
        };
        assert_eq!(socket.handle_inbound(&mut header, local, 0, Some(1)), InboundDisposition::Seen);
    }

    #[test]
    fn routing_header_round_trips_for_every_destination_kind() {
        use crate::serde::test_support::FakeStream;

        let destinations = [
            Destination::Broadcast,
            Destination::NodeId(7),
            Destination::ClusterId(ClusterId::new(3)),
            Destination::NodeIdAndClusterId(9, ClusterId::new(4)),
        ];
        for destination in destinations {
            let header = RoutingHeader {
                frame_id: FrameId(0xBEEF),
                origin: 42,
                destination,
                hop_count: 5,
                cluster_id: ClusterId::new(1),
            };
            let mut out: FakeStream<32> = FakeStream::new();
            let mut ser = RoutingHeaderSerializer::new(&header);
            assert_eq!(ser.poll_serialize(&mut out), Poll::Ready(()));

            let mut in_stream: FakeStream<32> = FakeStream::new();
            in_stream.feed(out.written());
            let mut de = RoutingHeaderDeserializer::new();
            assert_eq!(de.poll_deserialize(&mut in_stream), Poll::Ready(Ok(header)));
        }
    }
}
