//! Link-state advertisement frames and the flood rule that propagates
//! them (spec §4.10).

use heapless::Vec;

use crate::node::identity::{Cost, NodeId};
use crate::poll::Poll;
use crate::routing::frame_id::{FrameId, FrameIdCache};
use crate::serde::combinators::{LeU16, LeU8};
use crate::serde::{AsyncDeserialize, AsyncReadable, AsyncWritable, ReadStatus};

pub const MAX_NEIGHBORS_PER_ADVERTISEMENT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborCost {
    pub neighbor_id: NodeId,
    pub link_cost: Cost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStateFrame {
    pub frame_id: FrameId,
    pub origin: NodeId,
    pub neighbors: Vec<NeighborCost, MAX_NEIGHBORS_PER_ADVERTISEMENT>,
}

/// Accepts a received link-state frame and decides whether it should be
/// rebroadcast: `true` the first time a `frame_id` is seen, `false` (drop)
/// on any repeat (spec §4.10 "Flood rule").
pub fn accept_and_should_rebroadcast(cache: &mut FrameIdCache, frame_id: FrameId) -> bool {
    if cache.contains(frame_id) {
        log::debug!("flood-cache hit on {frame_id:?}, dropping repeat");
        return false;
    }
    cache.insert(frame_id);
    true
}

pub struct LinkStateDeserializer {
    frame_id: Option<u16>,
    origin: Option<u16>,
    count: Option<u8>,
    neighbors: Vec<NeighborCost, MAX_NEIGHBORS_PER_ADVERTISEMENT>,
    field: FieldDeserializer,
}

enum FieldDeserializer {
    FrameId(LeU16),
    Origin(LeU16),
    Count(LeU8),
    NeighborId(LeU16),
    NeighborCost(LeU16, NodeId),
}

impl LinkStateDeserializer {
    pub fn new() -> Self {
        Self {
            frame_id: None,
            origin: None,
            count: None,
            neighbors: Vec::new(),
            field: FieldDeserializer::FrameId(LeU16::new()),
        }
    }
}

impl<R: AsyncReadable> AsyncDeserialize<R> for LinkStateDeserializer {
    type Output = LinkStateFrame;

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<LinkStateFrame, ReadStatus>> {
        loop {
            match &mut self.field {
                FieldDeserializer::FrameId(d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(v)) => {
                        self.frame_id = Some(v);
                        self.field = FieldDeserializer::Origin(LeU16::new());
                    }
                },
                FieldDeserializer::Origin(d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(v)) => {
                        self.origin = Some(v);
                        self.field = FieldDeserializer::Count(LeU8::new());
                    }
                },
                FieldDeserializer::Count(d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(v)) => {
                        if v as usize > MAX_NEIGHBORS_PER_ADVERTISEMENT {
                            return Poll::Ready(Err(ReadStatus::NotEnoughLength));
                        }
                        self.count = Some(v);
                        if v == 0 {
                            return Poll::Ready(Ok(self.finish()));
                        }
                        self.field = FieldDeserializer::NeighborId(LeU16::new());
                    }
                },
                FieldDeserializer::NeighborId(d) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(id)) => {
                        self.field = FieldDeserializer::NeighborCost(LeU16::new(), id);
                    }
                },
                FieldDeserializer::NeighborCost(d, id) => match d.poll_deserialize(reader) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Ready(Ok(cost)) => {
                        let _ = self.neighbors.push(NeighborCost { neighbor_id: *id, link_cost: cost });
                        if self.neighbors.len() == self.count.unwrap() as usize {
                            return Poll::Ready(Ok(self.finish()));
                        }
                        self.field = FieldDeserializer::NeighborId(LeU16::new());
                    }
                },
            }
        }
    }
}

impl LinkStateDeserializer {
    fn finish(&mut self) -> LinkStateFrame {
        LinkStateFrame {
            frame_id: FrameId(self.frame_id.unwrap()),
            origin: self.origin.unwrap(),
            neighbors: core::mem::take(&mut self.neighbors),
        }
    }
}

impl Default for LinkStateDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `frame_id(u16) | origin(u16) | count(u8) | (id(u16), cost(u16))*`.
pub struct LinkStateSerializer {
    bytes: Vec<u8, { 2 + 2 + 1 + MAX_NEIGHBORS_PER_ADVERTISEMENT * 4 }>,
    written: usize,
}

impl LinkStateSerializer {
    pub fn new(frame: &LinkStateFrame) -> Self {
        let mut bytes = Vec::new();
        let _ = bytes.extend_from_slice(&frame.frame_id.0.to_le_bytes());
        let _ = bytes.extend_from_slice(&frame.origin.to_le_bytes());
        let _ = bytes.push(frame.neighbors.len() as u8);
        for n in &frame.neighbors {
            let _ = bytes.extend_from_slice(&n.neighbor_id.to_le_bytes());
            let _ = bytes.extend_from_slice(&n.link_cost.to_le_bytes());
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serde::test_support::FakeStream;

    #[test]
    fn round_trips_with_neighbors() {
        let mut neighbors = Vec::new();
        neighbors.push(NeighborCost { neighbor_id: 7, link_cost: 3 }).unwrap();
        let frame = LinkStateFrame { frame_id: FrameId(0x1234), origin: 42, neighbors };

        let mut out: FakeStream<32> = FakeStream::new();
        let mut ser = LinkStateSerializer::new(&frame);
        assert_eq!(ser.poll_serialize(&mut out), Poll::Ready(()));

        let mut in_stream: FakeStream<32> = FakeStream::new();
        in_stream.feed(out.written());
        let mut de = LinkStateDeserializer::new();
        assert_eq!(de.poll_deserialize(&mut in_stream), Poll::Ready(Ok(frame)));
    }

    #[test]
    fn flood_rule_drops_repeat_frame_id() {
        let mut cache = FrameIdCache::new();
        assert!(accept_and_should_rebroadcast(&mut cache, FrameId(0x1234)));
        assert!(!accept_and_should_rebroadcast(&mut cache, FrameId(0x1234)));
    }
}
