//! Link frame envelope and protocol numbering (spec §3 "Frame", §4.3).

use crate::buffer::FrameBufferReader;
use crate::link::address::LinkAddress;

/// Wire-contract protocol numbers multiplexing the link layer to upper
/// sockets. Values are load-bearing: they appear on the wire as the first
/// payload byte of every frame and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolNumber {
    NoProtocol = 0,
    RoutingNeighbor = 1,
    Discover = 2,
    Rpc = 3,
    Observer = 4,
    Tunnel = 5,
    LinkState = 6,
}

impl ProtocolNumber {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NoProtocol),
            1 => Some(Self::RoutingNeighbor),
            2 => Some(Self::Discover),
            3 => Some(Self::Rpc),
            4 => Some(Self::Observer),
            5 => Some(Self::Tunnel),
            6 => Some(Self::LinkState),
            _ => None,
        }
    }
}

/// A received, not-yet-fully-consumed frame: the protocol number has
/// already been peeled off by the driver, `peer` identifies the sender at
/// the link-address level, and `reader` exposes the remaining payload.
pub struct Frame<'a, const N: usize, const K: usize> {
    pub protocol_number: ProtocolNumber,
    pub peer: LinkAddress,
    pub length: usize,
    pub reader: FrameBufferReader<'a, N, K>,
}
