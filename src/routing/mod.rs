//! Link-state routing: adjacency graph, gateway resolution, flood-cache
//! frame ids, and the routing socket composing them (spec §4.10, §4.11).

pub mod frame_id;
pub mod graph;
pub mod link_state;
pub mod node_index;
pub mod socket;

pub use frame_id::{FrameId, FrameIdCache};
pub use graph::AdjacencyGraph;
pub use link_state::{accept_and_should_rebroadcast, LinkStateDeserializer, LinkStateFrame, LinkStateSerializer, NeighborCost};
pub use node_index::NodeIndex;
pub use socket::{
    InboundDisposition, RoutingHeader, RoutingHeaderDeserializer, RoutingHeaderSerializer, RoutingSocket,
    ROUTING_HEADER_WIRE_LEN,
};
