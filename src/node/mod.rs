//! Local node identity, neighbor table, dynamic cost, and notifications
//! (spec §4.9).

pub mod dynamic_cost;
pub mod identity;
pub mod info;
pub mod neighbor;
pub mod notification;

pub use dynamic_cost::DynamicCostUpdater;
pub use identity::{ClusterId, Cost, Destination, NodeId, Source, NO_CLUSTER};
pub use info::{LocalNode, LocalNodeConfig, LocalNodeInfo};
pub use neighbor::{NeighborEntry, NeighborTable};
pub use notification::{Notification, NotificationService};
