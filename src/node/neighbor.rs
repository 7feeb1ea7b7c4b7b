//! Neighbor table driven by the `Discover`/`RoutingNeighbor` protocols
//! (spec §4.9; grounded on `arduino/lib/net/src/net/neighbor/core_socket.h`).

use crate::link::LinkAddress;
use crate::node::identity::{Cost, NodeId};
use crate::node::notification::{Notification, NotificationService};
use crate::time::{Duration, Instant};

/// A neighbor not re-announced within this window is considered gone.
pub const NEIGHBOR_EXPIRATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborEntry {
    pub node_id: NodeId,
    pub link_address: LinkAddress,
    pub cost: Cost,
    pub last_seen: Instant,
}

pub struct NeighborTable<const M: usize> {
    entries: heapless::Vec<NeighborEntry, M>,
}

impl<const M: usize> NeighborTable<M> {
    pub fn new() -> Self {
        Self { entries: heapless::Vec::new() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.iter()
    }

    pub fn find(&self, node_id: NodeId) -> Option<&NeighborEntry> {
        self.entries.iter().find(|e| e.node_id == node_id)
    }

    /// Inserts or refreshes a neighbor, emitting `NeighborUpdated` through
    /// `notifications`. Silently drops a brand-new neighbor if the table is
    /// already at capacity (spec §7: resource exhaustion is back-pressure,
    /// not a panic).
    pub fn observe(
        &mut self,
        node_id: NodeId,
        link_address: LinkAddress,
        cost: Cost,
        now: Instant,
        notifications: &mut NotificationService,
    ) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.node_id == node_id) {
            entry.link_address = link_address;
            entry.cost = cost;
            entry.last_seen = now;
            notifications.notify(Notification::NeighborUpdated(node_id));
            return;
        }
        if self
            .entries
            .push(NeighborEntry { node_id, link_address, cost, last_seen: now })
            .is_ok()
        {
            notifications.notify(Notification::NeighborUpdated(node_id));
        }
    }

    /// Sweeps neighbors not seen within [`NEIGHBOR_EXPIRATION`], emitting
    /// `NeighborRemoved` for each.
    pub fn execute(&mut self, now: Instant, notifications: &mut NotificationService) {
        let mut i = 0;
        while i < self.entries.len() {
            if now.saturating_duration_since(self.entries[i].last_seen) >= NEIGHBOR_EXPIRATION {
                let removed = self.entries.remove(i);
                notifications.notify(Notification::NeighborRemoved(removed.node_id));
            } else {
                i += 1;
            }
        }
    }
}

impl<const M: usize> Default for NeighborTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::Poll;

    #[test]
    fn observe_then_expire() {
        let mut table: NeighborTable<4> = NeighborTable::new();
        let mut notifications = NotificationService::new();
        let t0 = Instant::from_millis(0);
        table.observe(1, LinkAddress::Uhf(9), 10, t0, &mut notifications);
        assert!(table.find(1).is_some());
        assert_eq!(notifications.poll_notification(), Poll::Ready(Notification::NeighborUpdated(1)));

        table.execute(t0 + NEIGHBOR_EXPIRATION, &mut notifications);
        assert!(table.find(1).is_none());
        assert_eq!(notifications.poll_notification(), Poll::Ready(Notification::NeighborRemoved(1)));
    }
}
