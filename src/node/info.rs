//! Local node information and runtime configuration flags (spec §4.9).

use crate::node::identity::{Cost, Source};
use crate::poll::Poll;

/// Until the link layer reports a media address, `LocalNodeInfo` can't be
/// computed; callers see `Pending` until then (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalNodeInfo {
    pub cost: Cost,
    pub source: Source,
}

/// The only two runtime-configurable flags this crate exposes (spec §6
/// "Configuration"); everything else is compile-time constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalNodeConfig {
    pub enable_auto_neighbor_discovery: bool,
    pub enable_dynamic_cost_update: bool,
}

impl Default for LocalNodeConfig {
    fn default() -> Self {
        Self { enable_auto_neighbor_discovery: true, enable_dynamic_cost_update: true }
    }
}

pub struct LocalNode {
    info: Option<LocalNodeInfo>,
    pub config: LocalNodeConfig,
}

impl LocalNode {
    pub fn new(config: LocalNodeConfig) -> Self {
        Self { info: None, config }
    }

    pub fn poll_info(&self) -> Poll<LocalNodeInfo> {
        match self.info {
            Some(info) => Poll::Ready(info),
            None => Poll::Pending,
        }
    }

    /// Called once the link layer has assigned this node a media source
    /// address. Returns `true` the first time info becomes known, so the
    /// caller can emit `Notification::SelfUpdated` exactly once per change.
    pub fn set_source(&mut self, source: Source, initial_cost: Cost) -> bool {
        let changed = self.info.map(|i| i.source) != Some(source);
        self.info = Some(LocalNodeInfo { cost: self.info.map(|i| i.cost).unwrap_or(initial_cost), source });
        changed
    }

    /// Returns `true` if the cost actually changed, so the caller can emit
    /// `Notification::SelfUpdated`.
    pub fn set_cost(&mut self, cost: Cost) -> bool {
        match &mut self.info {
            Some(info) if info.cost != cost => {
                info.cost = cost;
                true
            }
            _ => false,
        }
    }
}
