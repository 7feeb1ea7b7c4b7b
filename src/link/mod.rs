//! Link layer: uniform media facade over UHF/Wi-Fi/Serial drivers, the
//! outbound/inbound frame queues, per-medium addressing and measurement
//! (spec §4.3–§4.7).

pub mod address;
pub mod frame;
pub mod media;
pub mod measurement;
pub mod queue;
pub mod serial;
pub mod uhf;
pub mod wifi;

pub use address::LinkAddress;
pub use frame::{Frame, ProtocolNumber};
pub use media::{MediaDetector, MediaType};
pub use measurement::Measurement;
pub use queue::{LinkFrameQueue, QueuedFrame, FRAME_EXPIRATION};

/// Maximum number of concurrently configured media per node (spec §6
/// "Configuration").
pub const MAX_MEDIA_PER_NODE: usize = 4;

/// Maximum application-visible frame payload (spec §6 "MTU (255)").
pub const MTU: usize = 255;

/// Default deadline for any single command task (spec §4.12/§7).
pub const DEFAULT_TASK_TIMEOUT: crate::time::Duration = crate::time::Duration::from_secs(3);

/// A send either succeeds or fails outright; back-pressure on the link
/// frame queue is the only failure mode exposed here (spec §7 "Resource").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFrameError {
    QueueFull,
}
