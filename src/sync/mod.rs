//! Execution primitives shared from wire byte I/O up to application sockets
//! (spec §4.1): a single-threaded mutex, a one-shot future/promise pair,
//! delay/debounce timers, and a bounded egress-pacing pool.

pub mod delay;
pub mod delay_pool;
pub mod mutex;
pub mod oneshot;

pub use delay::{Debounce, Delay};
pub use delay_pool::DelayPool;
pub use mutex::{Guard, Mutex};
pub use oneshot::Channel as OneshotChannel;
