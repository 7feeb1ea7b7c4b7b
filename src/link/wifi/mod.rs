//! Wi-Fi (ESP-AT) driver: byte classifier, control-task executor, `+IPD`
//! demultiplexer (spec §4.5).

pub mod control;
pub mod driver;
pub mod receiver;

pub use control::WifiControlTask;
pub use driver::WifiDriver;
pub use receiver::{MessageKind, MessageReceiver};
