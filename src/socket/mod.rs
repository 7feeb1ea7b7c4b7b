//! Application socket layer: one socket per protocol number, each composed
//! from the shared [`core_socket::CoreSocket`] (spec §4.11, §4.13).

pub mod core_socket;
pub mod observer;
pub mod rpc;
pub mod tunnel;

pub use core_socket::CoreSocket;
pub use observer::ObserverSocket;
pub use rpc::{RequestId, RpcError, RpcSocket};
pub use tunnel::TunnelSocket;
