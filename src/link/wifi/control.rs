//! Wi-Fi control tasks (spec §4.5 "Control tasks").

use heapless::Vec;

use crate::buffer::FrameBufferReader;
use crate::sync::oneshot::Promise;
use crate::time::Duration;

/// `AT+CWJAP` has its own, much longer, deadline than the default.
pub const JOIN_AP_TIMEOUT: Duration = Duration::from_secs(20);

pub enum WifiControlTask<'a, const N: usize, const K: usize> {
    JoinAp { ssid: Vec<u8, 32>, password: Vec<u8, 64>, success: Promise<'a, bool> },
    StartUdpServer { port: u16, success: Promise<'a, bool> },
    StartTcpConnection { link_id: u8, ip: [u8; 4], port: u16, success: Promise<'a, bool> },
    StartUdpConnection { link_id: u8, ip: [u8; 4], port: u16, local_port: u16, success: Promise<'a, bool> },
    SendData { reader: FrameBufferReader<'a, N, K>, remote_ip: u32, remote_port: u16, success: Promise<'a, bool> },
}

impl<'a, const N: usize, const K: usize> WifiControlTask<'a, N, K> {
    /// Per-task deadline: `JoinAp` gets 20s, everything else the crate-wide
    /// default of 3s (spec §4.12 "Cancellation and timeouts").
    pub fn timeout(&self) -> Duration {
        match self {
            WifiControlTask::JoinAp { .. } => JOIN_AP_TIMEOUT,
            _ => crate::link::DEFAULT_TASK_TIMEOUT,
        }
    }
}
