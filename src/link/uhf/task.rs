//! A single unit of work owned by the UHF driver's executor (spec §4.4
//! "Scheduling"): transmissions and explicit info queries share one FIFO
//! and one stream lock.

use crate::buffer::FrameBufferReader;
use crate::link::frame::ProtocolNumber;
use crate::sync::oneshot::Promise;

pub enum UhfTaskKind<'a, const N: usize, const K: usize> {
    /// `DT`: send `reader`'s bytes, prefixed by `protocol_number`, to the
    /// modem with the given 8-bit destination id.
    Transmit {
        destination_modem_id: u8,
        protocol_number: ProtocolNumber,
        reader: FrameBufferReader<'a, N, K>,
    },
    /// `IR`: an information query whose response body is discarded; it
    /// exists only to flush pending modem state.
    QueryInfo,
}

/// A queued task plus the promise its caller is waiting on. `success`
/// resolves to `true`/`false` per spec §7's "user-visible: succeeds or
/// fails" contract — never partial, never panics.
pub struct UhfTask<'a, const N: usize, const K: usize> {
    pub kind: UhfTaskKind<'a, N, K>,
    pub success: Promise<'a, bool>,
}
