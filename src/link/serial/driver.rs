//! Serial framing state machine (spec §4.6).
//!
//! `preamble[P] | protocol[1] | source[1] | dest[1] | length[1] | payload`.
//! No acknowledgment; a dropped or malformed frame is simply invisible to
//! the application (spec §7 "User-visible").

use crate::buffer::{BufferPool, FrameBufferReader, FrameBufferWriter};
use crate::link::frame::ProtocolNumber;
use crate::link::media::MediaDetector;
use crate::link::queue::{LinkFrameQueue, QueuedFrame};
use crate::link::LinkAddress;
use crate::poll::Poll;
use crate::serde::{AsyncReadable, AsyncWritable};
use crate::sync::Mutex;
use crate::time::Instant;

const BROADCAST: u8 = 0xFF;

enum Phase<'a, const N: usize, const K: usize> {
    ScanningPreamble { matched: usize },
    ReadByte { field: HeaderField },
    DiscardingPayload { remaining: usize },
    ReadingPayload {
        protocol: ProtocolNumber,
        source: u8,
        remaining: usize,
        reader: Option<FrameBufferReader<'a, N, K>>,
        writer: FrameBufferWriter<'a, N, K>,
    },
}

/// Header bytes fit `preamble[<=16] | protocol | source | dest | length`.
const MAX_HEADER_LEN: usize = 20;

enum SendPhase<'a, const N: usize, const K: usize> {
    Header { header: [u8; MAX_HEADER_LEN], len: usize, written: usize, reader: FrameBufferReader<'a, N, K> },
    Payload { reader: FrameBufferReader<'a, N, K>, pending_byte: Option<u8> },
}

#[derive(Clone, Copy)]
enum HeaderField {
    Protocol,
    Source { protocol: u8 },
    Dest { protocol: u8, source: u8 },
    Length { protocol: u8, source: u8, dest: u8 },
}

pub struct SerialDriver<'a, S, const N: usize, const K: usize, const P: usize> {
    stream: Mutex<S>,
    pool: &'a BufferPool<N, K>,
    preamble: [u8; P],
    self_addr: u8,
    phase: Phase<'a, N, K>,
    send: Option<SendPhase<'a, N, K>>,
    byte_seen: bool,
}

impl<'a, S, const N: usize, const K: usize, const P: usize> SerialDriver<'a, S, N, K, P>
where
    S: AsyncReadable + AsyncWritable,
{
    pub fn new(stream: S, pool: &'a BufferPool<N, K>, preamble: [u8; P], self_addr: u8) -> Self {
        debug_assert!(P + 4 <= MAX_HEADER_LEN);
        Self {
            stream: Mutex::new(stream),
            pool,
            preamble,
            self_addr,
            phase: Phase::ScanningPreamble { matched: 0 },
            send: None,
            byte_seen: false,
        }
    }

    /// Serial only claims the medium if neither UHF nor Wi-Fi probe matches
    /// before [`crate::link::media::SERIAL_FALLBACK_TIMEOUT`]; it still
    /// needs to mark "a byte was seen" so that timeout can start ticking.
    pub fn poll_probe(&mut self, now: Instant, detector: &mut MediaDetector) {
        let Some(mut guard) = self.stream.try_lock() else { return };
        if let Poll::Ready(()) = guard.poll_readable() {
            if !self.byte_seen {
                self.byte_seen = true;
                detector.note_byte_seen(now);
            }
        }
    }

    pub fn execute<const Q: usize>(&mut self, now: Instant, inbound: &mut LinkFrameQueue<'a, N, K, Q>) {
        let Some(mut guard) = self.stream.try_lock() else { return };
        loop {
            match &mut self.phase {
                Phase::ScanningPreamble { matched } => match guard.poll_readable() {
                    Poll::Pending => return,
                    Poll::Ready(()) => {
                        let byte = guard.read_unchecked();
                        if byte == self.preamble[*matched] {
                            *matched += 1;
                            if *matched == P {
                                self.phase = Phase::ReadByte { field: HeaderField::Protocol };
                            }
                        } else {
                            *matched = if byte == self.preamble[0] { 1 } else { 0 };
                        }
                    }
                },
                Phase::ReadByte { field } => match guard.poll_readable() {
                    Poll::Pending => return,
                    Poll::Ready(()) => {
                        let byte = guard.read_unchecked();
                        *field = match *field {
                            HeaderField::Protocol => HeaderField::Source { protocol: byte },
                            HeaderField::Source { protocol } => HeaderField::Dest { protocol, source: byte },
                            HeaderField::Dest { protocol, source } => {
                                HeaderField::Length { protocol, source, dest: byte }
                            }
                            HeaderField::Length { protocol, source, dest } => {
                                let length = byte as usize;
                                let keep = dest == self.self_addr || dest == BROADCAST;
                                if !keep {
                                    log::trace!("serial frame for {dest:#x} not ours, discarding {length} byte(s)");
                                    self.phase = Phase::DiscardingPayload { remaining: length };
                                    continue;
                                }
                                let protocol_number =
                                    ProtocolNumber::from_u8(protocol).unwrap_or(ProtocolNumber::NoProtocol);
                                match self.pool.allocate(length) {
                                    Some((reader, writer)) => {
                                        self.phase = Phase::ReadingPayload {
                                            protocol: protocol_number,
                                            source,
                                            remaining: length,
                                            reader: Some(reader),
                                            writer,
                                        };
                                    }
                                    None => self.phase = Phase::DiscardingPayload { remaining: length },
                                }
                                continue;
                            }
                        };
                    }
                },
                Phase::DiscardingPayload { remaining } => {
                    while *remaining > 0 {
                        match guard.poll_readable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                guard.read_unchecked();
                                *remaining -= 1;
                            }
                        }
                    }
                    self.phase = Phase::ScanningPreamble { matched: 0 };
                }
                Phase::ReadingPayload { protocol, source, remaining, reader, writer } => {
                    while *remaining > 0 {
                        match guard.poll_readable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                writer.write_byte(guard.read_unchecked());
                                *remaining -= 1;
                            }
                        }
                    }
                    let reader = reader.take().expect("populated on entry to ReadingPayload");
                    log::trace!("serial frame received from {source:#x}, protocol {protocol:?}");
                    inbound.push(QueuedFrame {
                        protocol_number: *protocol,
                        destination: LinkAddress::Serial(*source),
                        reader,
                        enqueued_at: now,
                    });
                    self.phase = Phase::ScanningPreamble { matched: 0 };
                }
            }
        }
    }

    /// Drains frames addressed to [`LinkAddress::Serial`] from `outbound`
    /// and writes them out as `preamble | protocol | source | dest |
    /// length | payload`. Best effort, same as reception: there is no
    /// acknowledgment on this medium (spec §4.6), so a frame that is
    /// dropped mid-write simply never arrives, same as if the wire itself
    /// had dropped it.
    pub fn poll_send<const Q: usize>(&mut self, outbound: &mut LinkFrameQueue<'a, N, K, Q>) {
        let Some(mut guard) = self.stream.try_lock() else { return };
        loop {
            if self.send.is_none() {
                match outbound.peek_front() {
                    Some(frame) if matches!(frame.destination, LinkAddress::Serial(_)) => {}
                    _ => return,
                }
                let frame = outbound.pop_front().expect("just peeked");
                let LinkAddress::Serial(dest) = frame.destination else {
                    unreachable!("peeked as Serial above")
                };
                let mut header = [0u8; MAX_HEADER_LEN];
                let mut len = 0;
                header[..P].copy_from_slice(&self.preamble);
                len += P;
                header[len] = frame.protocol_number as u8;
                len += 1;
                header[len] = self.self_addr;
                len += 1;
                header[len] = dest;
                len += 1;
                header[len] = frame.reader.readable_count() as u8;
                len += 1;
                self.send = Some(SendPhase::Header { header, len, written: 0, reader: frame.reader });
            }

            match self.send.as_mut().unwrap() {
                SendPhase::Header { header, len, written, .. } => {
                    while *written < *len {
                        match guard.poll_writable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                guard.write_unchecked(header[*written]);
                                *written += 1;
                            }
                        }
                    }
                    let Some(SendPhase::Header { reader, .. }) = self.send.take() else {
                        unreachable!("just matched Header above")
                    };
                    self.send = Some(SendPhase::Payload { reader, pending_byte: None });
                }
                SendPhase::Payload { reader, pending_byte } => {
                    loop {
                        let byte = match pending_byte.take() {
                            Some(byte) => byte,
                            None => {
                                let mut byte_buf = [0u8; 1];
                                if reader.is_complete() && reader.readable_count() == 0 {
                                    break;
                                }
                                if reader.read(&mut byte_buf) == 0 {
                                    return;
                                }
                                byte_buf[0]
                            }
                        };
                        match guard.poll_writable() {
                            Poll::Pending => {
                                *pending_byte = Some(byte);
                                return;
                            }
                            Poll::Ready(()) => guard.write_unchecked(byte),
                        }
                    }
                    self.send = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serde::test_support::FakeStream;

    #[test]
    fn scenario_3_wrong_dest_discarded_then_next_frame_delivered() {
        let pool: BufferPool<8, 8> = BufferPool::new();
        let preamble = [0xaau8, 0x55];
        let mut stream: FakeStream<64> = FakeStream::new();
        stream.feed(&preamble);
        stream.feed(b"\x2e\x34\x77\x05abcde");
        stream.feed(&preamble);
        stream.feed(b"\x2e\x34\x0a\x05fghij");

        let mut driver: SerialDriver<_, 8, 8, 2> = SerialDriver::new(stream, &pool, preamble, 0x0a);
        let mut inbound: LinkFrameQueue<8, 8, 4> = LinkFrameQueue::new();
        driver.execute(crate::time::Instant::from_millis(0), &mut inbound);

        let mut frame = inbound.pop_front().expect("second frame should be delivered");
        assert_eq!(frame.protocol_number, ProtocolNumber::NoProtocol);
        assert_eq!(frame.destination, LinkAddress::Serial(0x34));
        let mut payload = [0u8; 5];
        assert_eq!(frame.reader.read(&mut payload), 5);
        assert_eq!(&payload, b"fghij");
        assert!(inbound.pop_front().is_none());
    }
}
