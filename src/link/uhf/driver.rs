//! UHF driver state machine (spec §4.4).
//!
//! Grounded on `arduino/lib/uhf/src/uhf/driver.h`'s command/response pairs
//! and on the `nb`-style polling loop the other media drivers share.

use heapless::Deque;

use crate::buffer::{BufferPool, FrameBufferReader};
use crate::link::frame::ProtocolNumber;
use crate::link::media::MediaDetector;
use crate::link::queue::{LinkFrameQueue, QueuedFrame};
use crate::link::uhf::task::{UhfTask, UhfTaskKind};
use crate::link::LinkAddress;
use crate::poll::Poll;
use crate::serde::combinators::{BoundedLine, Literal, LiteralWriter};
use crate::serde::{AsyncDeserialize, AsyncReadable, AsyncSerialize, AsyncWritable};
use crate::sync::{Delay, Mutex};
use crate::time::{Instant, Rand};

const MAX_LINE_LEN: usize = 64;
const MAX_RETRIES: u8 = 3;
const BACKOFF_MIN_MS: u32 = 50;
const BACKOFF_MAX_MS: u32 = 1000;

/// Boot-time identity bring-up (spec §4.4): once `poll_probe` confirms the
/// medium, query the modem's 9-byte serial number with `@SN`, derive an
/// equipment id from its last 2 characters, then push that id back with
/// `@EI` so the modem's own `/Rxx` framing agrees with it.
enum IdentityStage {
    AwaitProbe,
    SendSerialNumberQuery { writer: LiteralWriter<5> },
    AwaitSerialNumberResponse { line: BoundedLine<MAX_LINE_LEN> },
    SendEquipmentIdCommand { writer: heapless::Vec<u8, 8>, written: usize, id: u8 },
    AwaitEquipmentIdResponse { line: BoundedLine<MAX_LINE_LEN>, id: u8 },
    Done,
}

enum CommandPhase<'a, const N: usize, const K: usize> {
    /// Issue `@CS\r\n` and await `*CS=EN\r\n` / `*CS=DI\r\n`.
    SendCarrierSense { writer: LiteralWriter<5> },
    AwaitCarrierSense { line: BoundedLine<MAX_LINE_LEN> },
    /// Carrier busy: wait out a random backoff before retrying `CS`.
    Backoff { delay: Delay, retries_left: u8 },
    /// Write `@DT` + 2 hex digits of payload length, then the payload
    /// bytes, then `/R` + 2 hex digits of the destination modem id.
    SendDtHeader {
        writer: heapless::Vec<u8, 5>,
        written: usize,
        destination_modem_id: u8,
        reader: FrameBufferReader<'a, N, K>,
    },
    SendDtPayload { reader: FrameBufferReader<'a, N, K>, pending_byte: Option<u8>, destination_modem_id: u8 },
    SendDtTrailer { writer: heapless::Vec<u8, 8>, written: usize },
    /// Abort path: any unexpected line (including `*IR=…`) during DT.
    AwaitDtAck { line: BoundedLine<MAX_LINE_LEN> },
}

const DR_PREFIX: &[u8; 4] = b"*DR=";
const DR_SOURCE_PREFIX: &[u8; 2] = b"\\R";
const DR_CRLF: &[u8; 2] = b"\r\n";

/// Unlike the `@CS`/`*CS=` exchange, a `*DR=` line is not itself
/// `\r\n`-terminated: the raw payload bytes (which may contain anything,
/// including `\r\n`) sit between the length field and the trailing
/// `\Rxx\r\n` source suffix, so every field here is a byte-count/literal
/// scan that discards and resyncs rather than the restartable rewind
/// `Literal` combinator uses elsewhere (spec §8 scenario 1; grounded on
/// the original `net::link::uhf::DRExecutor`'s `PrefixLength`/`Body`/
/// `Suffix` states and on `SerialDriver`'s own preamble scanner in this
/// crate for the discard-and-resync shape).
enum DrPhase<'a, const N: usize, const K: usize> {
    AwaitPrefix { matched: usize },
    AwaitLength { digits: [u8; 2], filled: usize },
    ReadingPayload {
        remaining: usize,
        reader: Option<FrameBufferReader<'a, N, K>>,
        writer: crate::buffer::FrameBufferWriter<'a, N, K>,
    },
    AwaitSourcePrefix { reader: FrameBufferReader<'a, N, K>, matched: usize },
    AwaitSourceDigits { reader: FrameBufferReader<'a, N, K>, digits: [u8; 2], filled: usize },
    AwaitTrailingCrlf { reader: FrameBufferReader<'a, N, K>, source: u8, matched: usize },
}

/// Owns the serial-number/equipment-id bring-up, carrier-sense/transmit
/// task executor, and the unsolicited `*DR=` receive path for one UHF
/// modem stream.
pub struct UhfDriver<'a, S, const N: usize, const K: usize> {
    stream: Mutex<S>,
    pool: &'a BufferPool<N, K>,
    pending: Deque<UhfTask<'a, N, K>, 4>,
    active: Option<(UhfTask<'a, N, K>, CommandPhase<'a, N, K>)>,
    dr_phase: Option<DrPhase<'a, N, K>>,
    identity: IdentityStage,
    equipment_id: Option<u8>,
}

impl<'a, S, const N: usize, const K: usize> UhfDriver<'a, S, N, K>
where
    S: AsyncReadable + AsyncWritable,
{
    pub fn new(stream: S, pool: &'a BufferPool<N, K>) -> Self {
        Self {
            stream: Mutex::new(stream),
            pool,
            pending: Deque::new(),
            active: None,
            dr_phase: None,
            identity: IdentityStage::AwaitProbe,
            equipment_id: None,
        }
    }

    pub fn equipment_id(&self) -> Option<u8> {
        self.equipment_id
    }

    pub fn enqueue(&mut self, task: UhfTask<'a, N, K>) -> bool {
        self.pending.push_back(task).is_ok()
    }

    /// Drives the probe used by media auto-detection: `AT` -> `*ER=0`.
    pub fn poll_probe(&mut self, detector: &mut MediaDetector) {
        if !matches!(self.identity, IdentityStage::AwaitProbe) {
            return;
        }
        let Some(mut guard) = self.stream.try_lock() else { return };
        if let Poll::Ready(Ok(())) = Literal::new(*b"*ER=0\r\n").poll_deserialize(&mut *guard) {
            detector.report_uhf_match();
            self.identity = IdentityStage::SendSerialNumberQuery { writer: LiteralWriter::new(*b"@SN\r\n") };
        }
    }

    /// Advances the executor by one tick: services an in-flight command or
    /// pops the next pending one, then drains any `*DR=` frame available
    /// on the stream into the inbound queue.
    pub fn execute<const Q: usize>(
        &mut self,
        now: Instant,
        rand: &mut impl Rand,
        inbound: &mut LinkFrameQueue<'a, N, K, Q>,
    ) {
        self.drive_identity(now);
        self.drive_active(now, rand);
        if self.active.is_none() {
            if let Some(task) = self.pending.pop_front() {
                self.active = Some((task, CommandPhase::SendCarrierSense {
                    writer: LiteralWriter::new(*b"@CS\r\n"),
                }));
                self.drive_active(now, rand);
            }
        }
        self.poll_dr(now, inbound);
    }

    fn drive_active(&mut self, now: Instant, rand: &mut impl Rand) {
        let Some((_task, _phase)) = self.active.as_ref() else { return };
        let Some(mut guard) = self.stream.try_lock() else { return };

        loop {
            let Some((task, phase)) = self.active.as_mut() else { return };
            match phase {
                CommandPhase::SendCarrierSense { writer } => match writer.poll_serialize(&mut *guard) {
                    Poll::Pending => return,
                    Poll::Ready(()) => {
                        *phase = CommandPhase::AwaitCarrierSense { line: BoundedLine::new() };
                    }
                },
                CommandPhase::AwaitCarrierSense { line } => match line.poll_deserialize(&mut *guard) {
                    Poll::Pending => return,
                    Poll::Ready(Err(_)) => { drop(guard); return self.finish_active(false); }
                    Poll::Ready(Ok(body)) => {
                        let busy = body.as_slice() == b"*CS=DI";
                        let free = body.as_slice() == b"*CS=EN";
                        if free {
                            match &task.kind {
                                UhfTaskKind::Transmit { .. } => {
                                    let UhfTaskKind::Transmit { destination_modem_id, reader, .. } =
                                        core::mem::replace(&mut task.kind, UhfTaskKind::QueryInfo)
                                    else {
                                        unreachable!("matched Transmit above")
                                    };
                                    let mut writer = heapless::Vec::new();
                                    let _ = writer.extend_from_slice(b"@DT");
                                    push_hex_u8(&mut writer, reader.readable_count() as u8);
                                    *phase = CommandPhase::SendDtHeader {
                                        writer,
                                        written: 0,
                                        destination_modem_id,
                                        reader,
                                    };
                                }
                                UhfTaskKind::QueryInfo => { drop(guard); return self.finish_active(true); }
                            }
                        } else if busy {
                            let retries_left = MAX_RETRIES;
                            let backoff_ms = rand.gen_u32(BACKOFF_MIN_MS, BACKOFF_MAX_MS);
                            *phase = CommandPhase::Backoff {
                                delay: Delay::new(now, crate::time::Duration::from_millis(backoff_ms as u64)),
                                retries_left,
                            };
                        } else {
                            drop(guard);
                            return self.finish_active(false);
                        }
                    }
                },
                CommandPhase::Backoff { delay, retries_left } => match delay.poll(now) {
                    Poll::Pending => return,
                    Poll::Ready(()) => {
                        if *retries_left == 0 {
                            drop(guard);
                            return self.finish_active(false);
                        }
                        *retries_left -= 1;
                        *phase = CommandPhase::SendCarrierSense {
                            writer: LiteralWriter::new(*b"@CS\r\n"),
                        };
                    }
                },
                CommandPhase::SendDtHeader { writer, written, .. } => {
                    while *written < writer.len() {
                        match guard.poll_writable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                guard.write_unchecked(writer[*written]);
                                *written += 1;
                            }
                        }
                    }
                    let CommandPhase::SendDtHeader { reader, destination_modem_id, .. } =
                        core::mem::replace(phase, CommandPhase::AwaitDtAck { line: BoundedLine::new() })
                    else {
                        unreachable!("just matched SendDtHeader above")
                    };
                    *phase = CommandPhase::SendDtPayload { reader, pending_byte: None, destination_modem_id };
                }
                CommandPhase::SendDtPayload { reader, pending_byte, destination_modem_id } => {
                    // protocol number is written by the caller as byte 0 of
                    // the frame buffer, so it's carried along with the rest
                    // of the payload rather than handled specially here.
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
                    let mut writer = heapless::Vec::new();
                    let _ = writer.extend_from_slice(b"/R");
                    push_hex_u8(&mut writer, *destination_modem_id);
                    let _ = writer.extend_from_slice(b"\r\n");
                    *phase = CommandPhase::SendDtTrailer { written: 0, writer };
                }
                CommandPhase::SendDtTrailer { writer, written } => {
                    while *written < writer.len() {
                        match guard.poll_writable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                guard.write_unchecked(writer[*written]);
                                *written += 1;
                            }
                        }
                    }
                    *phase = CommandPhase::AwaitDtAck { line: BoundedLine::new() };
                }
                CommandPhase::AwaitDtAck { line } => match line.poll_deserialize(&mut *guard) {
                    Poll::Pending => return,
                    Poll::Ready(_) => { drop(guard); return self.finish_active(true); }
                },
            }
        }
    }

    /// Drives the `SN`/`EI` handshake one step at a time; a no-op once
    /// probing hasn't happened yet or the handshake has already completed.
    fn drive_identity(&mut self, _now: Instant) {
        if matches!(self.identity, IdentityStage::AwaitProbe | IdentityStage::Done) {
            return;
        }
        let Some(mut guard) = self.stream.try_lock() else { return };
        loop {
            match &mut self.identity {
                IdentityStage::AwaitProbe | IdentityStage::Done => return,
                IdentityStage::SendSerialNumberQuery { writer } => match writer.poll_serialize(&mut *guard) {
                    Poll::Pending => return,
                    Poll::Ready(()) => {
                        self.identity = IdentityStage::AwaitSerialNumberResponse { line: BoundedLine::new() };
                    }
                },
                IdentityStage::AwaitSerialNumberResponse { line } => match line.poll_deserialize(&mut *guard) {
                    Poll::Pending => return,
                    // A modem that doesn't answer `@SN` sensibly can't be
                    // retried into sense; park rather than loop forever.
                    Poll::Ready(Err(_)) => {
                        self.identity = IdentityStage::Done;
                        return;
                    }
                    Poll::Ready(Ok(body)) => {
                        if body.len() < 2 {
                            self.identity = IdentityStage::Done;
                            return;
                        }
                        let id = parse_hex_u8(&body[body.len() - 2..]);
                        let mut writer = heapless::Vec::new();
                        let _ = writer.extend_from_slice(b"@EI");
                        push_hex_u8(&mut writer, id);
                        let _ = writer.extend_from_slice(b"\r\n");
                        self.identity = IdentityStage::SendEquipmentIdCommand { writer, written: 0, id };
                    }
                },
                IdentityStage::SendEquipmentIdCommand { writer, written, id } => {
                    while *written < writer.len() {
                        match guard.poll_writable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                guard.write_unchecked(writer[*written]);
                                *written += 1;
                            }
                        }
                    }
                    self.identity = IdentityStage::AwaitEquipmentIdResponse { line: BoundedLine::new(), id: *id };
                }
                IdentityStage::AwaitEquipmentIdResponse { line, id } => match line.poll_deserialize(&mut *guard) {
                    Poll::Pending => return,
                    Poll::Ready(_) => {
                        self.equipment_id = Some(*id);
                        self.identity = IdentityStage::Done;
                        return;
                    }
                },
            }
        }
    }

    fn finish_active(&mut self, success: bool) {
        if let Some((task, _)) = self.active.take() {
            task.success.set_value(success);
        }
    }

    fn poll_dr<const Q: usize>(&mut self, now: Instant, inbound: &mut LinkFrameQueue<'a, N, K, Q>) {
        let Some(mut guard) = self.stream.try_lock() else { return };
        loop {
            let phase = self.dr_phase.get_or_insert_with(|| DrPhase::AwaitPrefix { matched: 0 });
            match phase {
                DrPhase::AwaitPrefix { matched } => match guard.poll_readable() {
                    Poll::Pending => return,
                    Poll::Ready(()) => {
                        let byte = guard.read_unchecked();
                        if byte == DR_PREFIX[*matched] {
                            *matched += 1;
                            if *matched == DR_PREFIX.len() {
                                self.dr_phase = Some(DrPhase::AwaitLength { digits: [0; 2], filled: 0 });
                            }
                        } else {
                            *matched = if byte == DR_PREFIX[0] { 1 } else { 0 };
                        }
                    }
                },
                DrPhase::AwaitLength { digits, filled } => {
                    while *filled < 2 {
                        match guard.poll_readable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                digits[*filled] = guard.read_unchecked();
                                *filled += 1;
                            }
                        }
                    }
                    let length = parse_hex_u8(digits.as_slice()) as usize;
                    match self.pool.allocate(length) {
                        Some((reader, writer)) => {
                            self.dr_phase =
                                Some(DrPhase::ReadingPayload { remaining: length, reader: Some(reader), writer });
                        }
                        None => self.dr_phase = Some(DrPhase::AwaitPrefix { matched: 0 }),
                    }
                }
                DrPhase::ReadingPayload { remaining, reader, writer } => {
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
                    self.dr_phase = Some(DrPhase::AwaitSourcePrefix { reader, matched: 0 });
                }
                DrPhase::AwaitSourcePrefix { matched, .. } => match guard.poll_readable() {
                    Poll::Pending => return,
                    Poll::Ready(()) => {
                        let byte = guard.read_unchecked();
                        if byte == DR_SOURCE_PREFIX[*matched] {
                            *matched += 1;
                            if *matched == DR_SOURCE_PREFIX.len() {
                                let Some(DrPhase::AwaitSourcePrefix { reader, .. }) =
                                    core::mem::replace(&mut self.dr_phase, None)
                                else {
                                    unreachable!("just matched AwaitSourcePrefix above")
                                };
                                self.dr_phase = Some(DrPhase::AwaitSourceDigits { reader, digits: [0; 2], filled: 0 });
                            }
                        } else {
                            // Malformed trailer: the buffered payload is
                            // dropped and the scan resumes looking for the
                            // next `*DR=` (spec §7 "malformed -> invisible").
                            self.dr_phase = Some(DrPhase::AwaitPrefix { matched: 0 });
                        }
                    }
                },
                DrPhase::AwaitSourceDigits { digits, filled, .. } => {
                    while *filled < 2 {
                        match guard.poll_readable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                digits[*filled] = guard.read_unchecked();
                                *filled += 1;
                            }
                        }
                    }
                    let source = parse_hex_u8(digits.as_slice());
                    let Some(DrPhase::AwaitSourceDigits { reader, .. }) = core::mem::replace(&mut self.dr_phase, None)
                    else {
                        unreachable!("just matched AwaitSourceDigits above")
                    };
                    self.dr_phase = Some(DrPhase::AwaitTrailingCrlf { reader, source, matched: 0 });
                }
                DrPhase::AwaitTrailingCrlf { matched, .. } => match guard.poll_readable() {
                    Poll::Pending => return,
                    Poll::Ready(()) => {
                        let byte = guard.read_unchecked();
                        if byte != DR_CRLF[*matched] {
                            self.dr_phase = Some(DrPhase::AwaitPrefix { matched: 0 });
                            continue;
                        }
                        *matched += 1;
                        if *matched < DR_CRLF.len() {
                            continue;
                        }
                        let Some(DrPhase::AwaitTrailingCrlf { mut reader, source, .. }) =
                            core::mem::replace(&mut self.dr_phase, None)
                        else {
                            unreachable!("just matched AwaitTrailingCrlf above")
                        };
                        let protocol_byte = {
                            let mut buf = [0u8; 1];
                            reader.read(&mut buf);
                            buf[0]
                        };
                        if let Some(protocol_number) = ProtocolNumber::from_u8(protocol_byte) {
                            inbound.push(QueuedFrame {
                                protocol_number,
                                destination: LinkAddress::Uhf(source as u16),
                                reader,
                                enqueued_at: now,
                            });
                        }
                    }
                },
            }
        }
    }
}

fn push_hex_u8<const N: usize>(buf: &mut heapless::Vec<u8, N>, value: u8) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let _ = buf.push(DIGITS[(value >> 4) as usize]);
    let _ = buf.push(DIGITS[(value & 0x0F) as usize]);
}

fn parse_hex_u8(bytes: &[u8]) -> u8 {
    let mut value: u8 = 0;
    for &b in bytes {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'A'..=b'F' => b - b'A' + 10,
            b'a'..=b'f' => b - b'a' + 10,
            _ => 0,
        };
        value = value.wrapping_mul(16).wrapping_add(digit);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::link::frame::ProtocolNumber;
    use crate::serde::test_support::FakeStream;
    use crate::sync::oneshot::Channel;
    use crate::time::test_support::DeterministicRand;

    /// Spec §8 scenario 1: node A (equipment id `0xAB`) sends `"HELLO"`
    /// (protocol 1) to node B (`0xCD`); on the wire this is `@CS\r\n`,
    /// `*CS=EN\r\n`, then `@DT06\x01HELLO/RCD\r\n`.
    #[test]
    fn scenario_1_uhf_send_emits_carrier_sense_then_dt() {
        let pool: BufferPool<8, 8> = BufferPool::new();
        let (reader, mut writer) = pool.allocate(6).unwrap();
        writer.write(&[ProtocolNumber::RoutingNeighbor as u8]);
        writer.write(b"HELLO");

        let channel: Channel<bool> = Channel::new();
        let (_future, promise) = channel.split();

        let mut stream: FakeStream<64> = FakeStream::new();
        stream.feed(b"*CS=EN\r\n");

        let mut driver: UhfDriver<_, 8, 8> = UhfDriver::new(stream, &pool);
        driver.enqueue(UhfTask {
            kind: UhfTaskKind::Transmit { destination_modem_id: 0xCD, protocol_number: ProtocolNumber::RoutingNeighbor, reader },
            success: promise,
        });

        let mut rand = DeterministicRand::new(1);
        let mut inbound: LinkFrameQueue<8, 8, 4> = LinkFrameQueue::new();
        driver.execute(crate::time::Instant::from_millis(0), &mut rand, &mut inbound);

        let guard = driver.stream.try_lock().unwrap();
        assert_eq!(guard.written(), &b"@CS\r\n@DT06\x01HELLO/RCD\r\n"[..]);
    }

    /// Spec §8 scenario 1, receive half: `*DR=06\x01HELLO\RAB\r\n` yields
    /// an inbound frame `protocol=1, peer=UHF(0xAB), payload="HELLO"`.
    #[test]
    fn scenario_1_uhf_receive_parses_dr_line() {
        let pool: BufferPool<8, 8> = BufferPool::new();
        let mut stream: FakeStream<64> = FakeStream::new();
        stream.feed(b"*DR=06\x01HELLO\\RAB\r\n");

        let mut driver: UhfDriver<_, 8, 8> = UhfDriver::new(stream, &pool);
        let mut rand = DeterministicRand::new(1);
        let mut inbound: LinkFrameQueue<8, 8, 4> = LinkFrameQueue::new();
        driver.execute(crate::time::Instant::from_millis(0), &mut rand, &mut inbound);

        let mut frame = inbound.pop_front().expect("DR line should deliver a frame");
        assert_eq!(frame.protocol_number, ProtocolNumber::RoutingNeighbor);
        assert_eq!(frame.destination, LinkAddress::Uhf(0xAB));
        let mut payload = [0u8; 5];
        assert_eq!(frame.reader.read(&mut payload), 5);
        assert_eq!(&payload, b"HELLO");
    }

    /// Spec §4.4 identity bring-up: after the `*ER=0` probe matches, the
    /// driver queries `@SN`, derives the equipment id from the serial
    /// number's last 2 characters, and confirms it with `@EI` before
    /// `equipment_id()` becomes populated.
    #[test]
    fn identity_bring_up_derives_equipment_id_from_serial_number() {
        let pool: BufferPool<8, 8> = BufferPool::new();
        let mut stream: FakeStream<64> = FakeStream::new();
        stream.feed(b"*ER=0\r\n");
        stream.feed(b"*SN=123456789\r\n");
        stream.feed(b"*EI=89\r\n");

        let mut driver: UhfDriver<_, 8, 8> = UhfDriver::new(stream, &pool);
        let mut detector = MediaDetector::new();
        driver.poll_probe(&mut detector);
        assert_eq!(detector.poll_media_detection(crate::time::Instant::from_millis(0)), Poll::Ready(crate::link::media::MediaType::Uhf));
        assert_eq!(driver.equipment_id(), None);

        let mut rand = DeterministicRand::new(1);
        let mut inbound: LinkFrameQueue<8, 8, 4> = LinkFrameQueue::new();
        driver.execute(crate::time::Instant::from_millis(0), &mut rand, &mut inbound);

        assert_eq!(driver.equipment_id(), Some(0x89));
        let guard = driver.stream.try_lock().unwrap();
        assert_eq!(guard.written(), &b"@SN\r\n@EI89\r\n"[..]);
    }
}
