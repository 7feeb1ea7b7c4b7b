//! Wi-Fi driver executor (spec §4.5).
//!
//! One task owns the stream at a time, same discipline as the UHF driver.
//! Unsolicited `+IPD` demux can interleave between tasks because it is
//! driven by the shared [`MessageReceiver`] rather than a task phase.

use heapless::Deque;

use crate::buffer::{BufferPool, FrameBufferReader, FrameBufferWriter};
use crate::link::frame::ProtocolNumber;
use crate::link::media::MediaDetector;
use crate::link::queue::{LinkFrameQueue, QueuedFrame};
use crate::link::wifi::control::WifiControlTask;
use crate::link::wifi::receiver::{MessageKind, MessageReceiver};
use crate::link::LinkAddress;
use crate::poll::Poll;
use crate::serde::combinators::BoundedLine;
use crate::serde::{AsyncDeserialize, AsyncReadable, AsyncWritable};
use crate::sync::{Delay, Mutex};
use crate::time::Instant;

enum TaskPhase {
    SendCommand { writer: heapless::Vec<u8, 64> },
    AwaitResponse { deadline: Delay },
    AwaitSendPrompt { deadline: Delay },
    WriteSendBody { written: usize },
    AwaitSendResult { deadline: Delay },
}

enum IpdPhase<'a, const N: usize, const K: usize> {
    AwaitRestOfHeader { line: BoundedLine<48> },
    ReadingPayload {
        remaining: usize,
        ip: u32,
        port: u16,
        reader: Option<FrameBufferReader<'a, N, K>>,
        writer: FrameBufferWriter<'a, N, K>,
    },
}

pub struct WifiDriver<'a, S, const N: usize, const K: usize> {
    stream: Mutex<S>,
    pool: &'a BufferPool<N, K>,
    receiver: MessageReceiver,
    pending: Deque<WifiControlTask<'a, N, K>, 4>,
    active: Option<(WifiControlTask<'a, N, K>, TaskPhase)>,
    ipd: Option<IpdPhase<'a, N, K>>,
    probed: bool,
}

impl<'a, S, const N: usize, const K: usize> WifiDriver<'a, S, N, K>
where
    S: AsyncReadable + AsyncWritable,
{
    pub fn new(stream: S, pool: &'a BufferPool<N, K>) -> Self {
        Self {
            stream: Mutex::new(stream),
            pool,
            receiver: MessageReceiver::new(),
            pending: Deque::new(),
            active: None,
            ipd: None,
            probed: false,
        }
    }

    pub fn enqueue(&mut self, task: WifiControlTask<'a, N, K>) -> bool {
        self.pending.push_back(task).is_ok()
    }

    pub fn poll_probe(&mut self, detector: &mut MediaDetector) {
        if self.probed {
            return;
        }
        let Some(mut guard) = self.stream.try_lock() else { return };
        match self.receiver.poll_classify(&mut *guard) {
            Poll::Ready(Ok(MessageKind::WifiHeader)) | Poll::Ready(Ok(MessageKind::Ok)) => {
                detector.report_wifi_match();
                self.probed = true;
                self.receiver.reset();
            }
            _ => {}
        }
    }

    pub fn execute<const Q: usize>(&mut self, now: Instant, inbound: &mut LinkFrameQueue<'a, N, K, Q>) {
        self.drive_active(now);
        if self.active.is_none() {
            if let Some(task) = self.pending.pop_front() {
                let writer = command_bytes(&task);
                self.active = Some((task, TaskPhase::SendCommand { writer }));
                self.drive_active(now);
            }
        }
        self.poll_unsolicited(now, inbound);
    }

    fn drive_active(&mut self, now: Instant) {
        if self.active.is_none() {
            return;
        }
        let Some(mut guard) = self.stream.try_lock() else { return };
        loop {
            let Some((task, phase)) = self.active.as_mut() else { return };
            match phase {
                TaskPhase::SendCommand { writer } => {
                    let mut w = LiteralWriterSlice { bytes: writer };
                    match w.poll_write_all(&mut *guard) {
                        Poll::Pending => return,
                        Poll::Ready(()) => {
                            *phase = match task {
                                WifiControlTask::SendData { .. } => {
                                    TaskPhase::AwaitSendPrompt { deadline: Delay::new(now, task.timeout()) }
                                }
                                _ => TaskPhase::AwaitResponse { deadline: Delay::new(now, task.timeout()) },
                            };
                        }
                    }
                }
                TaskPhase::AwaitResponse { deadline } => {
                    if deadline.poll(now).is_ready() {
                        drop(guard);
                        return self.finish_active(false);
                    }
                    match self.receiver.poll_classify(&mut *guard) {
                        Poll::Pending => return,
                        Poll::Ready(Ok(MessageKind::Ok)) => {
                            self.receiver.reset();
                            drop(guard);
                            return self.finish_active(true);
                        }
                        Poll::Ready(_) => {
                            self.receiver.reset();
                            drop(guard);
                            return self.finish_active(false);
                        }
                    }
                }
                TaskPhase::AwaitSendPrompt { deadline } => {
                    if deadline.poll(now).is_ready() {
                        drop(guard);
                        return self.finish_active(false);
                    }
                    match self.receiver.poll_classify(&mut *guard) {
                        Poll::Pending => return,
                        Poll::Ready(Ok(MessageKind::SendPrompt)) => {
                            self.receiver.reset();
                            *phase = TaskPhase::WriteSendBody { written: 0 };
                        }
                        Poll::Ready(_) => {
                            self.receiver.reset();
                            drop(guard);
                            return self.finish_active(false);
                        }
                    }
                }
                TaskPhase::WriteSendBody { written } => {
                    let WifiControlTask::SendData { reader, .. } = task else {
                        drop(guard);
                        return self.finish_active(false);
                    };
                    if *written == 0 {
                        // protocol number is byte 0 of the frame, already
                        // written by the application into the buffer.
                    }
                    let mut byte_buf = [0u8; 1];
                    loop {
                        if reader.is_complete() && reader.readable_count() == 0 {
                            break;
                        }
                        if reader.read(&mut byte_buf) == 0 {
                            return;
                        }
                        match guard.poll_writable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                guard.write_unchecked(byte_buf[0]);
                                *written += 1;
                            }
                        }
                    }
                    *phase = TaskPhase::AwaitSendResult {
                        deadline: Delay::new(now, crate::link::DEFAULT_TASK_TIMEOUT),
                    };
                }
                TaskPhase::AwaitSendResult { deadline } => {
                    if deadline.poll(now).is_ready() {
                        drop(guard);
                        return self.finish_active(false);
                    }
                    match self.receiver.poll_classify(&mut *guard) {
                        Poll::Pending => return,
                        Poll::Ready(Ok(MessageKind::SendOk)) => {
                            self.receiver.reset();
                            drop(guard);
                            return self.finish_active(true);
                        }
                        Poll::Ready(_) => {
                            self.receiver.reset();
                            drop(guard);
                            return self.finish_active(false);
                        }
                    }
                }
            }
        }
    }

    fn finish_active(&mut self, success: bool) {
        if let Some((task, _)) = self.active.take() {
            match task {
                WifiControlTask::JoinAp { success: p, .. }
                | WifiControlTask::StartUdpServer { success: p, .. }
                | WifiControlTask::StartTcpConnection { success: p, .. }
                | WifiControlTask::StartUdpConnection { success: p, .. }
                | WifiControlTask::SendData { success: p, .. } => p.set_value(success),
            }
        }
    }

    /// `+IPD` demux: only relevant when no task is mid-response (a task in
    /// `AwaitResponse`/`AwaitSendResult` already owns the classifier).
    fn poll_unsolicited<const Q: usize>(&mut self, now: Instant, inbound: &mut LinkFrameQueue<'a, N, K, Q>) {
        if self.active.is_some() {
            return;
        }
        let Some(mut guard) = self.stream.try_lock() else { return };

        if self.ipd.is_none() {
            match self.receiver.poll_classify(&mut *guard) {
                Poll::Ready(Ok(MessageKind::IpdHeader)) => {
                    self.receiver.reset();
                    self.ipd = Some(IpdPhase::AwaitRestOfHeader { line: BoundedLine::new() });
                }
                Poll::Ready(Ok(MessageKind::WifiHeader)) => {
                    self.receiver.reset();
                    return;
                }
                _ => return,
            }
        }

        loop {
            let Some(phase) = self.ipd.as_mut() else { return };
            match phase {
                IpdPhase::AwaitRestOfHeader { line } => match line.poll_deserialize(&mut *guard) {
                    Poll::Pending => return,
                    Poll::Ready(Err(_)) => {
                        self.ipd = None;
                        return;
                    }
                    Poll::Ready(Ok(rest)) => {
                        let Some((length, ip, port)) = parse_ipd_rest(&rest) else {
                            self.ipd = None;
                            return;
                        };
                        match self.pool.allocate(length) {
                            Some((reader, writer)) => {
                                self.ipd = Some(IpdPhase::ReadingPayload {
                                    remaining: length,
                                    ip,
                                    port,
                                    reader: Some(reader),
                                    writer,
                                });
                            }
                            None => self.ipd = None,
                        }
                    }
                },
                IpdPhase::ReadingPayload { remaining, ip, port, reader, writer } => {
                    while *remaining > 0 {
                        match guard.poll_readable() {
                            Poll::Pending => return,
                            Poll::Ready(()) => {
                                writer.write_byte(guard.read_unchecked());
                                *remaining -= 1;
                            }
                        }
                    }
                    let mut reader = reader.take().expect("populated on entry to ReadingPayload");
                    let mut proto_buf = [0u8; 1];
                    reader.read(&mut proto_buf);
                    let protocol_number = ProtocolNumber::from_u8(proto_buf[0]);
                    let destination = LinkAddress::Ipv4 { addr: *ip, port: *port };
                    self.ipd = None;
                    if let Some(protocol_number) = protocol_number {
                        inbound.push(QueuedFrame { protocol_number, destination, reader, enqueued_at: now });
                    }
                    return;
                }
            }
        }
    }
}

fn parse_ipd_rest(rest: &[u8]) -> Option<(usize, u32, u16)> {
    // `rest` is everything after `+IPD,` up to the `\r\n` the BoundedLine
    // consumed; the real wire terminator for this header is `:`, which
    // BoundedLine treats as ordinary content, so split it out here.
    let colon = rest.iter().position(|&b| b == b':')?;
    let fields = &rest[..colon];
    let mut parts = fields.split(|&b| b == b',');
    let length: usize = parse_ascii_uint(parts.next()?)? as usize;
    let ip_bytes = parts.next()?;
    let port: u16 = parse_ascii_uint(parts.next()?)? as u16;
    let mut octets = [0u8; 4];
    for (i, part) in ip_bytes.split(|&b| b == b'.').enumerate().take(4) {
        octets[i] = parse_ascii_uint(part)? as u8;
    }
    Some((length, u32::from_be_bytes(octets), port))
}

fn parse_ascii_uint(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }
    Some(value)
}

fn command_bytes<'a, const N: usize, const K: usize>(task: &WifiControlTask<'a, N, K>) -> heapless::Vec<u8, 64> {
    let mut out = heapless::Vec::new();
    match task {
        WifiControlTask::JoinAp { ssid, password, .. } => {
            let _ = out.extend_from_slice(b"AT+CWJAP=\"");
            let _ = out.extend_from_slice(ssid);
            let _ = out.extend_from_slice(b"\",\"");
            let _ = out.extend_from_slice(password);
            let _ = out.extend_from_slice(b"\"\r\n");
        }
        WifiControlTask::StartUdpServer { port, .. } => {
            let _ = out.extend_from_slice(b"AT+CIPSTART=\"UDP\",\"0.0.0.0\",");
            push_decimal(&mut out, *port as u32);
            let _ = out.extend_from_slice(b",2\r\n");
        }
        WifiControlTask::StartTcpConnection { ip, port, .. } => {
            let _ = out.extend_from_slice(b"AT+CIPSTART=\"TCP\",\"");
            push_ip(&mut out, *ip);
            let _ = out.extend_from_slice(b"\",");
            push_decimal(&mut out, *port as u32);
            let _ = out.extend_from_slice(b"\r\n");
        }
        WifiControlTask::StartUdpConnection { ip, port, local_port, .. } => {
            let _ = out.extend_from_slice(b"AT+CIPSTART=\"UDP\",\"");
            push_ip(&mut out, *ip);
            let _ = out.extend_from_slice(b"\",");
            push_decimal(&mut out, *port as u32);
            let _ = out.push(b',');
            push_decimal(&mut out, *local_port as u32);
            let _ = out.extend_from_slice(b",2\r\n");
        }
        WifiControlTask::SendData { reader, remote_ip, remote_port, .. } => {
            let _ = out.extend_from_slice(b"AT+CIPSEND=");
            push_decimal(&mut out, reader.readable_count() as u32);
            let _ = out.extend_from_slice(b",\"");
            push_ip(&mut out, remote_ip.to_be_bytes());
            let _ = out.extend_from_slice(b"\",");
            push_decimal(&mut out, *remote_port as u32);
            let _ = out.extend_from_slice(b"\r\n");
        }
    }
    out
}

fn push_decimal(out: &mut heapless::Vec<u8, 64>, mut value: u32) {
    let mut digits = [0u8; 10];
    let mut n = 0;
    if value == 0 {
        let _ = out.push(b'0');
        return;
    }
    while value > 0 {
        digits[n] = b'0' + (value % 10) as u8;
        value /= 10;
        n += 1;
    }
    for i in (0..n).rev() {
        let _ = out.push(digits[i]);
    }
}

fn push_ip(out: &mut heapless::Vec<u8, 64>, ip: [u8; 4]) {
    for (i, octet) in ip.iter().enumerate() {
        if i > 0 {
            let _ = out.push(b'.');
        }
        push_decimal(out, *octet as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::serde::test_support::FakeStream;
    use crate::sync::oneshot::Channel;

    #[test]
    fn scenario_2_wifi_udp_send_emits_cipsend_then_body() {
        let pool: BufferPool<8, 8> = BufferPool::new();
        let (reader, mut writer) = pool.allocate(6).unwrap();
        writer.write(&[0x21]);
        writer.write(b"abcde");

        let channel: Channel<bool> = Channel::new();
        let (mut future, promise) = channel.split();

        let mut stream: FakeStream<64> = FakeStream::new();
        stream.feed(b"> ");
        stream.feed(b"SEND OK\r\n");

        let mut driver: WifiDriver<_, 8, 8> = WifiDriver::new(stream, &pool);
        driver.enqueue(WifiControlTask::SendData {
            reader,
            remote_ip: 0xC0A80001,
            remote_port: 1234,
            success: promise,
        });

        let mut inbound: LinkFrameQueue<8, 8, 4> = LinkFrameQueue::new();
        driver.execute(crate::time::Instant::from_millis(0), &mut inbound);

        let guard = driver.stream.try_lock().unwrap();
        assert_eq!(guard.written(), &b"AT+CIPSEND=6,\"192.168.0.1\",1234\r\n\x21abcde"[..]);
        drop(guard);

        assert_eq!(future.poll(), Poll::Ready(true));
    }
}

struct LiteralWriterSlice<'a> {
    bytes: &'a mut heapless::Vec<u8, 64>,
}

impl<'a> LiteralWriterSlice<'a> {
    fn poll_write_all<W: AsyncWritable>(&mut self, writer: &mut W) -> Poll<()> {
        while !self.bytes.is_empty() {
            match writer.poll_writable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    writer.write_unchecked(self.bytes.remove(0));
                }
            }
        }
        Poll::Ready(())
    }
}
