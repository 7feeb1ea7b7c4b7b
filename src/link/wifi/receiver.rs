//! Byte-level classifier for the Wi-Fi modem's response stream (spec §4.5
//! "Message receiver").
//!
//! Reads up to 11 bytes (the longest known fixed header, `WIFI GOT IP`) to
//! decide which kind of message is arriving, then hands off to whichever
//! body handler owns that header's terminator.

use heapless::Vec;

use crate::poll::Poll;
use crate::serde::{AsyncReadable, ReadStatus};

const LOOKAHEAD: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    WifiHeader,
    IpdHeader,
    SendPrompt,
    Ok,
    Error,
    Fail,
    SendOk,
    SendFail,
    UnknownHeader,
}

const CANDIDATES: &[(&[u8], MessageKind)] = &[
    (b"WIFI ", MessageKind::WifiHeader),
    (b"+IPD,", MessageKind::IpdHeader),
    (b"> ", MessageKind::SendPrompt),
    (b"OK\r\n", MessageKind::Ok),
    (b"ERROR\r\n", MessageKind::Error),
    (b"FAIL\r\n", MessageKind::Fail),
    (b"SEND OK\r\n", MessageKind::SendOk),
    (b"SEND FAIL\r\n", MessageKind::SendFail),
];

/// Classifies the next message on the stream without consuming bytes
/// belonging to the body; once a candidate is committed to, its own body
/// handler (caller-owned) reads the remainder to that header's terminator.
pub struct MessageReceiver {
    lookahead: Vec<u8, LOOKAHEAD>,
}

impl MessageReceiver {
    pub fn new() -> Self {
        Self { lookahead: Vec::new() }
    }

    pub fn poll_classify<R: AsyncReadable>(&mut self, reader: &mut R) -> Poll<Result<MessageKind, ReadStatus>> {
        loop {
            for &(prefix, kind) in CANDIDATES {
                if self.lookahead.len() >= prefix.len() && &self.lookahead[..prefix.len()] == prefix {
                    return Poll::Ready(Ok(kind));
                }
            }
            if self.lookahead.len() == LOOKAHEAD {
                return Poll::Ready(Ok(MessageKind::UnknownHeader));
            }
            match reader.poll_readable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    let byte = reader.read_unchecked();
                    let _ = self.lookahead.push(byte);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.lookahead.clear();
    }

    /// Bytes already consumed while classifying, for a body handler that
    /// needs to account for a header it has already partially read (e.g.
    /// `+IPD,` consumed before the length/ip/port fields).
    pub fn consumed(&self) -> &[u8] {
        &self.lookahead
    }
}

impl Default for MessageReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serde::test_support::FakeStream;

    #[test]
    fn classifies_ipd_header() {
        let mut stream: FakeStream<32> = FakeStream::new();
        stream.feed(b"+IPD,10,192.168.1.1,1234:");
        let mut recv = MessageReceiver::new();
        assert_eq!(recv.poll_classify(&mut stream), Poll::Ready(Ok(MessageKind::IpdHeader)));
    }

    #[test]
    fn classifies_send_ok() {
        let mut stream: FakeStream<32> = FakeStream::new();
        stream.feed(b"SEND OK\r\n");
        let mut recv = MessageReceiver::new();
        assert_eq!(recv.poll_classify(&mut stream), Poll::Ready(Ok(MessageKind::SendOk)));
    }
}
