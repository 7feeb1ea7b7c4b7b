//! Link-level addressing (spec §3 "Link address").

use crate::poll::Poll;
use crate::serde::{AsyncDeserialize, AsyncReadable, AsyncSerialize, AsyncWritable, ReadStatus};

/// Tagged union of per-medium addresses. Equality is componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAddress {
    Serial(u8),
    Uhf(u16),
    Ipv4 { addr: u32, port: u16 },
}

const TAG_SERIAL: u8 = 0;
const TAG_UHF: u8 = 1;
const TAG_IPV4: u8 = 2;

impl LinkAddress {
    /// Fixed serialized forms: 1+1, 1+2, 1+6 bytes (tag + payload).
    pub fn serialized_length(&self) -> usize {
        match self {
            LinkAddress::Serial(_) => 2,
            LinkAddress::Uhf(_) => 3,
            LinkAddress::Ipv4 { .. } => 7,
        }
    }
}

pub struct AsyncLinkAddressDeserializer {
    tag: Option<u8>,
    buf: heapless::Vec<u8, 6>,
    needed: usize,
}

impl AsyncLinkAddressDeserializer {
    pub fn new() -> Self {
        Self { tag: None, buf: heapless::Vec::new(), needed: 0 }
    }
}

impl<R: AsyncReadable> AsyncDeserialize<R> for AsyncLinkAddressDeserializer {
    type Output = LinkAddress;

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<LinkAddress, ReadStatus>> {
        if self.tag.is_none() {
            match reader.poll_readable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    let tag = reader.read_unchecked();
                    self.needed = match tag {
                        TAG_SERIAL => 1,
                        TAG_UHF => 2,
                        TAG_IPV4 => 6,
                        _ => return Poll::Ready(Err(ReadStatus::Invalid)),
                    };
                    self.tag = Some(tag);
                }
            }
        }

        while self.buf.len() < self.needed {
            match reader.poll_readable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    let byte = reader.read_unchecked();
                    let _ = self.buf.push(byte);
                }
            }
        }

        let result = match self.tag.unwrap() {
            TAG_SERIAL => LinkAddress::Serial(self.buf[0]),
            TAG_UHF => LinkAddress::Uhf(u16::from_le_bytes([self.buf[0], self.buf[1]])),
            TAG_IPV4 => LinkAddress::Ipv4 {
                addr: u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]),
                port: u16::from_le_bytes([self.buf[4], self.buf[5]]),
            },
            _ => unreachable!("tag validated on read"),
        };
        Poll::Ready(Ok(result))
    }
}

pub struct AsyncLinkAddressSerializer {
    bytes: heapless::Vec<u8, 7>,
    written: usize,
}

impl AsyncLinkAddressSerializer {
    pub fn new(address: LinkAddress) -> Self {
        let mut bytes = heapless::Vec::new();
        match address {
            LinkAddress::Serial(id) => {
                let _ = bytes.push(TAG_SERIAL);
                let _ = bytes.push(id);
            }
            LinkAddress::Uhf(id) => {
                let _ = bytes.push(TAG_UHF);
                let _ = bytes.extend_from_slice(&id.to_le_bytes());
            }
            LinkAddress::Ipv4 { addr, port } => {
                let _ = bytes.push(TAG_IPV4);
                let _ = bytes.extend_from_slice(&addr.to_le_bytes());
                let _ = bytes.extend_from_slice(&port.to_le_bytes());
            }
        }
        Self { bytes, written: 0 }
    }
}

impl<W: AsyncWritable> AsyncSerialize<W> for AsyncLinkAddressSerializer {
    fn poll_serialize(&mut self, writer: &mut W) -> Poll<()> {
        while self.written < self.bytes.len() {
            match writer.poll_writable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    writer.write_unchecked(self.bytes[self.written]);
                    self.written += 1;
                }
            }
        }
        Poll::Ready(())
    }

    fn serialized_length(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serde::test_support::FakeStream;

    #[test]
    fn round_trip_every_variant() {
        for addr in [
            LinkAddress::Serial(0x12),
            LinkAddress::Uhf(0xABCD),
            LinkAddress::Ipv4 { addr: 0xC0A80001, port: 1234 },
        ] {
            let mut out_stream: FakeStream<8> = FakeStream::new();
            let mut ser = AsyncLinkAddressSerializer::new(addr);
            assert_eq!(ser.poll_serialize(&mut out_stream), Poll::Ready(()));

            let mut in_stream: FakeStream<8> = FakeStream::new();
            in_stream.feed(out_stream.written());
            let mut de = AsyncLinkAddressDeserializer::new();
            assert_eq!(de.poll_deserialize(&mut in_stream), Poll::Ready(Ok(addr)));
        }
    }
}
