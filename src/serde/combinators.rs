//! Concrete (de)serializer combinators built on [`super::AsyncReadable`] /
//! [`super::AsyncWritable`].
//!
//! Grounded on `arduino/lib/nb/src/nb/stream/fixed_bytes.h` (fixed-length
//! reads), `arduino/lib/serde/src/serde/bin.h` (little-endian integers),
//! and the UHF/Wi-Fi drivers' own `\r\n`-terminated line reading.

use super::{AsyncDeserialize, AsyncReadable, AsyncSerialize, AsyncWritable, ReadStatus};
use crate::poll::Poll;

/// Reads a fixed-width little-endian unsigned integer. Restartable cursor
/// handling is trivial here because every byte value is valid; it exists
/// purely so the combinator composes uniformly with the others.
pub struct LeU8 {
    start: Option<usize>,
}

impl LeU8 {
    pub fn new() -> Self {
        Self { start: None }
    }
}

impl<R: AsyncReadable> AsyncDeserialize<R> for LeU8 {
    type Output = u8;

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<u8, ReadStatus>> {
        self.start.get_or_insert_with(|| reader.cursor());
        match reader.poll_readable() {
            Poll::Pending => Poll::Pending,
            Poll::Ready(()) => Poll::Ready(Ok(reader.read_unchecked())),
        }
    }
}

pub struct LeU16 {
    buf: [u8; 2],
    filled: usize,
}

impl LeU16 {
    pub fn new() -> Self {
        Self { buf: [0; 2], filled: 0 }
    }
}

impl<R: AsyncReadable> AsyncDeserialize<R> for LeU16 {
    type Output = u16;

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<u16, ReadStatus>> {
        while self.filled < 2 {
            match reader.poll_readable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    self.buf[self.filled] = reader.read_unchecked();
                    self.filled += 1;
                }
            }
        }
        Poll::Ready(Ok(u16::from_le_bytes(self.buf)))
    }
}

pub struct LeU32 {
    buf: [u8; 4],
    filled: usize,
}

impl LeU32 {
    pub fn new() -> Self {
        Self { buf: [0; 4], filled: 0 }
    }
}

impl<R: AsyncReadable> AsyncDeserialize<R> for LeU32 {
    type Output = u32;

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<u32, ReadStatus>> {
        while self.filled < 4 {
            match reader.poll_readable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    self.buf[self.filled] = reader.read_unchecked();
                    self.filled += 1;
                }
            }
        }
        Poll::Ready(Ok(u32::from_le_bytes(self.buf)))
    }
}

/// Expects an exact fixed byte sequence. On mismatch, rewinds the reader
/// to the cursor observed before the first byte of this literal was
/// consumed and reports `Invalid`, so a caller trying several literal
/// alternatives in turn (a tagged union) doesn't lose bytes.
pub struct Literal<const N: usize> {
    expected: [u8; N],
    matched: usize,
    start: Option<usize>,
}

impl<const N: usize> Literal<N> {
    pub fn new(expected: [u8; N]) -> Self {
        Self { expected, matched: 0, start: None }
    }
}

impl<R: AsyncReadable, const N: usize> AsyncDeserialize<R> for Literal<N> {
    type Output = ();

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<(), ReadStatus>> {
        let start = *self.start.get_or_insert_with(|| reader.cursor());
        while self.matched < N {
            match reader.poll_readable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    let byte = reader.read_unchecked();
                    if byte != self.expected[self.matched] {
                        reader.rewind(start);
                        return Poll::Ready(Err(ReadStatus::Invalid));
                    }
                    self.matched += 1;
                }
            }
        }
        Poll::Ready(Ok(()))
    }
}

/// Reads and discards bytes up to and including a `\r\n` terminator.
/// Used for responses whose content isn't needed (e.g. UHF `*IR=...`).
pub struct DiscardingLine {
    last_was_cr: bool,
}

impl DiscardingLine {
    pub fn new() -> Self {
        Self { last_was_cr: false }
    }
}

impl<R: AsyncReadable> AsyncDeserialize<R> for DiscardingLine {
    type Output = ();

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<(), ReadStatus>> {
        loop {
            match reader.poll_readable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    let byte = reader.read_unchecked();
                    if self.last_was_cr && byte == b'\n' {
                        return Poll::Ready(Ok(()));
                    }
                    self.last_was_cr = byte == b'\r';
                }
            }
        }
    }
}

/// Reads a `\r\n`-terminated line into a fixed-capacity buffer. Returns
/// `NotEnoughLength` if more than `N` content bytes arrive before the
/// terminator (spec §7 "Protocol: InvalidLength").
pub struct BoundedLine<const N: usize> {
    buf: heapless::Vec<u8, N>,
    last_was_cr: bool,
}

impl<const N: usize> BoundedLine<N> {
    pub fn new() -> Self {
        Self { buf: heapless::Vec::new(), last_was_cr: false }
    }
}

impl<R: AsyncReadable, const N: usize> AsyncDeserialize<R> for BoundedLine<N> {
    type Output = heapless::Vec<u8, N>;

    fn poll_deserialize(&mut self, reader: &mut R) -> Poll<Result<heapless::Vec<u8, N>, ReadStatus>> {
        loop {
            match reader.poll_readable() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    let byte = reader.read_unchecked();
                    if self.last_was_cr && byte == b'\n' {
                        self.buf.pop(); // drop the trailing \r already pushed
                        return Poll::Ready(Ok(core::mem::take(&mut self.buf)));
                    }
                    self.last_was_cr = byte == b'\r';
                    if self.buf.push(byte).is_err() {
                        return Poll::Ready(Err(ReadStatus::NotEnoughLength));
                    }
                }
            }
        }
    }
}

/// Writes a fixed byte literal.
pub struct LiteralWriter<const N: usize> {
    bytes: [u8; N],
    written: usize,
}

impl<const N: usize> LiteralWriter<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self { bytes, written: 0 }
    }
}

impl<W: AsyncWritable, const N: usize> AsyncSerialize<W> for LiteralWriter<N> {
    fn poll_serialize(&mut self, writer: &mut W) -> Poll<()> {
        while self.written < N {
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
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serde::test_support::FakeStream;

    #[test]
    fn le_u16_round_trip() {
        let mut stream: FakeStream<8> = FakeStream::new();
        stream.feed(&0x1234u16.to_le_bytes());
        let mut de = LeU16::new();
        assert_eq!(de.poll_deserialize(&mut stream), Poll::Ready(Ok(0x1234)));
    }

    #[test]
    fn literal_mismatch_is_invalid_and_restartable() {
        // FakeStream's rewind() is a no-op marker, so the restartable
        // property is checked against FrameBufferReader, which actually
        // moves its read cursor back.
        let pool: crate::buffer::BufferPool<4, 4> = crate::buffer::BufferPool::new();
        let (mut reader, mut writer) = pool.allocate(2).unwrap();
        writer.write(b"XY");

        let before = reader.cursor();
        let mut lit = Literal::new(*b"AB");
        assert_eq!(lit.poll_deserialize(&mut reader), Poll::Ready(Err(ReadStatus::Invalid)));
        assert_eq!(reader.cursor(), before);

        // The un-consumed bytes are still there for a subsequent combinator
        // to try, rather than having been dropped on the floor.
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf), 2);
        assert_eq!(&buf, b"XY");
    }

    #[test]
    fn discarding_line_consumes_until_crlf() {
        let mut stream: FakeStream<16> = FakeStream::new();
        stream.feed(b"ignored content\r\n");
        let mut line = DiscardingLine::new();
        assert_eq!(line.poll_deserialize(&mut stream), Poll::Ready(Ok(())));
    }

    #[test]
    fn bounded_line_reports_overflow() {
        let mut stream: FakeStream<16> = FakeStream::new();
        stream.feed(b"too long content\r\n");
        let mut line: BoundedLine<4> = BoundedLine::new();
        assert_eq!(
            line.poll_deserialize(&mut stream),
            Poll::Ready(Err(ReadStatus::NotEnoughLength))
        );
    }

    #[test]
    fn bounded_line_returns_content_without_terminator() {
        let mut stream: FakeStream<16> = FakeStream::new();
        stream.feed(b"CS=EN\r\n");
        let mut line: BoundedLine<8> = BoundedLine::new();
        match line.poll_deserialize(&mut stream) {
            Poll::Ready(Ok(bytes)) => assert_eq!(&bytes[..], b"CS=EN"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
