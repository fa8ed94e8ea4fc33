//! Byte-stream boundaries: the downstream sink contract, a bounds-checked
//! slice reader for wire parsing, and the header-then-body record
//! reassembler fed by the ciphertext adapter.

use crate::record::RecordHeader;
use crate::Error;

/// Delivery failure reported by a [`StreamSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The sink cannot accept this many bytes right now. The operation had
    /// no effect and may be retried after the window opens.
    #[error("sink window is full")]
    WindowFull,
    /// The sink failed permanently.
    #[error("sink failed")]
    Failed,
}

/// One side of a byte-stream boundary, implemented by the embedding.
///
/// The session owns its downstream (ciphertext) sink through this trait.
/// Implementations must not call back into the session from inside these
/// methods; every callback runs to completion first and the session is
/// single-threaded.
pub trait StreamSink {
    /// Number of bytes the sink can accept without refusing delivery.
    fn window(&self) -> usize;

    /// Accept `data` in full, or refuse it without side effects.
    fn deliver(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Terminal notification: the session is closed with `reason` and will
    /// deliver nothing further.
    fn closed(&mut self, reason: Result<(), Error>);
}

/// Bounds-checked big-endian reader over a wire message.
///
/// Any read past the end of the message is a [`Error::ProtocolViolation`];
/// wire lengths that disagree with content are never trusted.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if len > self.remaining() {
            log::error!("read of {len} bytes overruns message ({} left)", self.remaining());
            return Err(Error::ProtocolViolation);
        }
        let slice: &'a [u8] = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.take(len).map(|_| ())
    }

    pub(crate) fn next_n<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        Ok(self.take(N)?.try_into().unwrap())
    }

    pub(crate) fn next_u8(&mut self) -> Result<u8, Error> {
        Ok(self.next_n::<1>()?[0])
    }

    pub(crate) fn next_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.next_n()?))
    }

    pub(crate) fn next_u24(&mut self) -> Result<u32, Error> {
        let bytes: [u8; 3] = self.next_n()?;
        Ok(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }
}

enum AssemblerState {
    Header { buf: [u8; RecordHeader::LEN], rcvd: usize },
    Body { header: RecordHeader, body: Vec<u8> },
}

/// Reassembles raw ciphertext bytes into records: 5 header bytes, then a
/// body buffer sized from the header. Arbitrary fragmentation of the input
/// byte stream is tolerated.
pub(crate) struct RecordAssembler {
    state: AssemblerState,
}

impl RecordAssembler {
    pub(crate) fn new() -> Self {
        Self {
            state: AssemblerState::Header {
                buf: [0; RecordHeader::LEN],
                rcvd: 0,
            },
        }
    }

    /// Consume bytes from the front of `data`, completing at most one
    /// record. Returns the number of bytes consumed and the completed
    /// record, if any.
    pub(crate) fn feed(
        &mut self,
        data: &[u8],
    ) -> Result<(usize, Option<(RecordHeader, Vec<u8>)>), Error> {
        let mut consumed: usize = 0;

        if let AssemblerState::Header { buf, rcvd } = &mut self.state {
            let n: usize = core::cmp::min(data.len(), RecordHeader::LEN - *rcvd);
            buf[*rcvd..*rcvd + n].copy_from_slice(&data[..n]);
            *rcvd += n;
            consumed += n;
            if *rcvd < RecordHeader::LEN {
                return Ok((consumed, None));
            }

            let header: RecordHeader = (*buf).into();
            if usize::from(header.length()) > crate::MAX_CIPHERTEXT_LEN {
                log::error!("record length {} overflows the record MTU", header.length());
                return Err(Error::ProtocolViolation);
            }
            self.state = AssemblerState::Body {
                header,
                body: Vec::with_capacity(header.length().into()),
            };
        }

        if let AssemblerState::Body { header, body } = &mut self.state {
            let remain: usize = usize::from(header.length()) - body.len();
            let n: usize = core::cmp::min(data.len() - consumed, remain);
            body.extend_from_slice(&data[consumed..consumed + n]);
            consumed += n;

            if body.len() == usize::from(header.length()) {
                let header: RecordHeader = *header;
                let body: Vec<u8> = core::mem::take(body);
                self.state = AssemblerState::Header {
                    buf: [0; RecordHeader::LEN],
                    rcvd: 0,
                };
                return Ok((consumed, Some((header, body))));
            }
        }

        Ok((consumed, None))
    }
}

#[cfg(test)]
mod tests {
    use super::{Reader, RecordAssembler};
    use crate::record::ContentType;
    use crate::Error;

    #[test]
    fn reader_primitives() {
        let mut reader = Reader::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(reader.next_u8().unwrap(), 0x01);
        assert_eq!(reader.next_u16().unwrap(), 0x0203);
        assert_eq!(reader.next_u24().unwrap(), 0x040506);
        assert!(reader.is_empty());
        assert_eq!(reader.next_u8(), Err(Error::ProtocolViolation));
    }

    #[test]
    fn reader_take_overrun() {
        let mut reader = Reader::new(&[0x01, 0x02]);
        assert_eq!(reader.take(3), Err(Error::ProtocolViolation));
        // the failed read consumed nothing
        assert_eq!(reader.take(2).unwrap(), &[0x01, 0x02]);
    }

    #[test]
    fn assembler_single_shot() {
        let mut assembler = RecordAssembler::new();
        let wire: &[u8] = &[22, 3, 3, 0, 2, 0xAB, 0xCD, 99];

        let (consumed, record) = assembler.feed(wire).unwrap();
        assert_eq!(consumed, 7); // trailing byte belongs to the next record
        let (header, body) = record.unwrap();
        assert_eq!(header.content_type(), Ok(ContentType::Handshake));
        assert_eq!(body, [0xAB, 0xCD]);
    }

    #[test]
    fn assembler_byte_at_a_time() {
        let mut assembler = RecordAssembler::new();
        let wire: &[u8] = &[23, 3, 1, 0, 3, 0x01, 0x02, 0x03];

        let mut record = None;
        for (i, byte) in wire.iter().enumerate() {
            let (consumed, complete) = assembler.feed(core::slice::from_ref(byte)).unwrap();
            assert_eq!(consumed, 1);
            if let Some(complete) = complete {
                assert_eq!(i, wire.len() - 1);
                record = Some(complete);
            }
        }
        let (header, body) = record.unwrap();
        assert_eq!(header.length(), 3);
        assert_eq!(body, [0x01, 0x02, 0x03]);
    }

    #[test]
    fn assembler_zero_length_record() {
        let mut assembler = RecordAssembler::new();
        let (consumed, record) = assembler.feed(&[23, 3, 3, 0, 0]).unwrap();
        assert_eq!(consumed, 5);
        let (_, body) = record.unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn assembler_rejects_oversized_record() {
        let mut assembler = RecordAssembler::new();
        // 0x4801 = 18433 > 2^14 + 2048
        assert_eq!(
            assembler.feed(&[23, 3, 3, 0x48, 0x01]).map(|_| ()),
            Err(Error::ProtocolViolation)
        );
    }
}
