//! Record layer framing: MAC-then-encrypt on transmit, decrypt-then-verify
//! on receive.
//!
//! # References
//!
//! * [RFC 5246 Section 6.2](https://datatracker.ietf.org/doc/html/rfc5246#section-6.2)
//!
//! ```text
//! struct {
//!     ContentType type;
//!     ProtocolVersion version;
//!     uint16 length;
//!     opaque fragment[TLSPlaintext.length];
//! } TLSPlaintext;
//! ```

use crate::cipher_spec::CipherSpec;
use crate::crypto::{CipherCtx, AES_BLOCK_LEN};
use crate::{Error, TlsVersion};
use rand_core::{CryptoRng, RngCore};

/// Content Type.
///
/// ```text
/// enum {
///     change_cipher_spec(20), alert(21), handshake(22),
///     application_data(23), (255)
/// } ContentType;
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentType {
    /// Single-byte epoch switch signal.
    ChangeCipherSpec = 20,
    /// Two-byte alert pair.
    Alert = 21,
    /// Handshake messages.
    Handshake = 22,
    /// Application plaintext.
    ApplicationData = 23,
}

impl From<ContentType> for u8 {
    #[inline]
    fn from(content_type: ContentType) -> Self {
        content_type as u8
    }
}

impl TryFrom<u8> for ContentType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::ChangeCipherSpec as u8) => Ok(Self::ChangeCipherSpec),
            x if x == (Self::Alert as u8) => Ok(Self::Alert),
            x if x == (Self::Handshake as u8) => Ok(Self::Handshake),
            x if x == (Self::ApplicationData as u8) => Ok(Self::ApplicationData),
            _ => Err(value),
        }
    }
}

/// 5-byte record header: type, version, body length, all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    buf: [u8; Self::LEN],
}

impl From<[u8; RecordHeader::LEN]> for RecordHeader {
    fn from(buf: [u8; Self::LEN]) -> Self {
        Self { buf }
    }
}

impl RecordHeader {
    pub(crate) const LEN: usize = 5;

    pub(crate) fn new(content_type: ContentType, version: TlsVersion, length: u16) -> Self {
        Self {
            buf: [
                content_type.into(),
                version.msb(),
                version.lsb(),
                (length >> 8) as u8,
                length as u8,
            ],
        }
    }

    /// Unknown type values are preserved; the receive path ignores such
    /// records rather than erroring.
    pub(crate) fn content_type(&self) -> Result<ContentType, u8> {
        self.buf[0].try_into()
    }

    pub(crate) fn length(&self) -> u16 {
        u16::from_be_bytes([self.buf[3], self.buf[4]])
    }

    pub(crate) fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.buf
    }

    /// Same type and version with a different length field; the MAC input
    /// header covers the plaintext length, not the ciphertext length.
    pub(crate) fn with_length(&self, length: u16) -> Self {
        let mut buf: [u8; Self::LEN] = self.buf;
        buf[3] = (length >> 8) as u8;
        buf[4] = length as u8;
        Self { buf }
    }
}

/// A record sealed against a transmit spec, not yet committed.
///
/// `next` is the advanced cipher context; the caller installs it with
/// [`CipherSpec::commit`] only after the bytes were accepted downstream, so
/// a refused hand-off leaves the active CBC chain untouched.
pub(crate) struct SealedRecord {
    pub(crate) wire: Vec<u8>,
    pub(crate) next: CipherCtx,
}

/// MAC and encrypt one plaintext fragment.
pub(crate) fn seal<R: RngCore + CryptoRng>(
    spec: &CipherSpec,
    version: TlsVersion,
    content_type: ContentType,
    payload: &[u8],
    rng: &mut R,
) -> SealedRecord {
    debug_assert!(payload.len() <= crate::MAX_PLAINTEXT_LEN);

    let seq: [u8; 8] = spec.seq.to_be_bytes();
    let mac_header = RecordHeader::new(content_type, version, payload.len() as u16);
    let mac = spec
        .suite
        .mac()
        .compute(&spec.mac_key, &[&seq, mac_header.as_bytes(), payload]);

    let bulk = spec.suite.bulk();
    let mut next: CipherCtx = spec.cipher.clone();

    let mut body: Vec<u8>;
    if bulk.is_block() {
        let block = bulk.block_len();
        // explicit per-record IV from 1.1 up; it rides as the first block
        // of the encrypted body and is discarded by the receiver
        let iv_len: usize = if version >= TlsVersion::V1_1 { block } else { 0 };
        body = Vec::with_capacity(iv_len + payload.len() + mac.len() + block);
        if iv_len != 0 {
            let mut iv: [u8; AES_BLOCK_LEN] = [0; AES_BLOCK_LEN];
            rng.fill_bytes(&mut iv);
            body.extend_from_slice(&iv);
        }
        body.extend_from_slice(payload);
        body.extend_from_slice(&mac);

        // pad_len + 1 bytes, each holding pad_len
        let pad_len: usize = block - 1 - (body.len() % block);
        body.resize(body.len() + pad_len + 1, pad_len as u8);

        next.encrypt_in_place(&mut body);
    } else {
        body = Vec::with_capacity(payload.len() + mac.len());
        body.extend_from_slice(payload);
        body.extend_from_slice(&mac);
    }

    let header = RecordHeader::new(content_type, version, body.len() as u16);
    let mut wire: Vec<u8> = Vec::with_capacity(RecordHeader::LEN + body.len());
    wire.extend_from_slice(header.as_bytes());
    wire.append(&mut body);

    SealedRecord { wire, next }
}

/// Decrypt, unpad, and verify one received record body.
///
/// Consumes one receive sequence number on success. Padding failures and
/// MAC failures are reported distinctly (`InvalidArgument` vs
/// `PermissionDenied`); both are fatal to the session before any plaintext
/// is surfaced.
pub(crate) fn open(
    spec: &mut CipherSpec,
    version: TlsVersion,
    header: &RecordHeader,
    mut body: Vec<u8>,
) -> Result<Vec<u8>, Error> {
    let mac_len: usize = spec.suite.mac().output_len();
    let bulk = spec.suite.bulk();

    let payload_start: usize;
    if bulk.is_block() {
        let block = bulk.block_len();
        if body.is_empty() || body.len() % block != 0 {
            log::error!("record body {} is not a whole number of blocks", body.len());
            return Err(Error::ProtocolViolation);
        }
        spec.cipher.decrypt_in_place(&mut body);

        let pad_len: usize = (*body.last().unwrap()).into();
        let iv_len: usize = if version >= TlsVersion::V1_1 { block } else { 0 };
        if pad_len + 1 + mac_len + iv_len > body.len() {
            log::error!("pad length {pad_len} exceeds record body {}", body.len());
            return Err(Error::InvalidArgument);
        }
        let pad_start: usize = body.len() - 1 - pad_len;
        if body[pad_start..body.len() - 1].iter().any(|&b| b as usize != pad_len) {
            log::error!("inconsistent record padding");
            return Err(Error::InvalidArgument);
        }
        body.truncate(pad_start);
        payload_start = iv_len;
    } else {
        if body.len() < mac_len {
            log::error!("record body {} shorter than the MAC", body.len());
            return Err(Error::ProtocolViolation);
        }
        payload_start = 0;
    }

    let mac_start: usize = body.len() - mac_len;
    let payload: &[u8] = &body[payload_start..mac_start];
    let mac: &[u8] = &body[mac_start..];

    let seq: [u8; 8] = spec.seq.to_be_bytes();
    let mac_header = header.with_length(payload.len() as u16);
    if !spec
        .suite
        .mac()
        .verify(&spec.mac_key, &[&seq, mac_header.as_bytes(), payload], mac)
    {
        log::error!("record MAC verification failed at sequence {}", spec.seq);
        return Err(Error::PermissionDenied);
    }
    spec.seq += 1;

    body.truncate(mac_start);
    body.drain(..payload_start);
    Ok(body)
}
