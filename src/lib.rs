//! TLS 1.0/1.1/1.2 client endpoint layered over a generic byte stream.
//!
//! Application plaintext flows in and out of the [`PlaintextStream`] half;
//! ciphertext flows between the network and the [`CiphertextStream`] half.
//! Between the two sit the handshake state machine, the key schedule, and
//! the record layer. The transport below is anything implementing
//! [`StreamSink`].
//!
//! The session is single-threaded and cooperatively scheduled: the
//! embedding's event loop feeds network bytes into
//! [`CiphertextStream::deliver`], writes application data through
//! [`PlaintextStream::deliver`], and drains the transmit step with
//! [`CiphertextStream::tx_step`] while [`CiphertextStream::wants_tx`]
//! reports pending work.
//!
//! # Limitations
//!
//! * Client endpoint only; no server-side operation.
//! * Key exchange is RSA; the cipher catalog is AES-CBC with SHA-family
//!   record MACs (see [`CipherSuite`]).
//! * No session resumption, renegotiation, or compression.
//! * Certificate chain validation and trust policy live behind the
//!   [`CertificateVerifier`] collaborator; this crate only enforces the
//!   subject-name match against the configured server name.
//!
//! # Example
//!
//! ```no_run
//! use stream_tls::{add_tls, CertificateVerifier, ChainError, ServerIdentity};
//! use stream_tls::{SinkError, StreamSink};
//!
//! struct Transport;
//! impl StreamSink for Transport {
//!     fn window(&self) -> usize { usize::MAX }
//!     fn deliver(&mut self, data: &[u8]) -> Result<(), SinkError> {
//!         // hand ciphertext to the socket
//!         Ok(())
//!     }
//!     fn closed(&mut self, reason: Result<(), stream_tls::Error>) {}
//! }
//!
//! struct Verifier;
//! impl CertificateVerifier for Verifier {
//!     fn verify_chain(
//!         &mut self,
//!         chain: &[&[u8]],
//!         unix_time: u32,
//!     ) -> Result<ServerIdentity, ChainError> {
//!         // delegate to an X.509 library and trust store
//!         Err(ChainError::Incomplete)
//!     }
//! }
//!
//! let mut rng = rand_core::OsRng;
//! let (plaintext, ciphertext) = add_tls(
//!     Box::new(Transport),
//!     "example.com",
//!     Box::new(Verifier),
//!     None,
//!     1_700_000_000,
//!     &mut rng,
//! );
//!
//! // drive the ClientHello out
//! while ciphertext.wants_tx() {
//!     ciphertext.tx_step(&mut rng).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod alert;
mod cipher_spec;
mod cipher_suites;
mod crypto;
mod handshake;
mod io;
mod key_schedule;
mod prf;
mod record;
mod transcript;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use cipher_suites::CipherSuite;
pub use io::{SinkError, StreamSink};
pub use rand_core;
pub use record::ContentType;
pub use rsa;

use cipher_spec::CipherSpec;
use crypto::{CipherCtx, AES_BLOCK_LEN};
use handshake::{finished, HandshakeHeader, HandshakeType};
use io::RecordAssembler;
use log::{debug, error, info, warn};
use rand_core::{CryptoRng, RngCore};
use record::RecordHeader;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use subtle::ConstantTimeEq;
use transcript::Transcript;
use zeroize::Zeroizing;

/// Largest plaintext fragment carried by one record.
pub(crate) const MAX_PLAINTEXT_LEN: usize = 1 << 14;

/// Largest acceptable received record body: plaintext plus expansion
/// headroom for IV, MAC, and padding.
pub(crate) const MAX_CIPHERTEXT_LEN: usize = MAX_PLAINTEXT_LEN + 2048;

/// Cap on a reassembled handshake message, across record boundaries.
const MAX_HANDSHAKE_LEN: usize = 1 << 16;

/// Worst-case per-record expansion, subtracted from the transport window to
/// produce the plaintext-side window.
const RECORD_OVERHEAD: usize = RecordHeader::LEN + 2 * AES_BLOCK_LEN + 32;

/// Protocol version.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum TlsVersion {
    /// TLS 1.0 (RFC 2246).
    V1_0 = 0x0301,
    /// TLS 1.1 (RFC 4346).
    V1_1 = 0x0302,
    /// TLS 1.2 (RFC 5246).
    V1_2 = 0x0303,
}

impl TlsVersion {
    /// Highest version this client advertises.
    pub const LATEST: TlsVersion = TlsVersion::V1_2;

    pub(crate) const fn msb(self) -> u8 {
        ((self as u16) >> 8) as u8
    }

    pub(crate) const fn lsb(self) -> u8 {
        self as u8
    }
}

impl From<TlsVersion> for u16 {
    #[inline]
    fn from(version: TlsVersion) -> Self {
        version as u16
    }
}

impl TryFrom<u16> for TlsVersion {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::V1_0 as u16) => Ok(Self::V1_0),
            x if x == (Self::V1_1 as u16) => Ok(Self::V1_1),
            x if x == (Self::V1_2 as u16) => Ok(Self::V1_2),
            _ => Err(value),
        }
    }
}

/// Session errors.
///
/// Any error from the record or handshake path is fatal: the session sends
/// a best-effort fatal alert and closes both stream halves with the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A dynamic buffer or the downstream window could not take the data.
    #[error("out of memory")]
    OutOfMemory,
    /// Unknown cipher suite, signature/hash algorithm, or protocol version.
    #[error("not supported")]
    NotSupported,
    /// Version upgrade attempt, length mismatch, or malformed record.
    #[error("protocol violation")]
    ProtocolViolation,
    /// Over/underlength handshake message, bad ChangeCipherSpec payload, or
    /// bad record padding.
    #[error("invalid argument")]
    InvalidArgument,
    /// MAC verification failure, Finished mismatch, or a fatal peer alert.
    #[error("permission denied")]
    PermissionDenied,
    /// The certificate chain did not validate.
    #[error("certificate chain did not validate")]
    IncompleteChain,
    /// The leaf certificate subject does not match the server name.
    #[error("certificate name mismatch")]
    WrongName,
    /// Application write before the handshake completed.
    #[error("not connected")]
    NotConnected,
    /// The transport failed, or the peer sent garbage where an alert level
    /// belongs.
    #[error("transport failure")]
    Io,
}

/// Events surfaced by [`CiphertextStream::deliver`].
///
/// Ordered by significance; when one delivery produces several, the most
/// significant is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Event {
    /// Nothing of note.
    None,
    /// Application data arrived; read it with [`PlaintextStream::read`].
    ApplicationData,
    /// The server Finished verified; application data may now be written.
    HandshakeFinished,
    /// The peer closed the connection cleanly (close_notify).
    Disconnect,
}

/// Reason a certificate chain was rejected by a [`CertificateVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ChainError {
    /// The chain does not link to a trust anchor.
    #[error("chain does not reach a trust anchor")]
    Incomplete,
    /// A certificate is outside its validity interval.
    #[error("certificate expired or not yet valid")]
    Expired,
    /// A signature in the chain did not verify.
    #[error("chain signature invalid")]
    BadSignature,
    /// The chain uses algorithms or encodings the verifier cannot process.
    #[error("unsupported certificate")]
    Unsupported,
}

/// Identity extracted from a validated certificate chain.
pub struct ServerIdentity {
    /// Leaf SubjectName bytes, compared byte-exact against the configured
    /// server name.
    pub subject_name: Vec<u8>,
    /// Leaf RSA public key, used to encrypt the pre-master secret.
    pub public_key: RsaPublicKey,
}

/// X.509 collaborator: validates a certificate chain against the trust
/// anchors and clock it owns.
pub trait CertificateVerifier {
    /// Validate `chain` (DER entries, leaf first) at `unix_time` and return
    /// the leaf identity.
    fn verify_chain(
        &mut self,
        chain: &[&[u8]],
        unix_time: u32,
    ) -> Result<ServerIdentity, ChainError>;
}

/// Client certificate and private key, as opaque DER byte arrays.
///
/// The private key may be PKCS#8 or bare PKCS#1; it is parsed only when a
/// server requests client authentication.
pub struct ClientCredentials {
    /// Certificate, DER.
    pub certificate_der: Vec<u8>,
    /// RSA private key, DER.
    pub private_key_der: Vec<u8>,
}

/// Outbound handshake records scheduled but not yet transmitted.
///
/// Bits are consumed lowest-first, which encodes the required wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct TxPending(u8);

impl TxPending {
    const CLIENT_HELLO: u8 = 1 << 0;
    const CERTIFICATE: u8 = 1 << 1;
    const CLIENT_KEY_EXCHANGE: u8 = 1 << 2;
    const CERTIFICATE_VERIFY: u8 = 1 << 3;
    const CHANGE_CIPHER_SPEC: u8 = 1 << 4;
    const FINISHED: u8 = 1 << 5;

    fn schedule(&mut self, bits: u8) {
        self.0 |= bits;
    }

    fn take_next(&mut self) -> Option<u8> {
        if self.0 == 0 {
            None
        } else {
            let bit: u8 = self.0 & self.0.wrapping_neg();
            self.0 &= !bit;
            Some(bit)
        }
    }

    fn is_empty(self) -> bool {
        self.0 == 0
    }
}

struct SessionInner {
    version: TlsVersion,
    server_name: String,
    unix_time: u32,

    client_random: [u8; 32],
    server_random: [u8; 32],
    /// Exists from construction until ClientKeyExchange is emitted.
    pre_master_secret: Option<Zeroizing<[u8; 48]>>,
    master_secret: Zeroizing<[u8; key_schedule::MASTER_SECRET_LEN]>,

    tx: CipherSpec,
    tx_pending_spec: CipherSpec,
    rx: CipherSpec,
    rx_pending_spec: CipherSpec,

    transcript: Transcript,

    verifier: Box<dyn CertificateVerifier>,
    credentials: Option<ClientCredentials>,
    client_key: Option<RsaPrivateKey>,

    tx_pending: TxPending,
    tx_scheduled: bool,
    tx_ready: bool,

    assembler: RecordAssembler,
    /// Handshake bytes spanning record boundaries, not yet a whole message.
    rx_handshake: Vec<u8>,
    rx_plaintext: VecDeque<u8>,

    transport: Box<dyn StreamSink>,
    closed: Option<Result<(), Error>>,
}

/// Create a TLS session over `transport`.
///
/// Returns the two stream halves sharing the session: the plaintext
/// (application-facing) half and the ciphertext (transport-facing) half.
/// The session is freed when both halves are dropped.
///
/// # Arguments
///
/// * `transport` - Downstream sink receiving ciphertext.
/// * `server_name` - SNI host name; also matched byte-exact against the
///   leaf certificate subject.
/// * `verifier` - X.509 collaborator owning trust anchors and clock.
/// * `credentials` - Client certificate and key for servers that request
///   client authentication.
/// * `unix_time` - Wall-clock seconds; rides in the first 4 bytes of the
///   client random and is handed to the verifier.
/// * `rng` - Secure random number generator.
pub fn add_tls<R: RngCore + CryptoRng>(
    transport: Box<dyn StreamSink>,
    server_name: &str,
    verifier: Box<dyn CertificateVerifier>,
    credentials: Option<ClientCredentials>,
    unix_time: u32,
    rng: &mut R,
) -> (PlaintextStream, CiphertextStream) {
    let mut client_random: [u8; 32] = [0; 32];
    client_random[..4].copy_from_slice(&unix_time.to_be_bytes());
    rng.fill_bytes(&mut client_random[4..]);

    let mut pre_master_secret: Zeroizing<[u8; 48]> = Zeroizing::new([0; 48]);
    pre_master_secret[0] = TlsVersion::LATEST.msb();
    pre_master_secret[1] = TlsVersion::LATEST.lsb();
    rng.fill_bytes(&mut pre_master_secret[2..]);

    debug!("new session for {server_name}");

    let inner = SessionInner {
        version: TlsVersion::LATEST,
        server_name: server_name.to_string(),
        unix_time,
        client_random,
        server_random: [0; 32],
        pre_master_secret: Some(pre_master_secret),
        master_secret: Zeroizing::new([0; key_schedule::MASTER_SECRET_LEN]),
        tx: CipherSpec::null(),
        tx_pending_spec: CipherSpec::null(),
        rx: CipherSpec::null(),
        rx_pending_spec: CipherSpec::null(),
        transcript: Transcript::new(),
        verifier,
        credentials,
        client_key: None,
        tx_pending: TxPending(TxPending::CLIENT_HELLO),
        tx_scheduled: true,
        tx_ready: false,
        assembler: RecordAssembler::new(),
        rx_handshake: Vec::new(),
        rx_plaintext: VecDeque::new(),
        transport,
        closed: None,
    };

    let inner: Rc<RefCell<SessionInner>> = Rc::new(RefCell::new(inner));
    (
        PlaintextStream {
            inner: Rc::clone(&inner),
        },
        CiphertextStream { inner },
    )
}

impl SessionInner {
    /// Seal and hand one record downstream. The advanced cipher context and
    /// sequence number commit only on a successful hand-off, so a refused
    /// delivery leaves the active spec untouched.
    fn send_record<R: RngCore + CryptoRng>(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
        rng: &mut R,
    ) -> Result<(), Error> {
        let sealed = record::seal(&self.tx, self.version, content_type, payload, rng);
        match self.transport.deliver(&sealed.wire) {
            Ok(()) => {
                self.tx.commit(sealed.next);
                Ok(())
            }
            Err(SinkError::WindowFull) => Err(Error::OutOfMemory),
            Err(SinkError::Failed) => Err(Error::Io),
        }
    }

    fn send_handshake<R: RngCore + CryptoRng>(
        &mut self,
        msg: &[u8],
        rng: &mut R,
    ) -> Result<(), Error> {
        self.transcript.update(msg);
        self.send_record(ContentType::Handshake, msg, rng)
    }

    fn schedule_tx(&mut self, bits: u8) {
        self.tx_pending.schedule(bits);
        self.tx_scheduled = true;
    }

    /// One activation of the transmit step: consume at most one pending
    /// record. A closed window leaves the step scheduled for the next
    /// `window_changed`.
    fn tx_step<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<(), Error> {
        if self.closed.is_some() {
            self.tx_scheduled = false;
            return Ok(());
        }
        if self.transport.window() == 0 {
            return Ok(());
        }
        let bit: u8 = match self.tx_pending.take_next() {
            Some(bit) => bit,
            None => {
                self.tx_scheduled = false;
                return Ok(());
            }
        };

        match bit {
            TxPending::CLIENT_HELLO => self.send_client_hello(rng)?,
            TxPending::CERTIFICATE => self.send_certificate(rng)?,
            TxPending::CLIENT_KEY_EXCHANGE => self.send_client_key_exchange(rng)?,
            TxPending::CERTIFICATE_VERIFY => self.send_certificate_verify(rng)?,
            TxPending::CHANGE_CIPHER_SPEC => self.send_change_cipher_spec(rng)?,
            TxPending::FINISHED => self.send_finished(rng)?,
            _ => unreachable!("tx_pending bit {bit:#04X}"),
        }

        self.tx_scheduled = !self.tx_pending.is_empty();
        Ok(())
    }

    fn send_client_hello<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<(), Error> {
        debug!("TX ClientHello");
        let body = handshake::client_hello::ser(self.version, &self.client_random, &self.server_name);
        let msg = handshake::message(HandshakeType::ClientHello, &body);
        self.send_handshake(&msg, rng)
    }

    fn send_certificate<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<(), Error> {
        let body: Vec<u8> = match &self.credentials {
            Some(credentials) => {
                let key = crypto::pubkey::parse_private_key(&credentials.private_key_der)?;
                debug!("TX Certificate with client certificate, RSA verify key");
                let body = handshake::certificate::build(Some(&credentials.certificate_der));
                self.client_key = Some(key);
                self.tx_pending.schedule(TxPending::CERTIFICATE_VERIFY);
                body
            }
            None => {
                debug!("TX Certificate (empty)");
                handshake::certificate::build(None)
            }
        };
        let msg = handshake::message(HandshakeType::Certificate, &body);
        self.send_handshake(&msg, rng)
    }

    fn send_client_key_exchange<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(), Error> {
        let pubkey: RsaPublicKey = match self.tx_pending_spec.pubkey.clone() {
            Some(pubkey) => pubkey,
            None => {
                error!("ClientKeyExchange scheduled with no server public key");
                return Err(Error::ProtocolViolation);
            }
        };
        // the pre-master secret has served its purpose once encrypted; the
        // master secret was derived at ServerHello
        let pre_master_secret = self
            .pre_master_secret
            .take()
            .ok_or(Error::ProtocolViolation)?;
        let encrypted = crypto::pubkey::encrypt_pkcs1(rng, &pubkey, &pre_master_secret[..])?;

        debug!("TX ClientKeyExchange ({} byte key block)", encrypted.len());
        let mut body: Vec<u8> = Vec::with_capacity(2 + encrypted.len());
        body.extend_from_slice(&(encrypted.len() as u16).to_be_bytes());
        body.extend_from_slice(&encrypted);
        let msg = handshake::message(HandshakeType::ClientKeyExchange, &body);
        self.send_handshake(&msg, rng)
    }

    fn send_certificate_verify<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(), Error> {
        let key: &RsaPrivateKey = self.client_key.as_ref().ok_or(Error::ProtocolViolation)?;
        let digest: Vec<u8> = self.transcript.digest(self.version);
        let signature = crypto::pubkey::sign_transcript(key, self.version, &digest)?;

        debug!("TX CertificateVerify ({} byte signature)", signature.len());
        let mut body: Vec<u8> = Vec::with_capacity(4 + signature.len());
        if self.version >= TlsVersion::V1_2 {
            body.push(handshake::HASH_ALGORITHM_SHA256);
            body.push(handshake::SIGNATURE_ALGORITHM_RSA);
        }
        body.extend_from_slice(&(signature.len() as u16).to_be_bytes());
        body.extend_from_slice(&signature);
        let msg = handshake::message(HandshakeType::CertificateVerify, &body);
        self.send_handshake(&msg, rng)
    }

    fn send_change_cipher_spec<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<(), Error> {
        // not a handshake message: stays out of the transcript
        self.send_record(ContentType::ChangeCipherSpec, &[1], rng)?;
        CipherSpec::change(&mut self.tx_pending_spec, &mut self.tx)?;
        debug!("TX ChangeCipherSpec, transmit cipher active");
        Ok(())
    }

    fn send_finished<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<(), Error> {
        let verify_data = finished::verify_data(
            self.version,
            &self.master_secret[..],
            &self.transcript,
            finished::CLIENT_LABEL,
        );
        debug!("TX Finished");
        let msg = handshake::message(HandshakeType::Finished, &verify_data);
        self.send_handshake(&msg, rng)
    }

    /// Feed raw ciphertext bytes through the reassembler and dispatch
    /// complete records.
    fn deliver_ciphertext<R: RngCore + CryptoRng>(
        &mut self,
        mut data: &[u8],
        rng: &mut R,
    ) -> Result<Event, Error> {
        let mut event: Event = Event::None;
        while !data.is_empty() {
            if self.closed.is_some() {
                break;
            }
            let (consumed, complete) = self.assembler.feed(data)?;
            data = &data[consumed..];
            if let Some((header, body)) = complete {
                event = event.max(self.handle_record(header, body, rng)?);
            }
        }
        Ok(event)
    }

    fn handle_record<R: RngCore + CryptoRng>(
        &mut self,
        header: RecordHeader,
        body: Vec<u8>,
        rng: &mut R,
    ) -> Result<Event, Error> {
        let content_type: ContentType = match header.content_type() {
            Ok(content_type) => content_type,
            Err(raw) => {
                debug!("ignoring record with unknown content type {raw:#04X}");
                return Ok(Event::None);
            }
        };

        let plaintext: Vec<u8> = record::open(&mut self.rx, self.version, &header, body)?;

        if !self.rx_handshake.is_empty() && content_type != ContentType::Handshake {
            error!("{content_type:?} record interleaved with a fragmented handshake message");
            return Err(Error::ProtocolViolation);
        }

        match content_type {
            ContentType::ChangeCipherSpec => {
                if plaintext[..] != [1] {
                    error!("bad ChangeCipherSpec payload {plaintext:02X?}");
                    return Err(Error::InvalidArgument);
                }
                CipherSpec::change(&mut self.rx_pending_spec, &mut self.rx)?;
                debug!("RX ChangeCipherSpec, receive cipher active");
                Ok(Event::None)
            }
            ContentType::Alert => self.handle_alert(&plaintext, rng),
            ContentType::Handshake => self.handle_handshake_data(&plaintext, rng),
            ContentType::ApplicationData => {
                if !self.tx_ready {
                    error!("application data before server Finished");
                    return Err(Error::ProtocolViolation);
                }
                self.rx_plaintext.extend(plaintext);
                Ok(Event::ApplicationData)
            }
        }
    }

    fn handle_alert<R: RngCore + CryptoRng>(
        &mut self,
        payload: &[u8],
        rng: &mut R,
    ) -> Result<Event, Error> {
        if payload.len() != 2 {
            error!("expected length 2 for Alert, got {}", payload.len());
            return Err(Error::InvalidArgument);
        }

        match AlertLevel::try_from(payload[0]) {
            Ok(AlertLevel::Warning) => match AlertDescription::try_from(payload[1]) {
                Ok(AlertDescription::CloseNotify) => {
                    info!("RX close_notify");
                    let _ = self.send_record(
                        ContentType::Alert,
                        &[
                            AlertLevel::Warning.into(),
                            AlertDescription::CloseNotify.into(),
                        ],
                        rng,
                    );
                    self.shutdown(Ok(()));
                    Ok(Event::Disconnect)
                }
                Ok(description) => {
                    let alert = Alert {
                        level: AlertLevel::Warning,
                        description,
                    };
                    warn!("ignoring {alert:?}");
                    Ok(Event::None)
                }
                Err(raw) => {
                    warn!("ignoring warning alert with unknown description {raw}");
                    Ok(Event::None)
                }
            },
            Ok(AlertLevel::Fatal) => {
                match AlertDescription::try_from(payload[1]) {
                    Ok(description) => error!(
                        "RX {:?}",
                        Alert {
                            level: AlertLevel::Fatal,
                            description,
                        }
                    ),
                    Err(raw) => error!("RX fatal alert with unknown description {raw}"),
                }
                self.shutdown(Err(Error::PermissionDenied));
                Err(Error::PermissionDenied)
            }
            Err(raw) => {
                error!("illegal alert level {raw}");
                self.shutdown(Err(Error::Io));
                Err(Error::Io)
            }
        }
    }

    /// Handshake records are a byte stream of their own: one record may
    /// carry several messages and one message may span several records.
    fn handle_handshake_data<R: RngCore + CryptoRng>(
        &mut self,
        data: &[u8],
        rng: &mut R,
    ) -> Result<Event, Error> {
        self.rx_handshake.extend_from_slice(data);

        let mut event: Event = Event::None;
        loop {
            if self.rx_handshake.len() < HandshakeHeader::LEN {
                break;
            }
            let header: HandshakeHeader =
                <[u8; HandshakeHeader::LEN]>::try_from(&self.rx_handshake[..HandshakeHeader::LEN])
                    .unwrap()
                    .into();
            let msg_len: usize = header.length() as usize;
            if HandshakeHeader::LEN + msg_len > MAX_HANDSHAKE_LEN {
                error!("handshake message of {msg_len} bytes exceeds the reassembly cap");
                return Err(Error::InvalidArgument);
            }
            if self.rx_handshake.len() < HandshakeHeader::LEN + msg_len {
                debug!("handshake message fragmented, {} of {} bytes", self.rx_handshake.len(), HandshakeHeader::LEN + msg_len);
                break;
            }

            let msg: Vec<u8> = self
                .rx_handshake
                .drain(..HandshakeHeader::LEN + msg_len)
                .collect();
            event = event.max(self.handle_handshake_message(&msg, rng)?);
            if self.closed.is_some() {
                break;
            }
        }
        Ok(event)
    }

    fn handle_handshake_message<R: RngCore + CryptoRng>(
        &mut self,
        msg: &[u8],
        _rng: &mut R,
    ) -> Result<Event, Error> {
        let header: HandshakeHeader = <[u8; HandshakeHeader::LEN]>::try_from(&msg[..HandshakeHeader::LEN])
            .unwrap()
            .into();
        let body: &[u8] = &msg[HandshakeHeader::LEN..];

        match header.msg_type() {
            // the one message excluded from the transcript
            Ok(HandshakeType::HelloRequest) => {
                debug!("ignoring HelloRequest");
                Ok(Event::None)
            }
            // Finished verifies against the transcript *before* itself
            Ok(HandshakeType::Finished) => {
                let event = self.recv_finished(body)?;
                self.transcript.update(msg);
                Ok(event)
            }
            Ok(msg_type) => {
                self.transcript.update(msg);
                match msg_type {
                    HandshakeType::ServerHello => self.recv_server_hello(body)?,
                    HandshakeType::Certificate => self.recv_certificate(body)?,
                    HandshakeType::CertificateRequest => {
                        debug!("RX CertificateRequest");
                        self.schedule_tx(TxPending::CERTIFICATE);
                    }
                    HandshakeType::ServerHelloDone => {
                        debug!("RX ServerHelloDone");
                        self.schedule_tx(
                            TxPending::CLIENT_KEY_EXCHANGE
                                | TxPending::CHANGE_CIPHER_SPEC
                                | TxPending::FINISHED,
                        );
                    }
                    HandshakeType::ServerKeyExchange => {
                        // RSA key exchange carries the secret in
                        // ClientKeyExchange; nothing to take from this
                        debug!("ignoring ServerKeyExchange");
                    }
                    HandshakeType::ClientHello
                    | HandshakeType::ClientKeyExchange
                    | HandshakeType::CertificateVerify => {
                        error!("client-direction message {msg_type:?} from server");
                        return Err(Error::ProtocolViolation);
                    }
                    HandshakeType::HelloRequest | HandshakeType::Finished => unreachable!(),
                }
                Ok(Event::None)
            }
            Err(raw) => {
                // still part of the transcript
                self.transcript.update(msg);
                debug!("ignoring unknown handshake type {raw}");
                Ok(Event::None)
            }
        }
    }

    fn recv_server_hello(&mut self, body: &[u8]) -> Result<(), Error> {
        let hello = handshake::server_hello::parse(body)?;

        if hello.version < TlsVersion::V1_0 as u16 {
            error!("server version {:#06X} below 1.0", hello.version);
            return Err(Error::NotSupported);
        }
        if hello.version > self.version as u16 {
            error!(
                "server attempted upgrade to {:#06X} from {:?}",
                hello.version, self.version
            );
            return Err(Error::ProtocolViolation);
        }
        let version: TlsVersion =
            TlsVersion::try_from(hello.version).map_err(|_| Error::ProtocolViolation)?;
        if version != self.version {
            debug!("downgrading from {:?} to {version:?}", self.version);
        }
        self.version = version;
        self.server_random = hello.random;

        if hello.compression != 0 {
            error!("compression method {} is not null", hello.compression);
            return Err(Error::ProtocolViolation);
        }

        let suite: CipherSuite = match CipherSuite::find(hello.cipher_suite) {
            Some(suite) => suite,
            None => {
                error!("unsupported cipher suite {:#06X}", hello.cipher_suite);
                return Err(Error::NotSupported);
            }
        };
        info!("RX ServerHello: {version:?}, {suite:?}");

        self.tx_pending_spec.set(suite);
        self.rx_pending_spec.set(suite);
        self.derive_keys()
    }

    /// Derive the master secret and key block, and key up both pending
    /// specs. Runs at ServerHello, once both randoms are known.
    fn derive_keys(&mut self) -> Result<(), Error> {
        let pre_master_secret = self
            .pre_master_secret
            .as_ref()
            .ok_or(Error::ProtocolViolation)?;
        self.master_secret = key_schedule::master_secret(
            self.version,
            &pre_master_secret[..],
            &self.client_random,
            &self.server_random,
        );

        let suite: CipherSuite = self.tx_pending_spec.suite;
        let block = key_schedule::key_block(
            self.version,
            &self.master_secret[..],
            &self.client_random,
            &self.server_random,
            suite,
        );
        self.tx_pending_spec.install_keys(
            &block.tx_mac,
            CipherCtx::encryptor(suite.bulk(), &block.tx_key, &block.tx_iv),
        );
        self.rx_pending_spec.install_keys(
            &block.rx_mac,
            CipherCtx::decryptor(suite.bulk(), &block.rx_key, &block.rx_iv),
        );
        Ok(())
    }

    fn recv_certificate(&mut self, body: &[u8]) -> Result<(), Error> {
        let chain: Vec<&[u8]> = handshake::certificate::parse_chain(body)?;
        if chain.is_empty() {
            error!("empty certificate chain");
            return Err(Error::IncompleteChain);
        }
        debug!("RX Certificate, {} entries", chain.len());

        let identity: ServerIdentity = self
            .verifier
            .verify_chain(&chain, self.unix_time)
            .map_err(|e| {
                error!("certificate chain rejected: {e}");
                Error::IncompleteChain
            })?;

        if identity.subject_name != self.server_name.as_bytes() {
            error!(
                "certificate subject {:?} does not match {:?}",
                String::from_utf8_lossy(&identity.subject_name),
                self.server_name
            );
            return Err(Error::WrongName);
        }

        self.tx_pending_spec.pubkey = Some(identity.public_key);
        Ok(())
    }

    fn recv_finished(&mut self, body: &[u8]) -> Result<Event, Error> {
        if body.len() != finished::VERIFY_DATA_LEN {
            error!(
                "expected verify_data length {}, got {}",
                finished::VERIFY_DATA_LEN,
                body.len()
            );
            return Err(Error::InvalidArgument);
        }
        let expected = finished::verify_data(
            self.version,
            &self.master_secret[..],
            &self.transcript,
            finished::SERVER_LABEL,
        );
        if !bool::from(expected[..].ct_eq(body)) {
            error!("server Finished verify_data mismatch");
            return Err(Error::PermissionDenied);
        }

        info!("RX Finished verified, handshake complete");
        self.tx_ready = true;
        Ok(Event::HandshakeFinished)
    }

    fn plaintext_window(&self) -> usize {
        if !self.tx_ready || self.closed.is_some() {
            0
        } else {
            self.transport.window().saturating_sub(RECORD_OVERHEAD)
        }
    }

    fn deliver_plaintext<R: RngCore + CryptoRng>(
        &mut self,
        data: &[u8],
        rng: &mut R,
    ) -> Result<(), Error> {
        if let Some(reason) = self.closed {
            return Err(reason.err().unwrap_or(Error::NotConnected));
        }
        if !self.tx_ready {
            return Err(Error::NotConnected);
        }
        for chunk in data.chunks(MAX_PLAINTEXT_LEN) {
            self.send_record(ContentType::ApplicationData, chunk, rng)?;
        }
        Ok(())
    }

    fn read_plaintext(&mut self, buf: &mut [u8]) -> usize {
        let n: usize = core::cmp::min(buf.len(), self.rx_plaintext.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.rx_plaintext.pop_front().unwrap();
        }
        n
    }

    /// Terminal close: no alerts, no further protocol effects.
    fn shutdown(&mut self, reason: Result<(), Error>) {
        if self.closed.is_some() {
            return;
        }
        match &reason {
            Ok(()) => info!("session closed"),
            Err(e) => error!("session closed: {e}"),
        }
        self.closed = Some(reason);
        self.tx_pending = TxPending::default();
        self.tx_scheduled = false;
        self.transport.closed(reason);
    }

    /// Fatal close: best-effort alert first, then shutdown.
    fn fail<R: RngCore + CryptoRng>(&mut self, e: Error, rng: &mut R) {
        if self.closed.is_some() {
            return;
        }
        let description: AlertDescription = alert::for_error(&e);
        let _ = self.send_record(
            ContentType::Alert,
            &[AlertLevel::Fatal.into(), description.into()],
            rng,
        );
        self.shutdown(Err(e));
    }
}

/// Application-facing half of the session: the upward byte stream.
///
/// Created by [`add_tls`].
pub struct PlaintextStream {
    inner: Rc<RefCell<SessionInner>>,
}

impl PlaintextStream {
    /// Bytes the session can accept from the application right now.
    ///
    /// 0 until the handshake completes, then the transport window minus the
    /// per-record overhead.
    pub fn window(&self) -> usize {
        self.inner.borrow().plaintext_window()
    }

    /// `true` once the server Finished verified and writes are accepted.
    pub fn ready(&self) -> bool {
        let inner = self.inner.borrow();
        inner.tx_ready && inner.closed.is_none()
    }

    /// Write application plaintext.
    ///
    /// Fails with [`Error::NotConnected`] before the handshake completes.
    /// Fragments larger than one record are split. A full downstream window
    /// surfaces as [`Error::OutOfMemory`] with the unsent remainder intact;
    /// respect [`window`](Self::window) to avoid it.
    pub fn deliver<R: RngCore + CryptoRng>(&self, data: &[u8], rng: &mut R) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        match inner.deliver_plaintext(data, rng) {
            Err(e @ Error::Io) => {
                inner.fail(e, rng);
                Err(e)
            }
            other => other,
        }
    }

    /// Drain received application data into `buf`, returning the number of
    /// bytes copied.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.inner.borrow_mut().read_plaintext(buf)
    }

    /// Clean close: send close_notify (best-effort) and shut the session
    /// down, propagating the close to the transport.
    pub fn close<R: RngCore + CryptoRng>(&self, rng: &mut R) {
        let mut inner = self.inner.borrow_mut();
        if inner.closed.is_some() {
            return;
        }
        let _ = inner.send_record(
            ContentType::Alert,
            &[
                AlertLevel::Warning.into(),
                AlertDescription::CloseNotify.into(),
            ],
            rng,
        );
        inner.shutdown(Ok(()));
    }
}

/// Transport-facing half of the session: the downward byte stream.
///
/// Created by [`add_tls`].
pub struct CiphertextStream {
    inner: Rc<RefCell<SessionInner>>,
}

impl CiphertextStream {
    /// Feed ciphertext received from the network.
    ///
    /// Records are reassembled across arbitrary fragmentation. Returns the
    /// most significant [`Event`] the data produced. Any error has already
    /// closed the session when this returns.
    pub fn deliver<R: RngCore + CryptoRng>(&self, data: &[u8], rng: &mut R) -> Result<Event, Error> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed.is_some() {
            return Ok(Event::None);
        }
        match inner.deliver_ciphertext(data, rng) {
            Ok(event) => Ok(event),
            Err(e) => {
                inner.fail(e, rng);
                Err(e)
            }
        }
    }

    /// The transport window changed; returns whether the transmit step
    /// should be driven again.
    pub fn window_changed(&self) -> bool {
        self.wants_tx()
    }

    /// `true` while handshake records are scheduled for transmission.
    pub fn wants_tx(&self) -> bool {
        let inner = self.inner.borrow();
        inner.tx_scheduled && inner.closed.is_none()
    }

    /// Run one transmit step, consuming at most one scheduled record.
    ///
    /// A no-op when the transport window is 0; the step stays scheduled.
    /// Any error has already closed the session when this returns.
    pub fn tx_step<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        match inner.tx_step(rng) {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.fail(e, rng);
                Err(e)
            }
        }
    }

    /// Close reason, once the session has closed.
    pub fn close_reason(&self) -> Option<Result<(), Error>> {
        self.inner.borrow().closed
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::{Error, SinkError, StreamSink};
    use rand_core::{CryptoRng, RngCore};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Deterministic RNG for reproducible handshakes in tests.
    pub(crate) struct StepRng(u64);

    impl StepRng {
        pub(crate) fn new(seed: u64) -> Self {
            Self(seed)
        }
    }

    impl RngCore for StepRng {
        fn next_u32(&mut self) -> u32 {
            self.next_u64() as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(8) {
                let bytes = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    impl CryptoRng for StepRng {}

    /// Transport capturing delivered ciphertext and the close reason.
    pub(crate) struct TestTransport {
        pub(crate) wire: Rc<RefCell<Vec<u8>>>,
        pub(crate) closed: Rc<RefCell<Option<Result<(), Error>>>>,
        pub(crate) window: usize,
    }

    impl TestTransport {
        pub(crate) fn new() -> Self {
            Self {
                wire: Rc::new(RefCell::new(Vec::new())),
                closed: Rc::new(RefCell::new(None)),
                window: usize::MAX,
            }
        }
    }

    impl StreamSink for TestTransport {
        fn window(&self) -> usize {
            self.window
        }

        fn deliver(&mut self, data: &[u8]) -> Result<(), SinkError> {
            if data.len() > self.window {
                return Err(SinkError::WindowFull);
            }
            self.wire.borrow_mut().extend_from_slice(data);
            Ok(())
        }

        fn closed(&mut self, reason: Result<(), Error>) {
            *self.closed.borrow_mut() = Some(reason);
        }
    }
}
