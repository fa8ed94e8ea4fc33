//! Public-surface handshake rejection scenarios, driven with hand-built
//! server records and a stub certificate verifier.

use rand_core::OsRng;
use std::cell::RefCell;
use std::rc::Rc;
use stream_tls::{
    add_tls, CertificateVerifier, ChainError, CiphertextStream, ContentType, Error, Event,
    PlaintextStream, ServerIdentity, SinkError, StreamSink,
};

struct Capture {
    wire: Rc<RefCell<Vec<u8>>>,
    closed: Rc<RefCell<Option<Result<(), Error>>>>,
}

impl StreamSink for Capture {
    fn window(&self) -> usize {
        usize::MAX
    }

    fn deliver(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.wire.borrow_mut().extend_from_slice(data);
        Ok(())
    }

    fn closed(&mut self, reason: Result<(), Error>) {
        *self.closed.borrow_mut() = Some(reason);
    }
}

struct StubVerifier {
    subject_name: &'static [u8],
}

impl CertificateVerifier for StubVerifier {
    fn verify_chain(
        &mut self,
        _chain: &[&[u8]],
        _unix_time: u32,
    ) -> Result<ServerIdentity, ChainError> {
        let key = stream_tls::rsa::RsaPrivateKey::new(&mut OsRng, 512).unwrap();
        Ok(ServerIdentity {
            subject_name: self.subject_name.to_vec(),
            public_key: key.to_public_key(),
        })
    }
}

struct Session {
    plaintext: PlaintextStream,
    ciphertext: CiphertextStream,
    closed: Rc<RefCell<Option<Result<(), Error>>>>,
}

fn session(server_name: &str, cert_subject: &'static [u8]) -> Session {
    let wire: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let closed: Rc<RefCell<Option<Result<(), Error>>>> = Rc::new(RefCell::new(None));
    let transport = Capture {
        wire,
        closed: Rc::clone(&closed),
    };
    let (plaintext, ciphertext) = add_tls(
        Box::new(transport),
        server_name,
        Box::new(StubVerifier {
            subject_name: cert_subject,
        }),
        None,
        1_700_000_000,
        &mut OsRng,
    );
    // drive the ClientHello out so the transcript is in a sane state
    while ciphertext.wants_tx() {
        ciphertext.tx_step(&mut OsRng).unwrap();
    }
    Session {
        plaintext,
        ciphertext,
        closed,
    }
}

fn record(content_type: ContentType, payload: &[u8]) -> Vec<u8> {
    let mut wire: Vec<u8> = vec![
        content_type.into(),
        0x03,
        0x03,
        (payload.len() >> 8) as u8,
        payload.len() as u8,
    ];
    wire.extend_from_slice(payload);
    wire
}

fn handshake_record(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let mut msg: Vec<u8> = vec![msg_type];
    msg.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    msg.extend_from_slice(body);
    record(ContentType::Handshake, &msg)
}

fn server_hello(version: u16, cipher_suite: u16) -> Vec<u8> {
    let mut body: Vec<u8> = version.to_be_bytes().to_vec();
    body.extend_from_slice(&[0x5A; 32]); // server random
    body.push(0); // empty session id
    body.extend_from_slice(&cipher_suite.to_be_bytes());
    body.push(0); // null compression
    handshake_record(2, &body)
}

fn certificate(der: &[u8]) -> Vec<u8> {
    let mut body: Vec<u8> = Vec::new();
    body.extend_from_slice(&((der.len() + 3) as u32).to_be_bytes()[1..]);
    body.extend_from_slice(&(der.len() as u32).to_be_bytes()[1..]);
    body.extend_from_slice(der);
    handshake_record(11, &body)
}

#[test]
fn version_upgrade_rejected() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext.deliver(&server_hello(0x0304, 0x002F), &mut OsRng),
        Err(Error::ProtocolViolation)
    );
    assert_eq!(*s.closed.borrow(), Some(Err(Error::ProtocolViolation)));
}

#[test]
fn ancient_version_rejected() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext.deliver(&server_hello(0x0300, 0x002F), &mut OsRng),
        Err(Error::NotSupported)
    );
}

#[test]
fn downgrade_to_1_1_accepted() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext.deliver(&server_hello(0x0302, 0x0035), &mut OsRng),
        Ok(Event::None)
    );
    assert_eq!(*s.closed.borrow(), None);
}

#[test]
fn unknown_cipher_suite_rejected() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext.deliver(&server_hello(0x0303, 0x1301), &mut OsRng),
        Err(Error::NotSupported)
    );
}

#[test]
fn null_cipher_suite_rejected() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext.deliver(&server_hello(0x0303, 0x0000), &mut OsRng),
        Err(Error::NotSupported)
    );
}

#[test]
fn certificate_name_mismatch_rejected() {
    let s = session("example.com", b"other.com");
    s.ciphertext
        .deliver(&server_hello(0x0303, 0x002F), &mut OsRng)
        .unwrap();
    assert_eq!(
        s.ciphertext.deliver(&certificate(b"leaf der"), &mut OsRng),
        Err(Error::WrongName)
    );
    assert_eq!(*s.closed.borrow(), Some(Err(Error::WrongName)));
}

#[test]
fn certificate_name_match_accepted() {
    let s = session("example.com", b"example.com");
    s.ciphertext
        .deliver(&server_hello(0x0303, 0x002F), &mut OsRng)
        .unwrap();
    assert_eq!(
        s.ciphertext.deliver(&certificate(b"leaf der"), &mut OsRng),
        Ok(Event::None)
    );
    assert_eq!(*s.closed.borrow(), None);
}

#[test]
fn write_before_handshake_completes() {
    let s = session("example.com", b"example.com");
    assert!(!s.plaintext.ready());
    assert_eq!(s.plaintext.window(), 0);
    assert_eq!(
        s.plaintext.deliver(b"too early", &mut OsRng),
        Err(Error::NotConnected)
    );
    // not a session-fatal condition
    assert_eq!(*s.closed.borrow(), None);
}

#[test]
fn application_data_before_finished_rejected() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext
            .deliver(&record(ContentType::ApplicationData, b"sneaky"), &mut OsRng),
        Err(Error::ProtocolViolation)
    );
}

#[test]
fn close_notify_is_a_clean_disconnect() {
    let s = session("example.com", b"example.com");
    // warning close_notify
    assert_eq!(
        s.ciphertext
            .deliver(&record(ContentType::Alert, &[1, 0]), &mut OsRng),
        Ok(Event::Disconnect)
    );
    assert_eq!(*s.closed.borrow(), Some(Ok(())));
}

#[test]
fn malformed_alert_rejected() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext
            .deliver(&record(ContentType::Alert, &[2]), &mut OsRng),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn bad_change_cipher_spec_payload_rejected() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext
            .deliver(&record(ContentType::ChangeCipherSpec, &[2]), &mut OsRng),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn change_cipher_spec_without_pending_suite_rejected() {
    let s = session("example.com", b"example.com");
    assert_eq!(
        s.ciphertext
            .deliver(&record(ContentType::ChangeCipherSpec, &[1]), &mut OsRng),
        Err(Error::ProtocolViolation)
    );
}

#[test]
fn oversized_record_rejected() {
    let s = session("example.com", b"example.com");
    // claimed length 0x4801 exceeds the record MTU
    assert_eq!(
        s.ciphertext.deliver(&[23, 3, 3, 0x48, 0x01], &mut OsRng),
        Err(Error::ProtocolViolation)
    );
}
