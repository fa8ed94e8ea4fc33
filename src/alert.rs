use crate::Error;

/// Alert level.
///
/// # References
///
/// * [RFC 5246 Section 7.2](https://datatracker.ietf.org/doc/html/rfc5246#section-7.2)
///
/// ```text
/// enum { warning(1), fatal(2), (255) } AlertLevel;
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum AlertLevel {
    /// Warning.
    Warning = 1,
    /// Fatal.
    Fatal = 2,
}

impl From<AlertLevel> for u8 {
    #[inline]
    fn from(alert_level: AlertLevel) -> Self {
        alert_level as u8
    }
}

impl TryFrom<u8> for AlertLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::Warning as u8) => Ok(Self::Warning),
            x if x == (Self::Fatal as u8) => Ok(Self::Fatal),
            _ => Err(value),
        }
    }
}

/// Alert description.
///
/// # References
///
/// * [RFC 5246 Section 7.2](https://datatracker.ietf.org/doc/html/rfc5246#section-7.2)
///
/// ```text
/// enum {
///     close_notify(0),
///     unexpected_message(10),
///     bad_record_mac(20),
///     decryption_failed_RESERVED(21),
///     record_overflow(22),
///     decompression_failure(30),
///     handshake_failure(40),
///     no_certificate_RESERVED(41),
///     bad_certificate(42),
///     unsupported_certificate(43),
///     certificate_revoked(44),
///     certificate_expired(45),
///     certificate_unknown(46),
///     illegal_parameter(47),
///     unknown_ca(48),
///     access_denied(49),
///     decode_error(50),
///     decrypt_error(51),
///     export_restriction_RESERVED(60),
///     protocol_version(70),
///     insufficient_security(71),
///     internal_error(80),
///     user_canceled(90),
///     no_renegotiation(100),
///     unsupported_extension(110),
///     (255)
/// } AlertDescription;
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AlertDescription {
    /// The sender will not send any more messages on this connection.
    CloseNotify = 0,
    /// An inappropriate message was received.
    UnexpectedMessage = 10,
    /// A record was received with an incorrect MAC.
    ///
    /// Also sent for undecryptable or mis-padded records, so a padding
    /// failure is indistinguishable from a MAC failure on the wire.
    BadRecordMac = 20,
    /// Reserved value, never sent by compliant implementations.
    DecryptionFailed = 21,
    /// A record exceeded the maximum permitted length.
    RecordOverflow = 22,
    /// The decompression function received improper input.
    DecompressionFailure = 30,
    /// No acceptable set of security parameters could be negotiated.
    HandshakeFailure = 40,
    /// Reserved value, never sent by compliant implementations.
    NoCertificate = 41,
    /// A certificate was corrupt or contained signatures that did not
    /// verify correctly.
    BadCertificate = 42,
    /// A certificate was of an unsupported type.
    UnsupportedCertificate = 43,
    /// A certificate was revoked by its signer.
    CertificateRevoked = 44,
    /// A certificate has expired or is not currently valid.
    CertificateExpired = 45,
    /// Some other unspecified issue arose in processing the certificate.
    CertificateUnknown = 46,
    /// A field in the handshake was incorrect or inconsistent with other
    /// fields.
    IllegalParameter = 47,
    /// The CA certificate could not be located or matched with a known
    /// trust anchor.
    UnknownCa = 48,
    /// A valid certificate was received, but access control denied it.
    AccessDenied = 49,
    /// A message could not be decoded because a field was out of range or
    /// a length was wrong.
    DecodeError = 50,
    /// A handshake cryptographic operation failed, including a bad
    /// Finished message.
    DecryptError = 51,
    /// Reserved value, never sent by compliant implementations.
    ExportRestriction = 60,
    /// The protocol version the peer attempted to negotiate is recognized
    /// but not supported.
    ProtocolVersion = 70,
    /// The server requires parameters more secure than the client supports.
    InsufficientSecurity = 71,
    /// An internal error unrelated to the peer makes it impossible to
    /// continue.
    InternalError = 80,
    /// The handshake is being canceled for some reason unrelated to a
    /// protocol failure.
    UserCanceled = 90,
    /// Renegotiation is not permitted.
    NoRenegotiation = 100,
    /// A handshake message contained an extension that is prohibited in
    /// that message.
    UnsupportedExtension = 110,
}

impl From<AlertDescription> for u8 {
    #[inline]
    fn from(alert_description: AlertDescription) -> Self {
        alert_description as u8
    }
}

impl TryFrom<u8> for AlertDescription {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == (Self::CloseNotify as u8) => Ok(Self::CloseNotify),
            x if x == (Self::UnexpectedMessage as u8) => Ok(Self::UnexpectedMessage),
            x if x == (Self::BadRecordMac as u8) => Ok(Self::BadRecordMac),
            x if x == (Self::DecryptionFailed as u8) => Ok(Self::DecryptionFailed),
            x if x == (Self::RecordOverflow as u8) => Ok(Self::RecordOverflow),
            x if x == (Self::DecompressionFailure as u8) => Ok(Self::DecompressionFailure),
            x if x == (Self::HandshakeFailure as u8) => Ok(Self::HandshakeFailure),
            x if x == (Self::NoCertificate as u8) => Ok(Self::NoCertificate),
            x if x == (Self::BadCertificate as u8) => Ok(Self::BadCertificate),
            x if x == (Self::UnsupportedCertificate as u8) => Ok(Self::UnsupportedCertificate),
            x if x == (Self::CertificateRevoked as u8) => Ok(Self::CertificateRevoked),
            x if x == (Self::CertificateExpired as u8) => Ok(Self::CertificateExpired),
            x if x == (Self::CertificateUnknown as u8) => Ok(Self::CertificateUnknown),
            x if x == (Self::IllegalParameter as u8) => Ok(Self::IllegalParameter),
            x if x == (Self::UnknownCa as u8) => Ok(Self::UnknownCa),
            x if x == (Self::AccessDenied as u8) => Ok(Self::AccessDenied),
            x if x == (Self::DecodeError as u8) => Ok(Self::DecodeError),
            x if x == (Self::DecryptError as u8) => Ok(Self::DecryptError),
            x if x == (Self::ExportRestriction as u8) => Ok(Self::ExportRestriction),
            x if x == (Self::ProtocolVersion as u8) => Ok(Self::ProtocolVersion),
            x if x == (Self::InsufficientSecurity as u8) => Ok(Self::InsufficientSecurity),
            x if x == (Self::InternalError as u8) => Ok(Self::InternalError),
            x if x == (Self::UserCanceled as u8) => Ok(Self::UserCanceled),
            x if x == (Self::NoRenegotiation as u8) => Ok(Self::NoRenegotiation),
            x if x == (Self::UnsupportedExtension as u8) => Ok(Self::UnsupportedExtension),
            _ => Err(value),
        }
    }
}

/// TLS Alert.
///
/// See [`AlertLevel`] and [`AlertDescription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// Alert level.
    pub level: AlertLevel,
    /// Alert description.
    pub description: AlertDescription,
}

/// Wire alert sent (best-effort) when the session closes with an error.
pub(crate) fn for_error(e: &Error) -> AlertDescription {
    match e {
        Error::OutOfMemory | Error::Io => AlertDescription::InternalError,
        Error::NotSupported => AlertDescription::HandshakeFailure,
        Error::ProtocolViolation => AlertDescription::DecodeError,
        Error::InvalidArgument => AlertDescription::IllegalParameter,
        Error::PermissionDenied => AlertDescription::BadRecordMac,
        Error::IncompleteChain => AlertDescription::BadCertificate,
        Error::WrongName => AlertDescription::CertificateUnknown,
        Error::NotConnected => AlertDescription::InternalError,
    }
}
