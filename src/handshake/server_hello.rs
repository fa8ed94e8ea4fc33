//! ```text
//! struct {
//!     ProtocolVersion server_version;
//!     Random random;
//!     SessionID session_id;
//!     CipherSuite cipher_suite;
//!     CompressionMethod compression_method;
//!     select (extensions_present) {
//!         case true: Extension extensions<0..2^16-1>;
//!     };
//! } ServerHello;
//! ```

use crate::io::Reader;
use crate::Error;

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ServerHello {
    /// Raw protocol version; range-checked by the session, which knows what
    /// it advertised.
    pub(crate) version: u16,
    pub(crate) random: [u8; 32],
    pub(crate) cipher_suite: u16,
    pub(crate) compression: u8,
}

pub(crate) fn parse(body: &[u8]) -> Result<ServerHello, Error> {
    let mut reader: Reader = Reader::new(body);

    let version: u16 = reader.next_u16()?;
    let random: [u8; 32] = reader.next_n()?;

    let session_id_len: u8 = reader.next_u8()?;
    if session_id_len > 32 {
        log::error!("session id length {session_id_len} exceeds 32");
        return Err(Error::ProtocolViolation);
    }
    // no resumption support; the echoed id is irrelevant
    reader.skip(session_id_len.into())?;

    let cipher_suite: u16 = reader.next_u16()?;
    let compression: u8 = reader.next_u8()?;

    // extensions are permitted but nothing in them concerns this client
    if !reader.is_empty() {
        let extensions_len: usize = reader.next_u16()?.into();
        if extensions_len != reader.remaining() {
            log::error!(
                "extensions length {extensions_len} does not match remaining {}",
                reader.remaining()
            );
            return Err(Error::ProtocolViolation);
        }
    }

    Ok(ServerHello {
        version,
        random,
        cipher_suite,
        compression,
    })
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::Error;

    fn sample(session_id_len: u8, extensions: &[u8]) -> Vec<u8> {
        let mut body: Vec<u8> = vec![0x03, 0x03];
        body.extend_from_slice(&[0x42; 32]);
        body.push(session_id_len);
        body.extend(core::iter::repeat(0xEE).take(session_id_len.into()));
        body.extend_from_slice(&[0x00, 0x2F]);
        body.push(0);
        body.extend_from_slice(extensions);
        body
    }

    #[test]
    fn minimal() {
        let hello = parse(&sample(0, &[])).unwrap();
        assert_eq!(hello.version, 0x0303);
        assert_eq!(hello.random, [0x42; 32]);
        assert_eq!(hello.cipher_suite, 0x002F);
        assert_eq!(hello.compression, 0);
    }

    #[test]
    fn session_id_echo_is_skipped() {
        let hello = parse(&sample(32, &[])).unwrap();
        assert_eq!(hello.cipher_suite, 0x002F);
    }

    #[test]
    fn extension_block_length_checked() {
        // well-formed empty extension block
        assert!(parse(&sample(0, &[0x00, 0x00])).is_ok());
        // length field pointing past the end of the message
        assert_eq!(
            parse(&sample(0, &[0x00, 0x09, 0x00])),
            Err(Error::ProtocolViolation)
        );
    }

    #[test]
    fn truncated() {
        assert_eq!(parse(&[0x03, 0x03, 0x42]), Err(Error::ProtocolViolation));
    }
}
