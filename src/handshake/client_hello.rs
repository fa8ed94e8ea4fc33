//! ```text
//! struct {
//!     ProtocolVersion client_version;
//!     Random random;
//!     SessionID session_id;
//!     CipherSuite cipher_suites<2..2^16-2>;
//!     CompressionMethod compression_methods<1..2^8-1>;
//!     select (extensions_present) {
//!         case true: Extension extensions<0..2^16-1>;
//!     };
//! } ClientHello;
//! ```

use crate::cipher_suites::CipherSuite;
use crate::TlsVersion;

/// server_name extension type.
///
/// # References
///
/// * [RFC 6066 Section 3](https://datatracker.ietf.org/doc/html/rfc6066#section-3)
const SERVER_NAME: u16 = 0;
const NAME_TYPE_HOST_NAME: u8 = 0;

const NULL_COMPRESSION: u8 = 0;

/// Serialize a ClientHello body (handshake header not included).
///
/// Session resumption is not supported, so the session id is always empty.
/// The only extension sent is server_name, carrying `server_name` as ASCII
/// without a trailing NUL.
pub(crate) fn ser(version: TlsVersion, random: &[u8; 32], server_name: &str) -> Vec<u8> {
    let name: &[u8] = server_name.as_bytes();

    let name_len: u16 = name.len() as u16;
    let server_name_list_len: u16 = name_len + 3;
    let extension_len: u16 = server_name_list_len + 2;
    let extensions_len: u16 = extension_len + 4;

    let mut body: Vec<u8> = Vec::with_capacity(49 + 2 * CipherSuite::PREFERENCE.len() + name.len() + 9);

    body.extend_from_slice(&(version as u16).to_be_bytes());
    body.extend_from_slice(random);
    body.push(0); // empty session id

    body.extend_from_slice(&((CipherSuite::PREFERENCE.len() * 2) as u16).to_be_bytes());
    for suite in CipherSuite::PREFERENCE {
        body.extend_from_slice(&suite.code().to_be_bytes());
    }

    body.push(1);
    body.push(NULL_COMPRESSION);

    body.extend_from_slice(&extensions_len.to_be_bytes());
    body.extend_from_slice(&SERVER_NAME.to_be_bytes());
    body.extend_from_slice(&extension_len.to_be_bytes());
    body.extend_from_slice(&server_name_list_len.to_be_bytes());
    body.push(NAME_TYPE_HOST_NAME);
    body.extend_from_slice(&name_len.to_be_bytes());
    body.extend_from_slice(name);

    body
}
