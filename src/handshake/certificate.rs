//! ```text
//! struct {
//!     ASN.1Cert certificate_list<0..2^24-1>;
//! } Certificate;
//! ```
//!
//! Each list entry is a `uint24` length followed by DER bytes, leaf first.

use crate::io::Reader;
use crate::Error;

fn put_u24(out: &mut Vec<u8>, value: usize) {
    debug_assert!(value < (1 << 24));
    out.extend_from_slice(&(value as u32).to_be_bytes()[1..]);
}

/// Split a received certificate chain into its DER entries, leaf first.
pub(crate) fn parse_chain(body: &[u8]) -> Result<Vec<&[u8]>, Error> {
    let mut reader: Reader = Reader::new(body);

    let total: usize = reader.next_u24()? as usize;
    if total != reader.remaining() {
        log::error!(
            "certificate list length {total} does not match remaining {}",
            reader.remaining()
        );
        return Err(Error::ProtocolViolation);
    }

    let mut chain: Vec<&[u8]> = Vec::new();
    while !reader.is_empty() {
        let len: usize = reader.next_u24()? as usize;
        chain.push(reader.take(len)?);
    }
    Ok(chain)
}

/// Build the client Certificate body: one entry, or an empty list when no
/// client certificate is configured. The client never sends more than one.
pub(crate) fn build(certificate: Option<&[u8]>) -> Vec<u8> {
    match certificate {
        Some(der) => {
            let mut body: Vec<u8> = Vec::with_capacity(6 + der.len());
            put_u24(&mut body, der.len() + 3);
            put_u24(&mut body, der.len());
            body.extend_from_slice(der);
            body
        }
        None => vec![0, 0, 0],
    }
}
