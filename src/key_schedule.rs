//! Master secret and key block derivation.
//!
//! # References
//!
//! * [RFC 5246 Section 8.1](https://datatracker.ietf.org/doc/html/rfc5246#section-8.1)
//! * [RFC 5246 Section 6.3](https://datatracker.ietf.org/doc/html/rfc5246#section-6.3)
//!
//! ```text
//! master_secret = PRF(pre_master_secret, "master secret",
//!                     ClientHello.random + ServerHello.random)[0..47];
//!
//! key_block = PRF(SecurityParameters.master_secret, "key expansion",
//!                 SecurityParameters.server_random +
//!                 SecurityParameters.client_random);
//! ```

use crate::cipher_suites::CipherSuite;
use crate::prf::prf;
use crate::TlsVersion;
use zeroize::Zeroizing;

pub(crate) const MASTER_SECRET_LEN: usize = 48;

pub(crate) fn master_secret(
    version: TlsVersion,
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Zeroizing<[u8; MASTER_SECRET_LEN]> {
    let out = prf(
        version,
        pre_master_secret,
        b"master secret",
        &[client_random, server_random],
        MASTER_SECRET_LEN,
    );
    let mut secret: Zeroizing<[u8; MASTER_SECRET_LEN]> = Zeroizing::new([0; MASTER_SECRET_LEN]);
    secret.copy_from_slice(&out);
    secret
}

/// Key block sliced per direction. TX is the client-write direction.
pub(crate) struct KeyBlock {
    pub(crate) tx_mac: Zeroizing<Vec<u8>>,
    pub(crate) rx_mac: Zeroizing<Vec<u8>>,
    pub(crate) tx_key: Zeroizing<Vec<u8>>,
    pub(crate) rx_key: Zeroizing<Vec<u8>>,
    pub(crate) tx_iv: Zeroizing<Vec<u8>>,
    pub(crate) rx_iv: Zeroizing<Vec<u8>>,
}

/// Expand the master secret into per-direction MAC secrets, cipher keys and
/// IVs. Note the seed random order is reversed relative to the master
/// secret derivation.
pub(crate) fn key_block(
    version: TlsVersion,
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    suite: CipherSuite,
) -> KeyBlock {
    let mac_len: usize = suite.mac().output_len();
    let key_len: usize = suite.bulk().key_len();
    let iv_len: usize = suite.bulk().block_len();

    let material = prf(
        version,
        master_secret,
        b"key expansion",
        &[server_random, client_random],
        2 * (mac_len + key_len + iv_len),
    );

    let mut at: usize = 0;
    let mut next = |len: usize| {
        let slice: &[u8] = &material[at..at + len];
        at += len;
        Zeroizing::new(slice.to_vec())
    };

    KeyBlock {
        tx_mac: next(mac_len),
        rx_mac: next(mac_len),
        tx_key: next(key_len),
        rx_key: next(key_len),
        tx_iv: next(iv_len),
        rx_iv: next(iv_len),
    }
}
