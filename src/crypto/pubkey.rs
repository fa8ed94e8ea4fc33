//! Public-key operations for the RSA key exchange and client authentication.

use crate::{Error, TlsVersion};
use rand_core::{CryptoRng, RngCore};
use rsa::{
    pkcs1::DecodeRsaPrivateKey, pkcs8::DecodePrivateKey, Pkcs1v15Encrypt, Pkcs1v15Sign,
    RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;

/// RSAES-PKCS1-v1_5 encryption under the server public key.
///
/// Used for exactly one message: the 48-byte pre-master secret.
pub(crate) fn encrypt_pkcs1<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &RsaPublicKey,
    msg: &[u8],
) -> Result<Vec<u8>, Error> {
    key.encrypt(rng, Pkcs1v15Encrypt, msg).map_err(|e| {
        log::error!("RSA encryption failed: {e}");
        Error::InvalidArgument
    })
}

/// Parse a DER private key, accepting PKCS#8 or bare PKCS#1 encodings.
///
/// Anything that is not an RSA key is unsupported; the suite catalog is
/// RSA-only.
pub(crate) fn parse_private_key(der: &[u8]) -> Result<RsaPrivateKey, Error> {
    RsaPrivateKey::from_pkcs8_der(der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
        .map_err(|e| {
            log::error!("client private key is not a usable RSA key: {e}");
            Error::NotSupported
        })
}

/// RSASSA-PKCS1-v1_5 signature over a handshake transcript digest.
///
/// For TLS 1.2 the digest is SHA-256 and the signature carries the SHA-256
/// DigestInfo prefix. Below 1.2 the digest is MD5 ‖ SHA-1 (36 bytes) signed
/// without any prefix, per RFC 4346 section 7.4.8.
pub(crate) fn sign_transcript(
    key: &RsaPrivateKey,
    version: TlsVersion,
    digest: &[u8],
) -> Result<Vec<u8>, Error> {
    let padding = if version >= TlsVersion::V1_2 {
        Pkcs1v15Sign::new::<Sha256>()
    } else {
        Pkcs1v15Sign::new_unprefixed()
    };
    key.sign(padding, digest).map_err(|e| {
        log::error!("CertificateVerify signature failed: {e}");
        Error::InvalidArgument
    })
}
