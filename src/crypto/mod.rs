//! Uniform facade over the cryptographic primitives the record layer and
//! handshake consume: keyed digests, bulk ciphers, and the server public-key
//! operations. Each kind has a null identity used as the "no cipher yet"
//! sentinel before the first ChangeCipherSpec.

pub(crate) mod pubkey;

use aes::cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// AES block length; also the record IV length for both AES key sizes.
pub(crate) const AES_BLOCK_LEN: usize = 16;

/// Record MAC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MacAlg {
    /// Identity MAC: zero length, always verifies.
    Null,
    HmacSha1,
    HmacSha256,
}

impl MacAlg {
    pub(crate) const fn output_len(self) -> usize {
        match self {
            MacAlg::Null => 0,
            MacAlg::HmacSha1 => 20,
            MacAlg::HmacSha256 => 32,
        }
    }

    /// MAC over the concatenation of `parts`.
    pub(crate) fn compute(self, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
        match self {
            MacAlg::Null => Vec::new(),
            MacAlg::HmacSha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key).unwrap();
                for part in parts {
                    mac.update(part);
                }
                mac.finalize().into_bytes().to_vec()
            }
            MacAlg::HmacSha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
                for part in parts {
                    mac.update(part);
                }
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    /// Constant-time verification of `tag` against the MAC of `parts`.
    pub(crate) fn verify(self, key: &[u8], parts: &[&[u8]], tag: &[u8]) -> bool {
        let expected = self.compute(key, parts);
        expected.len() == tag.len() && bool::from(expected.ct_eq(tag))
    }
}

/// Bulk (record) cipher algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BulkAlg {
    /// Identity cipher: no key, no IV, no padding.
    Null,
    Aes128Cbc,
    Aes256Cbc,
}

impl BulkAlg {
    pub(crate) const fn key_len(self) -> usize {
        match self {
            BulkAlg::Null => 0,
            BulkAlg::Aes128Cbc => 16,
            BulkAlg::Aes256Cbc => 32,
        }
    }

    /// Block length, and therefore IV length. 0 marks a non-block cipher.
    pub(crate) const fn block_len(self) -> usize {
        match self {
            BulkAlg::Null => 0,
            BulkAlg::Aes128Cbc | BulkAlg::Aes256Cbc => AES_BLOCK_LEN,
        }
    }

    pub(crate) const fn is_block(self) -> bool {
        self.block_len() != 0
    }
}

/// Live bulk-cipher state for one direction of one epoch.
///
/// The CBC variants carry the chained IV, so cloning one yields the scratch
/// "next" context the transmit path advances speculatively and commits only
/// after the record was handed off.
#[derive(Clone)]
pub(crate) enum CipherCtx {
    Null,
    Enc128(cbc::Encryptor<Aes128>),
    Enc256(cbc::Encryptor<Aes256>),
    Dec128(cbc::Decryptor<Aes128>),
    Dec256(cbc::Decryptor<Aes256>),
}

impl CipherCtx {
    /// Transmit-direction context. `key` and `iv` lengths must match `alg`.
    pub(crate) fn encryptor(alg: BulkAlg, key: &[u8], iv: &[u8]) -> CipherCtx {
        match alg {
            BulkAlg::Null => CipherCtx::Null,
            BulkAlg::Aes128Cbc => {
                CipherCtx::Enc128(cbc::Encryptor::new_from_slices(key, iv).unwrap())
            }
            BulkAlg::Aes256Cbc => {
                CipherCtx::Enc256(cbc::Encryptor::new_from_slices(key, iv).unwrap())
            }
        }
    }

    /// Receive-direction context. `key` and `iv` lengths must match `alg`.
    pub(crate) fn decryptor(alg: BulkAlg, key: &[u8], iv: &[u8]) -> CipherCtx {
        match alg {
            BulkAlg::Null => CipherCtx::Null,
            BulkAlg::Aes128Cbc => {
                CipherCtx::Dec128(cbc::Decryptor::new_from_slices(key, iv).unwrap())
            }
            BulkAlg::Aes256Cbc => {
                CipherCtx::Dec256(cbc::Decryptor::new_from_slices(key, iv).unwrap())
            }
        }
    }

    /// Encrypt `data` in place. `data` must be a whole number of blocks.
    pub(crate) fn encrypt_in_place(&mut self, data: &mut [u8]) {
        match self {
            CipherCtx::Null => (),
            CipherCtx::Enc128(enc) => {
                for block in data.chunks_exact_mut(AES_BLOCK_LEN) {
                    enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            CipherCtx::Enc256(enc) => {
                for block in data.chunks_exact_mut(AES_BLOCK_LEN) {
                    enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            CipherCtx::Dec128(_) | CipherCtx::Dec256(_) => {
                debug_assert!(false, "receive context used for encryption");
            }
        }
    }

    /// Decrypt `data` in place. `data` must be a whole number of blocks.
    pub(crate) fn decrypt_in_place(&mut self, data: &mut [u8]) {
        match self {
            CipherCtx::Null => (),
            CipherCtx::Dec128(dec) => {
                for block in data.chunks_exact_mut(AES_BLOCK_LEN) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            CipherCtx::Dec256(dec) => {
                for block in data.chunks_exact_mut(AES_BLOCK_LEN) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            CipherCtx::Enc128(_) | CipherCtx::Enc256(_) => {
                debug_assert!(false, "transmit context used for decryption");
            }
        }
    }
}

impl core::fmt::Debug for CipherCtx {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let name = match self {
            CipherCtx::Null => "Null",
            CipherCtx::Enc128(_) => "Enc128",
            CipherCtx::Enc256(_) => "Enc256",
            CipherCtx::Dec128(_) => "Dec128",
            CipherCtx::Dec256(_) => "Dec256",
        };
        write!(f, "CipherCtx::{name} {{ ... }}")
    }
}

#[cfg(test)]
mod tests {
    use super::{BulkAlg, CipherCtx, MacAlg};

    #[test]
    fn mac_verify_round_trip() {
        let key: [u8; 20] = [0xA5; 20];
        let tag = MacAlg::HmacSha1.compute(&key, &[b"hello ", b"world"]);
        assert_eq!(tag.len(), 20);
        assert!(MacAlg::HmacSha1.verify(&key, &[b"hello world"], &tag));
        assert!(!MacAlg::HmacSha1.verify(&key, &[b"hello worle"], &tag));
        assert!(!MacAlg::HmacSha1.verify(&key, &[b"hello world"], &tag[..19]));
    }

    #[test]
    fn null_mac_is_empty() {
        assert_eq!(MacAlg::Null.compute(&[], &[b"data"]), Vec::<u8>::new());
        assert!(MacAlg::Null.verify(&[], &[b"data"], &[]));
    }

    #[test]
    fn cbc_chained_state_round_trip() {
        let key: [u8; 16] = [0x11; 16];
        let iv: [u8; 16] = [0x22; 16];

        let mut enc = CipherCtx::encryptor(BulkAlg::Aes128Cbc, &key, &iv);
        let mut dec = CipherCtx::decryptor(BulkAlg::Aes128Cbc, &key, &iv);

        let plain: [u8; 48] = *b"exactly three aes blocks of text for chaining!!!";

        // two records, to exercise IV chaining across calls
        let mut first: [u8; 32] = plain[..32].try_into().unwrap();
        let mut second: [u8; 16] = plain[32..].try_into().unwrap();
        enc.encrypt_in_place(&mut first);
        enc.encrypt_in_place(&mut second);
        assert_ne!(&first[..], &plain[..32]);

        dec.decrypt_in_place(&mut first);
        dec.decrypt_in_place(&mut second);
        assert_eq!(&first[..], &plain[..32]);
        assert_eq!(&second[..], &plain[32..]);
    }

    #[test]
    fn clone_preserves_chain_position() {
        let key: [u8; 16] = [0x31; 16];
        let iv: [u8; 16] = [0x42; 16];

        let mut enc = CipherCtx::encryptor(BulkAlg::Aes128Cbc, &key, &iv);
        let mut block_a: [u8; 16] = [0x55; 16];
        enc.encrypt_in_place(&mut block_a);

        // a clone advanced independently must produce the same ciphertext
        let mut scratch = enc.clone();
        let mut from_scratch: [u8; 16] = [0x66; 16];
        let mut from_active: [u8; 16] = [0x66; 16];
        scratch.encrypt_in_place(&mut from_scratch);
        enc.encrypt_in_place(&mut from_active);
        assert_eq!(from_scratch, from_active);
    }
}
