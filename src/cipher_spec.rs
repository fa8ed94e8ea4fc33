//! Per-direction cipher state.
//!
//! Each direction of the record layer owns two of these: the active spec
//! protecting records now, and the pending spec being assembled by the
//! handshake. ChangeCipherSpec swaps pending into active and resets the
//! record sequence number for that direction.

use crate::cipher_suites::CipherSuite;
use crate::crypto::CipherCtx;
use crate::Error;
use rsa::RsaPublicKey;
use zeroize::Zeroizing;

#[derive(Debug)]
pub(crate) struct CipherSpec {
    pub(crate) suite: CipherSuite,
    /// Server public key; populated by the Certificate handler while this
    /// spec is the pending TX spec, consumed by ClientKeyExchange.
    pub(crate) pubkey: Option<RsaPublicKey>,
    pub(crate) mac_key: Zeroizing<Vec<u8>>,
    pub(crate) cipher: CipherCtx,
    /// Record sequence number for this direction of this epoch.
    pub(crate) seq: u64,
}

impl CipherSpec {
    /// Fresh spec carrying the null sentinel suite.
    pub(crate) fn null() -> Self {
        Self {
            suite: CipherSuite::Null,
            pubkey: None,
            mac_key: Zeroizing::new(Vec::new()),
            cipher: CipherCtx::Null,
            seq: 0,
        }
    }

    /// Attach `suite`, discarding any previous key material.
    ///
    /// Keys are installed separately once derived; until then the cipher
    /// context stays null.
    pub(crate) fn set(&mut self, suite: CipherSuite) {
        self.suite = suite;
        self.pubkey = None;
        self.mac_key = Zeroizing::new(Vec::new());
        self.cipher = CipherCtx::Null;
        self.seq = 0;
    }

    /// Install the derived MAC secret and cipher context.
    pub(crate) fn install_keys(&mut self, mac_key: &[u8], cipher: CipherCtx) {
        self.mac_key = Zeroizing::new(mac_key.to_vec());
        self.cipher = cipher;
    }

    /// Commit an advanced transmit context after successful record
    /// hand-off, consuming one sequence number.
    pub(crate) fn commit(&mut self, next: CipherCtx) {
        self.cipher = next;
        self.seq += 1;
    }

    /// Swap `pending` into `active` on ChangeCipherSpec.
    ///
    /// Refused while the pending suite is still the null sentinel. The old
    /// active spec is discarded and `pending` is left null for the next
    /// epoch. The sequence number of the new epoch starts at 0.
    pub(crate) fn change(pending: &mut CipherSpec, active: &mut CipherSpec) -> Result<(), Error> {
        if pending.suite.is_null() {
            log::error!("ChangeCipherSpec with no pending cipher suite");
            return Err(Error::ProtocolViolation);
        }
        core::mem::swap(pending, active);
        pending.clear();
        active.seq = 0;
        Ok(())
    }

    /// Drop all key material and reinstall the null suite.
    pub(crate) fn clear(&mut self) {
        self.set(CipherSuite::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::CipherSpec;
    use crate::cipher_suites::CipherSuite;
    use crate::crypto::CipherCtx;
    use crate::Error;

    #[test]
    fn change_refuses_null_pending() {
        let mut pending = CipherSpec::null();
        let mut active = CipherSpec::null();
        assert_eq!(
            CipherSpec::change(&mut pending, &mut active),
            Err(Error::ProtocolViolation)
        );
    }

    #[test]
    fn change_swaps_and_resets() {
        let mut pending = CipherSpec::null();
        pending.set(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        pending.install_keys(&[0xAB; 20], CipherCtx::Null);

        let mut active = CipherSpec::null();
        active.seq = 17;

        CipherSpec::change(&mut pending, &mut active).unwrap();

        assert_eq!(active.suite, CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        assert_eq!(active.seq, 0);
        assert_eq!(&active.mac_key[..], &[0xAB; 20]);
        assert!(pending.suite.is_null());
        assert!(pending.mac_key.is_empty());
    }

    #[test]
    fn set_discards_previous_material() {
        let mut spec = CipherSpec::null();
        spec.set(CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256);
        spec.install_keys(&[1, 2, 3], CipherCtx::Null);
        spec.seq = 5;

        spec.set(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        assert!(spec.mac_key.is_empty());
        assert_eq!(spec.seq, 0);
    }
}
