//! Running handshake transcript.
//!
//! Every handshake message on the wire, in both directions, enters the
//! transcript, except HelloRequest. MD5+SHA-1 and SHA-256 all run until the
//! ServerHello settles the version; finalization picks the pair or SHA-256
//! accordingly, so a late version switch never loses history.

use crate::TlsVersion;
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;

#[derive(Clone)]
pub(crate) struct Transcript {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
}

impl Transcript {
    pub(crate) fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    /// Snapshot digest for the negotiated version. The running state is not
    /// consumed; further messages may still be appended.
    ///
    /// 36 bytes (MD5 ‖ SHA-1) below TLS 1.2, 32 bytes (SHA-256) for 1.2.
    pub(crate) fn digest(&self, version: TlsVersion) -> Vec<u8> {
        if version >= TlsVersion::V1_2 {
            self.sha256.clone().finalize().to_vec()
        } else {
            let mut out: Vec<u8> = Vec::with_capacity(36);
            out.extend_from_slice(&self.md5.clone().finalize());
            out.extend_from_slice(&self.sha1.clone().finalize());
            out
        }
    }
}

impl core::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Transcript {{ ... }}")
    }
}
