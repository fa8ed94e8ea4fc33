//! Finished verify_data.
//!
//! ```text
//! verify_data = PRF(master_secret, finished_label,
//!                   Hash(handshake_messages))[0..verify_data_length-1];
//! ```
//!
//! verify_data_length is 12 for every suite in the catalog, at every
//! protocol version.

use crate::prf::prf;
use crate::transcript::Transcript;
use crate::TlsVersion;

pub(crate) const VERIFY_DATA_LEN: usize = 12;

pub(crate) const CLIENT_LABEL: &[u8] = b"client finished";
pub(crate) const SERVER_LABEL: &[u8] = b"server finished";

pub(crate) fn verify_data(
    version: TlsVersion,
    master_secret: &[u8],
    transcript: &Transcript,
    label: &[u8],
) -> [u8; VERIFY_DATA_LEN] {
    let digest: Vec<u8> = transcript.digest(version);
    let out = prf(version, master_secret, label, &[&digest], VERIFY_DATA_LEN);
    out[..].try_into().unwrap()
}

#[cfg(test)]
mod tests {
    use super::{verify_data, CLIENT_LABEL, SERVER_LABEL};
    use crate::transcript::Transcript;
    use crate::TlsVersion;

    #[test]
    fn twelve_bytes_at_every_version() {
        let mut transcript = Transcript::new();
        transcript.update(b"handshake messages");
        let master: [u8; 48] = [0x11; 48];

        for version in [TlsVersion::V1_0, TlsVersion::V1_1, TlsVersion::V1_2] {
            let data = verify_data(version, &master, &transcript, CLIENT_LABEL);
            assert_eq!(data.len(), 12);
        }
    }

    #[test]
    fn labels_and_transcript_bind() {
        let mut transcript = Transcript::new();
        transcript.update(b"handshake messages");
        let master: [u8; 48] = [0x11; 48];

        let client = verify_data(TlsVersion::V1_2, &master, &transcript, CLIENT_LABEL);
        let server = verify_data(TlsVersion::V1_2, &master, &transcript, SERVER_LABEL);
        assert_ne!(client, server);

        transcript.update(b"one more message");
        let moved = verify_data(TlsVersion::V1_2, &master, &transcript, CLIENT_LABEL);
        assert_ne!(client, moved);
    }
}
