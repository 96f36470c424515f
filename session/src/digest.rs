// SPDX-License-Identifier: MIT

use tpm2_proto::HashAlg;
use zeroize::Zeroize;

/// A fixed-length byte string tagged with the hash algorithm that produced
/// it. Every digest inside one session shares its session's `authHash`.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct Digest {
    #[zeroize(skip)]
    alg: HashAlg,
    bytes: Vec<u8>,
}

impl Digest {
    #[must_use]
    pub fn new(alg: HashAlg, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), alg.output_len());
        Self { alg, bytes }
    }

    /// The all-zero digest of `alg`'s output length.
    #[must_use]
    pub fn zero(alg: HashAlg) -> Self {
        Self {
            alg,
            bytes: vec![0u8; alg.output_len()],
        }
    }

    #[must_use]
    pub fn alg(&self) -> HashAlg {
        self.alg
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(mut self) -> Vec<u8> {
        core::mem::take(&mut self.bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
