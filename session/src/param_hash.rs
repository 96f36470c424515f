// SPDX-License-Identifier: MIT

use crate::crypto::CryptoProvider;
use crate::digest::Digest;
use tpm2_proto::{HashAlg, Name};

/// Computes the command- and response-parameter hashes that feed `AuthHmac`.
pub struct ParameterHasher;

impl ParameterHasher {
    /// `cpHash = H(u32be(code) || entityName || params)`.
    #[must_use]
    pub fn cp_hash(
        crypto: &dyn CryptoProvider,
        alg: HashAlg,
        code: u32,
        entity_name: &Name,
        params: &[u8],
    ) -> Digest {
        let mut message = Vec::with_capacity(4 + entity_name.as_bytes().len() + params.len());
        message.extend(code.to_be_bytes());
        message.extend(entity_name.as_bytes());
        message.extend(params);
        crypto.hash(alg, &message)
    }

    /// `rpHash = H(u32be(responseCode) || u32be(code) || params)`.
    #[must_use]
    pub fn rp_hash(
        crypto: &dyn CryptoProvider,
        alg: HashAlg,
        response_code: u32,
        code: u32,
        params: &[u8],
    ) -> Digest {
        let mut message = Vec::with_capacity(8 + params.len());
        message.extend(response_code.to_be_bytes());
        message.extend(code.to_be_bytes());
        message.extend(params);
        crypto.hash(alg, &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RustCryptoProvider;

    #[test]
    fn cp_hash_is_deterministic_and_length_equal() {
        let crypto = RustCryptoProvider;
        let name = Name::from(vec![0x00, 0x0b, 1, 2, 3]);
        let a = ParameterHasher::cp_hash(&crypto, HashAlg::Sha256, 0x15E, &name, b"params");
        let b = ParameterHasher::cp_hash(&crypto, HashAlg::Sha256, 0x15E, &name, b"params");
        assert_eq!(a, b);
        assert_eq!(a.as_bytes().len(), HashAlg::Sha256.output_len());
    }

    #[test]
    fn rp_hash_changes_with_response_code() {
        let crypto = RustCryptoProvider;
        let ok = ParameterHasher::rp_hash(&crypto, HashAlg::Sha256, 0, 0x15E, b"out");
        let err = ParameterHasher::rp_hash(&crypto, HashAlg::Sha256, 0x98E, 0x15E, b"out");
        assert_ne!(ok, err);
    }
}
