// SPDX-License-Identifier: MIT

use crate::crypto::CryptoProvider;
use crate::digest::Digest;
use tpm2_proto::HashAlg;

/// Derives the authorization digest (`authVal`) from raw authorization
/// bytes.
pub struct AuthValue;

impl AuthValue {
    /// Empty or absent `auth_bytes` yield the all-zero digest of `hash_alg`'s
    /// output length; otherwise the digest is `H(auth_bytes)`.
    ///
    /// Makes no internal copy of `auth_bytes` beyond the hash state; the
    /// caller is responsible for zeroing the input after this call returns.
    #[must_use]
    pub fn derive(crypto: &dyn CryptoProvider, auth_bytes: &[u8], hash_alg: HashAlg) -> Digest {
        if auth_bytes.is_empty() {
            Digest::zero(hash_alg)
        } else {
            crypto.hash(hash_alg, auth_bytes)
        }
    }
}
