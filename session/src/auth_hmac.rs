// SPDX-License-Identifier: MIT

use crate::crypto::CryptoProvider;
use crate::digest::Digest;
use tpm2_proto::{HashAlg, SessionAttributes};

/// Which half of an exchange `AuthHmac::compute` is authenticating. The
/// nonce roles swap between the two; binding the choice to an enum instead
/// of two call sites that must remember to swap arguments by hand removes a
/// whole class of authHMAC bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `nonceNewer` = caller's current nonce, `nonceOlder` = the TPM's last
    /// nonce.
    Command,
    /// `nonceNewer` = the TPM's nonce from this response, `nonceOlder` =
    /// the caller's nonce from the just-sent command.
    Response,
}

/// Computes the session authHMAC that authenticates a command or response.
pub struct AuthHmac;

impl AuthHmac {
    /// `HMAC_authHash(sessionKey || authValue, pHash || nonceNewer || nonceOlder || sessionAttributes)`.
    ///
    /// `caller_nonce` and `tpm_nonce` are assigned to the newer/older roles
    /// per `direction`; see the `Direction` documentation.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        crypto: &dyn CryptoProvider,
        alg: HashAlg,
        session_key: &[u8],
        auth_value: &[u8],
        p_hash: &Digest,
        caller_nonce: &[u8],
        tpm_nonce: &[u8],
        attributes: SessionAttributes,
        direction: Direction,
    ) -> Digest {
        let mut key = Vec::with_capacity(session_key.len() + auth_value.len());
        key.extend(session_key);
        key.extend(auth_value);

        let (nonce_newer, nonce_older): (&[u8], &[u8]) = match direction {
            Direction::Command => (caller_nonce, tpm_nonce),
            Direction::Response => (tpm_nonce, caller_nonce),
        };

        let mut message = Vec::with_capacity(
            p_hash.as_bytes().len() + nonce_newer.len() + nonce_older.len() + 1,
        );
        message.extend(p_hash.as_bytes());
        message.extend(nonce_newer);
        message.extend(nonce_older);
        message.push(attributes.bits());

        crypto.hmac(alg, &key, &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RustCryptoProvider;
    use crate::digest::Digest;

    #[test]
    fn swapping_direction_swaps_nonce_roles() {
        let crypto = RustCryptoProvider;
        let p_hash = Digest::zero(HashAlg::Sha256);
        let caller = vec![1u8; 32];
        let tpm = vec![2u8; 32];

        let cmd = AuthHmac::compute(
            &crypto,
            HashAlg::Sha256,
            b"key",
            b"",
            &p_hash,
            &caller,
            &tpm,
            SessionAttributes::ContinueSession,
            Direction::Command,
        );
        let rsp = AuthHmac::compute(
            &crypto,
            HashAlg::Sha256,
            b"key",
            b"",
            &p_hash,
            &caller,
            &tpm,
            SessionAttributes::ContinueSession,
            Direction::Response,
        );
        assert_ne!(cmd, rsp);
    }
}
