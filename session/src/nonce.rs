// SPDX-License-Identifier: MIT

use crate::error::{Error, Result};
use tpm2_proto::HashAlg;
use zeroize::Zeroize;

/// The caller's rolling `(nonceNewer, nonceOlder)` pair for one session.
///
/// After `init`, `nonceNewer` and `nonceOlder` are both exactly `auth_hash`'s
/// output length, and stay that length across every `roll`.
#[derive(Debug, Zeroize)]
#[zeroize(drop)]
pub struct NonceBook {
    #[zeroize(skip)]
    auth_hash: HashAlg,
    newer: Vec<u8>,
    older: Vec<u8>,
}

impl NonceBook {
    /// Starts the book with the caller's first nonce; `older` begins empty,
    /// matching the state before any TPM nonce has been received.
    #[must_use]
    pub fn init(auth_hash: HashAlg, first_newer_nonce: Vec<u8>) -> Self {
        Self {
            auth_hash,
            newer: first_newer_nonce,
            older: Vec::new(),
        }
    }

    #[must_use]
    pub fn newer(&self) -> &[u8] {
        &self.newer
    }

    #[must_use]
    pub fn older(&self) -> &[u8] {
        &self.older
    }

    /// `older <- newer; newer <- incoming`. Both the existing `newer` and
    /// the `incoming` nonce must equal `auth_hash`'s output length.
    pub fn roll(&mut self, incoming_tpm_nonce: Vec<u8>) -> Result<()> {
        let expected_len = self.auth_hash.output_len();
        if self.newer.len() != expected_len {
            return Err(Error::ProtocolViolation(format!(
                "nonceNewer length {} does not match authHash output length {expected_len}",
                self.newer.len()
            )));
        }
        if incoming_tpm_nonce.len() != expected_len {
            return Err(Error::ProtocolViolation(format!(
                "incoming TPM nonce length {} does not match authHash output length {expected_len}",
                incoming_tpm_nonce.len()
            )));
        }
        self.older = core::mem::replace(&mut self.newer, incoming_tpm_nonce);
        Ok(())
    }

    /// Replaces `newer` with a freshly generated caller nonce ahead of the
    /// next `exchange`, without touching `older`. Used after step 8 of an
    /// exchange, before the command for the next exchange is built.
    pub fn set_newer(&mut self, fresh_nonce: Vec<u8>) -> Result<()> {
        if fresh_nonce.len() != self.auth_hash.output_len() {
            return Err(Error::ProtocolViolation(
                "fresh caller nonce length mismatch".into(),
            ));
        }
        self.newer = fresh_nonce;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_moves_newer_to_older() {
        let mut book = NonceBook::init(HashAlg::Sha256, vec![1u8; 32]);
        book.roll(vec![2u8; 32]).unwrap();
        assert_eq!(book.older(), &[1u8; 32][..]);
        assert_eq!(book.newer(), &[2u8; 32][..]);
    }

    #[test]
    fn roll_rejects_wrong_length() {
        let mut book = NonceBook::init(HashAlg::Sha256, vec![1u8; 32]);
        assert!(book.roll(vec![2u8; 16]).is_err());
    }
}
