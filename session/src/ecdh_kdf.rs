// SPDX-License-Identifier: MIT
//! Ephemeral ECDH (P-256) key agreement plus an HKDF-Extract-and-Expand
//! step that turns the shared secret into two independent keys for a
//! mutual-authentication handshake: one to authenticate the responder to
//! the initiator, one for the reverse direction.

use crate::crypto::{CryptoProvider, EcPrivateKey};
use crate::error::{Error, Result};
use tpm2_proto::HashAlg;

/// The literal salt used for every handshake's HKDF-Extract step. Fixed,
/// not secret: HKDF's salt only needs to be distinct from the IKM domain,
/// and a constant salt keeps the derivation reproducible across runs of
/// the protocol with no extra negotiation.
const HKDF_SALT: &[u8] = b"kmyth";

/// One ECDH(P-256) + HKDF(SHA-512) key-agreement round, yielding a pair of
/// equal-length keys from a single shared secret.
pub struct EcdhKdf;

impl EcdhKdf {
    /// Generates an ephemeral P-256 keypair; returns the private key and
    /// the SEC1 (uncompressed point) encoding of the public key to send to
    /// the peer.
    #[must_use]
    pub fn ephemeral_keypair(crypto: &dyn CryptoProvider) -> (EcPrivateKey, Vec<u8>) {
        crypto.ec_keygen()
    }

    /// Runs ECDH with the peer's SEC1-encoded public key, returning the raw
    /// shared secret (the affine x-coordinate of the agreed point).
    pub fn shared_secret(crypto: &dyn CryptoProvider, local_priv: &EcPrivateKey, peer_pub: &[u8]) -> Result<Vec<u8>> {
        crypto.ecdh_derive(local_priv, peer_pub)
    }

    /// Derives two independent `key_len`-byte keys from `shared_secret` via
    /// `HKDF-SHA512(salt = "kmyth", ikm = shared_secret)`, expanded with
    /// `info = msg1 || msg2` to `2 * key_len` bytes and split in half.
    ///
    /// `msg1`/`msg2` are the two handshake messages that bind the derived
    /// keys to this specific exchange (e.g. each side's ephemeral public
    /// key and nonce); binding the info parameter to them prevents a
    /// derived key from one handshake being replayed into another.
    pub fn derive_two_keys(
        crypto: &dyn CryptoProvider,
        shared_secret: &[u8],
        msg1: &[u8],
        msg2: &[u8],
        key_len: usize,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        if key_len == 0 {
            return Err(Error::InvalidInput("key_len must be non-zero".into()));
        }
        let mut info = Vec::with_capacity(msg1.len() + msg2.len());
        info.extend(msg1);
        info.extend(msg2);

        let okm = crypto.hkdf(HashAlg::Sha512, HKDF_SALT, shared_secret, &info, 2 * key_len)?;
        let (k1, k2) = okm.split_at(key_len);
        Ok((k1.to_vec(), k2.to_vec()))
    }
}
