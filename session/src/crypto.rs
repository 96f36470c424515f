// SPDX-License-Identifier: MIT

use crate::digest::Digest;
use crate::error::{Error, Result};
use elliptic_curve::ecdh::diffie_hellman;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::{PublicKey, SecretKey};
use rand_core::{OsRng, RngCore};
use sha1::Sha1;
use sha2::{Digest as ShaDigest, Sha256, Sha384, Sha512};
use tpm2_proto::HashAlg;
use zeroize::Zeroizing;

/// An ephemeral EC private key, held as zeroized raw scalar bytes so the
/// trait stays curve-agnostic at the call site; concrete providers decode
/// the bytes back into their own key type.
pub struct EcPrivateKey(pub(crate) Zeroizing<Vec<u8>>);

/// Hashing, HMAC, RNG, EC keygen/ECDH, and HKDF, behind one seam so tests
/// can inject a deterministic double without touching the session state
/// machine. Implementations must never fall back to a non-cryptographic
/// RNG, including under test.
pub trait CryptoProvider {
    fn hash(&self, alg: HashAlg, bytes: &[u8]) -> Digest;
    fn hmac(&self, alg: HashAlg, key: &[u8], bytes: &[u8]) -> Digest;
    fn random_bytes(&self, len: usize) -> Vec<u8>;
    fn ec_keygen(&self) -> (EcPrivateKey, Vec<u8>);
    fn ecdh_derive(&self, local_priv: &EcPrivateKey, peer_pub: &[u8]) -> Result<Vec<u8>>;
    fn hkdf(&self, alg: HashAlg, salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>>;
}

/// The default `CryptoProvider`, backed by the RustCrypto stack (`sha1`,
/// `sha2`, `hmac`, `hkdf`, `p256`) and the operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    fn hash(&self, alg: HashAlg, bytes: &[u8]) -> Digest {
        let out = match alg {
            HashAlg::Sha1 => Sha1::digest(bytes).to_vec(),
            HashAlg::Sha256 => Sha256::digest(bytes).to_vec(),
            HashAlg::Sha384 => Sha384::digest(bytes).to_vec(),
            HashAlg::Sha512 => Sha512::digest(bytes).to_vec(),
        };
        Digest::new(alg, out)
    }

    fn hmac(&self, alg: HashAlg, key: &[u8], bytes: &[u8]) -> Digest {
        let out = match alg {
            HashAlg::Sha1 => {
                let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key)
                    .expect("HMAC accepts keys of any length");
                mac.update(bytes);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlg::Sha256 => {
                let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
                    .expect("HMAC accepts keys of any length");
                mac.update(bytes);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlg::Sha384 => {
                let mut mac = <Hmac<Sha384> as Mac>::new_from_slice(key)
                    .expect("HMAC accepts keys of any length");
                mac.update(bytes);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlg::Sha512 => {
                let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key)
                    .expect("HMAC accepts keys of any length");
                mac.update(bytes);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Digest::new(alg, out)
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        OsRng.fill_bytes(&mut buf);
        buf
    }

    fn ec_keygen(&self) -> (EcPrivateKey, Vec<u8>) {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        let priv_bytes = Zeroizing::new(secret.to_bytes().to_vec());
        let pub_bytes = public.to_sec1_bytes().to_vec();
        (EcPrivateKey(priv_bytes), pub_bytes)
    }

    fn ecdh_derive(&self, local_priv: &EcPrivateKey, peer_pub: &[u8]) -> Result<Vec<u8>> {
        if peer_pub.is_empty() {
            return Err(Error::InvalidPeerKey);
        }
        let secret = SecretKey::from_slice(&local_priv.0)
            .map_err(|_| Error::InvalidInput("malformed local EC private key".into()))?;
        let public =
            PublicKey::from_sec1_bytes(peer_pub).map_err(|_| Error::InvalidPeerKey)?;
        let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
        Ok(shared.raw_secret_bytes().to_vec())
    }

    fn hkdf(&self, alg: HashAlg, salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
        let mut okm = vec![0u8; len];
        let expand_result = match alg {
            HashAlg::Sha1 => Hkdf::<Sha1>::new(Some(salt), ikm).expand(info, &mut okm),
            HashAlg::Sha256 => Hkdf::<Sha256>::new(Some(salt), ikm).expand(info, &mut okm),
            HashAlg::Sha384 => Hkdf::<Sha384>::new(Some(salt), ikm).expand(info, &mut okm),
            HashAlg::Sha512 => Hkdf::<Sha512>::new(Some(salt), ikm).expand(info, &mut okm),
        };
        expand_result.map_err(|_| Error::KdfConfiguration)?;
        Ok(okm)
    }
}
