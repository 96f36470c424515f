// SPDX-License-Identifier: MIT
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
//! Authorization-session core for TPM 2.0 commands: nonce bookkeeping,
//! parameter/response hashing, authHMAC computation and verification,
//! PCR-bound and policy-OR authorization policies, and the ECDH/HKDF
//! handshake helper used to bootstrap a mutually authenticated channel to
//! the TPM resource manager.
//!
//! The [`Session`] state machine is the crate's front door: [`Session::start`]
//! opens a session, [`Session::exchange`] authorizes one command against it,
//! and [`Session::close`] (or simply dropping it) tears it down. Everything
//! else here — [`crypto::CryptoProvider`], [`transport::Transport`],
//! [`policy::PolicyEngine`] — is a collaborator `Session` drives.

mod auth_hmac;
mod auth_value;
mod crypto;
mod digest;
mod ecdh_kdf;
mod error;
mod nonce;
mod param_hash;
mod policy;
mod session;
mod transport;
mod wire;

pub use auth_hmac::{AuthHmac, Direction};
pub use auth_value::AuthValue;
pub use crypto::{CryptoProvider, EcPrivateKey, RustCryptoProvider};
pub use digest::Digest;
pub use ecdh_kdf::EcdhKdf;
pub use error::{Error, Result};
pub use nonce::NonceBook;
pub use param_hash::ParameterHasher;
pub use policy::PolicyEngine;
pub use session::{SaltMaterial, Session, SessionKind};
pub use transport::Transport;
