// SPDX-License-Identifier: MIT

use crate::crypto::CryptoProvider;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::wire;
use log::{debug, trace};
use tpm2_proto::{Algorithm, HashAlg, PcrSelection, ResponseCode, Session as SessionType};

/// Builds and satisfies PCR-bound authorization policies, including the
/// compound policy-OR of two branches.
///
/// Exactly one branch of a policy-OR is ever satisfiable at a time — which
/// one is determined by the live PCR state. Implementers must not attempt
/// to try both; `satisfy_policy_or` asks the caller which branch applies.
pub struct PolicyEngine;

impl PolicyEngine {
    /// Runs a trial session through the PCR-bound policy script and reads
    /// back the resulting digest: the authorization-policy digest to bind
    /// to a new object at seal time.
    pub fn build_policy_digest(
        transport: &mut dyn Transport,
        crypto: &dyn CryptoProvider,
        pcr_selection: &PcrSelection,
        hash_alg: HashAlg,
    ) -> Result<Digest> {
        let handle = Self::start_trial_session(transport, crypto, hash_alg)?;
        let result = (|| {
            if !pcr_selection.is_empty() {
                Self::run_policy_pcr(transport, handle, pcr_selection)?;
            }
            Self::read_policy_digest(transport, handle, hash_alg)
        })();
        Self::flush_best_effort(transport, handle);
        result
    }

    /// Runs the PCR-bound policy script against a live `Policy` session,
    /// the real-session counterpart of `build_policy_digest`'s trial run.
    pub fn satisfy_policy(
        transport: &mut dyn Transport,
        session_handle: u32,
        pcr_selection: &PcrSelection,
    ) -> Result<()> {
        if pcr_selection.is_empty() {
            return Ok(());
        }
        Self::run_policy_pcr(transport, session_handle, pcr_selection)
    }

    /// `H(u32be(TPM_CC_PolicyOR) || branch1 || branch2)`. Pure, and
    /// deliberately not commutative: branch order must match the order
    /// used by `satisfy_policy_or`'s `PolicyOR` call or the TPM rejects
    /// with `TPM_RC_VALUE`.
    #[must_use]
    pub fn combine_policy_or(crypto: &dyn CryptoProvider, hash_alg: HashAlg, branch1: &Digest, branch2: &Digest) -> Digest {
        let mut message = Vec::with_capacity(4 + branch1.as_bytes().len() + branch2.as_bytes().len());
        message.extend(tpm2_proto::CC_POLICY_OR.to_be_bytes());
        message.extend(branch1.as_bytes());
        message.extend(branch2.as_bytes());
        crypto.hash(hash_alg, &message)
    }

    /// Satisfies a policy-OR on a live session: runs the PCR script for
    /// whichever branch the caller asserts is satisfiable, then issues
    /// `PolicyOR` over `ordered_branches` — literally `[branch1, branch2]`
    /// in the order used at combine time, and nothing more.
    pub fn satisfy_policy_or(
        transport: &mut dyn Transport,
        session_handle: u32,
        satisfiable_branch_pcrs: &PcrSelection,
        ordered_branches: &[Digest; 2],
    ) -> Result<()> {
        Self::satisfy_policy(transport, session_handle, satisfiable_branch_pcrs)?;
        let branches: Vec<Vec<u8>> = ordered_branches
            .iter()
            .map(|d| d.as_bytes().to_vec())
            .collect();
        let cmd = wire::policy_or(session_handle, &branches);
        let (_, rc) = transport.send(&cmd)?;
        match rc {
            ResponseCode::Success => Ok(()),
            ResponseCode::Value => Err(Error::PolicyNotSatisfied),
            other => Err(Error::Tpm(other)),
        }
    }

    fn start_trial_session(
        transport: &mut dyn Transport,
        crypto: &dyn CryptoProvider,
        hash_alg: HashAlg,
    ) -> Result<u32> {
        let nonce_caller = crypto.random_bytes(hash_alg.output_len());
        let cmd = wire::start_auth_session(
            0x4000_0007, // TPM_RH_NULL: no salt-encrypting key
            0x4000_0007, // TPM_RH_NULL: no bind entity
            &nonce_caller,
            &[],
            SessionType::Trial as u8,
            Algorithm::Null,
            hash_alg,
        );
        let (body, rc) = transport.send(&cmd)?;
        if rc != ResponseCode::Success {
            return Err(Error::Tpm(rc));
        }
        let (handle, _nonce_tpm) = wire::parse_start_auth_session_response(&body)
            .ok_or_else(|| Error::ProtocolViolation("malformed StartAuthSession response".into()))?;
        trace!("trial session {handle:#010x} started");
        Ok(handle)
    }

    fn run_policy_pcr(
        transport: &mut dyn Transport,
        handle: u32,
        pcr_selection: &PcrSelection,
    ) -> Result<()> {
        let cmd = wire::policy_pcr(handle, &[], pcr_selection);
        let (_, rc) = transport.send(&cmd)?;
        match rc {
            ResponseCode::Success => Ok(()),
            ResponseCode::Value | ResponseCode::Pcr | ResponseCode::PcrChanged => {
                Err(Error::PolicyNotSatisfied)
            }
            other => Err(Error::Tpm(other)),
        }
    }

    fn read_policy_digest(
        transport: &mut dyn Transport,
        handle: u32,
        hash_alg: HashAlg,
    ) -> Result<Digest> {
        let cmd = wire::policy_get_digest(handle);
        let (body, rc) = transport.send(&cmd)?;
        if rc != ResponseCode::Success {
            return Err(Error::Tpm(rc));
        }
        let bytes = wire::parse_policy_get_digest_response(&body)
            .ok_or_else(|| Error::ProtocolViolation("malformed PolicyGetDigest response".into()))?;
        if bytes.len() != hash_alg.output_len() {
            return Err(Error::ProtocolViolation(
                "policy digest length does not match authHash".into(),
            ));
        }
        Ok(Digest::new(hash_alg, bytes))
    }

    fn flush_best_effort(transport: &mut dyn Transport, handle: u32) {
        let cmd = wire::flush_context(handle);
        if let Err(err) = transport.send(&cmd) {
            debug!("best-effort flush of trial session {handle:#010x} failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RustCryptoProvider;

    #[test]
    fn combine_policy_or_is_not_commutative() {
        let crypto = RustCryptoProvider;
        let branch_a = Digest::new(HashAlg::Sha256, vec![0x11; HashAlg::Sha256.output_len()]);
        let branch_b = Digest::new(HashAlg::Sha256, vec![0x22; HashAlg::Sha256.output_len()]);

        let forward = PolicyEngine::combine_policy_or(&crypto, HashAlg::Sha256, &branch_a, &branch_b);
        let reversed = PolicyEngine::combine_policy_or(&crypto, HashAlg::Sha256, &branch_b, &branch_a);

        assert_ne!(forward, reversed);
    }
}

