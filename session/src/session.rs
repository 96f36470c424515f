// SPDX-License-Identifier: MIT
//! The authorization-session state machine: `start` opens a session against
//! the TPM, `exchange` authorizes one command against it, `close` tears it
//! down. Everything else in this crate exists to serve these three calls.

use crate::auth_hmac::{AuthHmac, Direction};
use crate::auth_value::AuthValue;
use crate::crypto::CryptoProvider;
use crate::error::{Error, Result};
use crate::nonce::NonceBook;
use crate::param_hash::ParameterHasher;
use crate::policy::PolicyEngine;
use crate::transport::Transport;
use crate::wire;
use log::{debug, trace, warn};
use subtle::ConstantTimeEq;
use tpm2_proto::{Algorithm, HashAlg, Name, PcrSelection, ResponseCode, Session as SessionType, SessionAttributes};
use zeroize::Zeroizing;

const MAX_RETRY_ATTEMPTS: u8 = 3;
const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(10);

/// Whether a session enforces a PCR/policy-OR authorization policy, or is a
/// throwaway used only to compute a policy digest. HMAC and password
/// sessions are out of scope; a `Trial` session can never authorize a real
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Trial,
    Policy,
}

impl From<SessionKind> for SessionType {
    fn from(kind: SessionKind) -> Self {
        match kind {
            SessionKind::Trial => SessionType::Trial,
            SessionKind::Policy => SessionType::Policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Closed,
}

/// Salt material for a salted session: a plaintext salt the caller derived
/// out of band, and its encryption under `tpm_key`'s public area (left to
/// the caller — this crate does not implement RSA/ECC key-hierarchy
/// cryptography).
pub struct SaltMaterial {
    pub tpm_key: u32,
    pub salt: Vec<u8>,
    pub encrypted_salt: Vec<u8>,
}

/// An open TPM 2.0 authorization session: a policy or trial session, its
/// rolling nonce state, and the sensitive session key derived at `start`.
///
/// Every field that can carry secret material is zeroized on drop; dropping
/// an `Active` session without calling `close` still wipes memory, it just
/// skips the best-effort `FlushContext`.
pub struct Session {
    kind: SessionKind,
    state: State,
    handle: u32,
    auth_hash: HashAlg,
    nonce_book: NonceBook,
    nonce_tpm: Zeroizing<Vec<u8>>,
    session_key: Zeroizing<Vec<u8>>,
    policy_satisfied: bool,
    last_attributes: SessionAttributes,
}

impl Session {
    /// Issues `StartAuthSession` and derives the session key from the
    /// (optional) salt and (optional) bind entity's authorization value.
    ///
    /// `bind` is `(bindHandle, bindEntityAuthBytes)`; the auth bytes are
    /// consumed into the session key derivation and not retained.
    pub fn start(
        transport: &mut dyn Transport,
        crypto: &dyn CryptoProvider,
        kind: SessionKind,
        salt: Option<SaltMaterial>,
        bind: Option<(u32, &[u8])>,
        symmetric: Algorithm,
        auth_hash: HashAlg,
    ) -> Result<Session> {
        let nonce_caller = crypto.random_bytes(auth_hash.output_len());

        let tpm_key = salt.as_ref().map_or(TPM_RH_NULL, |s| s.tpm_key);
        let encrypted_salt = salt.as_ref().map_or(&[][..], |s| s.encrypted_salt.as_slice());
        let (bind_handle, bind_auth) = bind.map_or((TPM_RH_NULL, &[][..]), |(h, a)| (h, a));

        let cmd = wire::start_auth_session(
            tpm_key,
            bind_handle,
            &nonce_caller,
            encrypted_salt,
            SessionType::from(kind) as u8,
            symmetric,
            auth_hash,
        );
        let (body, rc) = transport.send(&cmd)?;
        if rc != ResponseCode::Success {
            return Err(Error::Tpm(rc));
        }
        let (handle, nonce_tpm) = wire::parse_start_auth_session_response(&body)
            .ok_or_else(|| Error::ProtocolViolation("malformed StartAuthSession response".into()))?;
        if nonce_tpm.len() != auth_hash.output_len() {
            return Err(Error::ProtocolViolation(
                "StartAuthSession nonceTPM length mismatch".into(),
            ));
        }

        let plaintext_salt = salt.map_or_else(Vec::new, |s| s.salt);
        let session_key = derive_session_key(crypto, auth_hash, &plaintext_salt, bind_auth, &nonce_tpm, &nonce_caller);

        debug!("session {handle:#010x} started ({kind:?})");
        Ok(Session {
            kind,
            state: State::Active,
            handle,
            auth_hash,
            nonce_book: NonceBook::init(auth_hash, nonce_caller),
            nonce_tpm: Zeroizing::new(nonce_tpm),
            session_key: Zeroizing::new(session_key),
            policy_satisfied: false,
            last_attributes: SessionAttributes::default(),
        })
    }

    #[must_use]
    pub fn handle(&self) -> u32 {
        self.handle
    }

    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// The session attributes last negotiated with the TPM: `ContinueSession`
    /// from `start` until the first `exchange`, after which it reflects
    /// whatever the TPM echoed back in its last response.
    #[must_use]
    pub fn attributes(&self) -> SessionAttributes {
        self.last_attributes
    }

    /// Whether the session can still authorize a command: `false` once
    /// `close` runs, the TPM drops `continueSession`, or an authHMAC
    /// verification failure closes the session automatically.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Authorizes one command against `entity_name`/`entity_auth_value` and
    /// sends it. On a `Policy` session, satisfies the PCR-bound policy
    /// first unless it (or a policy-OR) has already been satisfied this
    /// session.
    ///
    /// Retries up to three times, 10ms apart, on a retry-class response
    /// code; any other non-success code is returned as-is to the caller
    /// alongside the already-verified response parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn exchange(
        &mut self,
        transport: &mut dyn Transport,
        crypto: &dyn CryptoProvider,
        cmd_code: u32,
        object_handle: u32,
        entity_name: &Name,
        entity_auth_value: &[u8],
        params_in: &[u8],
        attributes: SessionAttributes,
        pcr_binding: Option<&PcrSelection>,
    ) -> Result<(ResponseCode, Vec<u8>)> {
        if self.kind == SessionKind::Trial {
            return Err(Error::Internal("a trial session cannot authorize a command".into()));
        }
        if self.state != State::Active {
            return Err(Error::Internal("exchange on a closed session".into()));
        }

        if self.kind == SessionKind::Policy && !self.policy_satisfied {
            let empty = PcrSelection::empty();
            let selection = pcr_binding.unwrap_or(&empty);
            if let Err(err) = PolicyEngine::satisfy_policy(transport, self.handle, selection) {
                self.close(transport);
                return Err(err);
            }
            self.policy_satisfied = true;
        }

        let entity_auth = AuthValue::derive(crypto, entity_auth_value, self.auth_hash);
        let cp_hash = ParameterHasher::cp_hash(crypto, self.auth_hash, cmd_code, entity_name, params_in);
        let cmd_hmac = AuthHmac::compute(
            crypto,
            self.auth_hash,
            &self.session_key,
            entity_auth.as_bytes(),
            &cp_hash,
            self.nonce_book.newer(),
            &self.nonce_tpm,
            attributes,
            Direction::Command,
        );

        let cmd = wire::authorized_command(
            cmd_code,
            object_handle,
            self.handle,
            self.nonce_book.newer(),
            attributes,
            cmd_hmac.as_bytes(),
            params_in,
        );

        let (body, rc) = match self.send_with_retry(transport, &cmd) {
            Ok(v) => v,
            Err(err) => {
                self.close(transport);
                return Err(err);
            }
        };
        if rc != ResponseCode::Success {
            // A non-success response carries no parameters or auth area to
            // verify (TPM error responses always revert to the
            // no-sessions tag), so there is nothing left to roll or check.
            self.close(transport);
            return Err(classify_failure(rc));
        }
        let (params_out, parsed_auth) = match wire::parse_authorized_response(&body) {
            Some(v) => v,
            None => {
                self.close(transport);
                return Err(Error::ProtocolViolation("malformed authorized response".into()));
            }
        };

        if parsed_auth.nonce_tpm.len() != self.auth_hash.output_len() {
            self.close(transport);
            return Err(Error::ProtocolViolation("response nonceTPM length mismatch".into()));
        }
        if let Err(err) = self.nonce_book.roll(parsed_auth.nonce_tpm.clone()) {
            self.close(transport);
            return Err(err);
        }

        let rp_hash = ParameterHasher::rp_hash(crypto, self.auth_hash, rc as u32, cmd_code, &params_out);
        let expected_hmac = AuthHmac::compute(
            crypto,
            self.auth_hash,
            &self.session_key,
            entity_auth.as_bytes(),
            &rp_hash,
            self.nonce_book.older(),
            self.nonce_book.newer(),
            parsed_auth.attributes,
            Direction::Response,
        );

        if expected_hmac.as_bytes().ct_eq(&parsed_auth.hmac).unwrap_u8() != 1 {
            self.close(transport);
            return Err(Error::AuthVerificationFailed);
        }

        self.nonce_tpm = Zeroizing::new(parsed_auth.nonce_tpm);
        self.last_attributes = parsed_auth.attributes;

        let fresh_nonce = crypto.random_bytes(self.auth_hash.output_len());
        if let Err(err) = self.nonce_book.set_newer(fresh_nonce) {
            self.close(transport);
            return Err(err);
        }

        if !attributes.contains(SessionAttributes::ContinueSession) {
            self.state = State::Closed;
            trace!("session {:#010x} closed itself (continueSession not set)", self.handle);
        }

        Ok((rc, params_out))
    }

    /// Records that a policy-OR (rather than a plain PCR policy) has
    /// already been satisfied on this session, so the next `exchange` does
    /// not attempt to run a plain PCR policy script on top of it.
    pub fn mark_policy_or_satisfied(&mut self) {
        self.policy_satisfied = true;
    }

    /// Flushes the session's TPM-side context and zeroizes local state.
    /// Idempotent: calling `close` twice, or after `exchange` already
    /// closed the session implicitly, is a no-op on the second call.
    pub fn close(&mut self, transport: &mut dyn Transport) {
        if self.state == State::Closed && self.handle == 0 {
            return;
        }
        if self.state != State::Closed || self.handle != 0 {
            let cmd = wire::flush_context(self.handle);
            if let Err(err) = transport.send(&cmd) {
                warn!("best-effort flush of session {:#010x} failed: {err}", self.handle);
            }
        }
        self.state = State::Closed;
        self.handle = 0;
        self.session_key = Zeroizing::new(Vec::new());
        self.nonce_tpm = Zeroizing::new(Vec::new());
    }

    fn send_with_retry(&self, transport: &mut dyn Transport, cmd: &[u8]) -> Result<(Vec<u8>, ResponseCode)> {
        let mut attempt = 0u8;
        loop {
            let (body, rc) = transport.send(cmd)?;
            if !rc.is_retryable() {
                return Ok((body, rc));
            }
            attempt += 1;
            if attempt >= MAX_RETRY_ATTEMPTS {
                return Err(Error::TpmRetry(rc, attempt));
            }
            debug!("session {:#010x} retrying after {rc} (attempt {attempt})", self.handle);
            std::thread::sleep(RETRY_BACKOFF);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.session_key = Zeroizing::new(Vec::new());
        self.nonce_tpm = Zeroizing::new(Vec::new());
    }
}

const TPM_RH_NULL: u32 = 0x4000_0007;

/// Maps a non-success response from an authorized command into this
/// crate's error taxonomy: policy-class codes become `PolicyNotSatisfied`,
/// mirroring `PolicyEngine`'s own treatment of the same codes when they
/// arise from `PolicyPCR` directly; everything else is surfaced verbatim.
fn classify_failure(rc: ResponseCode) -> Error {
    match rc {
        ResponseCode::Value | ResponseCode::Pcr | ResponseCode::PcrChanged | ResponseCode::PolicyFail => {
            Error::PolicyNotSatisfied
        }
        other => Error::Tpm(other),
    }
}

/// `sessionKey = KDFa(authHash, salt || bindAuthValue, "ATH", nonceTPM, nonceCaller, bits)`,
/// or zero-length when both salt and bind auth value are absent, per TPM
/// 2.0 Part 1's session-key derivation.
fn derive_session_key(
    crypto: &dyn CryptoProvider,
    auth_hash: HashAlg,
    salt: &[u8],
    bind_auth_value: &[u8],
    nonce_tpm: &[u8],
    nonce_caller: &[u8],
) -> Vec<u8> {
    if salt.is_empty() && bind_auth_value.is_empty() {
        return Vec::new();
    }
    let mut session_value = Vec::with_capacity(salt.len() + bind_auth_value.len());
    session_value.extend(salt);
    session_value.extend(bind_auth_value);
    kdfa(
        crypto,
        auth_hash,
        &session_value,
        "ATH",
        nonce_tpm,
        nonce_caller,
        (auth_hash.output_len() * 8) as u32,
    )
}

/// TPM 2.0's counter-mode KDF (Part 1, Annex, "KDFa"): repeated
/// `HMAC(key, counter || label || 0x00 || contextU || contextV || bits)`,
/// concatenated and truncated to `bits`.
fn kdfa(
    crypto: &dyn CryptoProvider,
    hash_alg: HashAlg,
    key: &[u8],
    label: &str,
    context_u: &[u8],
    context_v: &[u8],
    bits: u32,
) -> Vec<u8> {
    let mut result = Vec::new();
    let mut counter: u32 = 1;
    while result.len() * 8 < bits as usize {
        let mut message = Vec::new();
        message.extend(counter.to_be_bytes());
        message.extend(label.as_bytes());
        message.push(0u8);
        message.extend(context_u);
        message.extend(context_v);
        message.extend(bits.to_be_bytes());
        result.extend(crypto.hmac(hash_alg, key, &message).into_bytes());
        counter += 1;
    }
    result.truncate(bits.div_ceil(8) as usize);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RustCryptoProvider;

    #[test]
    fn unsalted_unbound_session_key_is_empty() {
        let crypto = RustCryptoProvider;
        let key = derive_session_key(&crypto, HashAlg::Sha256, &[], &[], &[1; 32], &[2; 32]);
        assert!(key.is_empty());
    }

    #[test]
    fn bound_session_key_is_authhash_length_and_deterministic() {
        let crypto = RustCryptoProvider;
        let a = derive_session_key(&crypto, HashAlg::Sha256, &[], b"authval", &[1; 32], &[2; 32]);
        let b = derive_session_key(&crypto, HashAlg::Sha256, &[], b"authval", &[1; 32], &[2; 32]);
        assert_eq!(a, b);
        assert_eq!(a.len(), HashAlg::Sha256.output_len());
    }

    #[test]
    fn salt_changes_session_key() {
        let crypto = RustCryptoProvider;
        let a = derive_session_key(&crypto, HashAlg::Sha256, b"salt-a", b"", &[1; 32], &[2; 32]);
        let b = derive_session_key(&crypto, HashAlg::Sha256, b"salt-b", b"", &[1; 32], &[2; 32]);
        assert_ne!(a, b);
    }

    /// A transport stub that only answers `StartAuthSession` and
    /// `FlushContext`, enough to drive `Session::start`/`close` without a
    /// full TPM simulator.
    struct StartCloseTransport;

    impl Transport for StartCloseTransport {
        fn send(&mut self, cmd: &[u8]) -> Result<(Vec<u8>, ResponseCode)> {
            let body = &cmd[6..];
            let cmd_code = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            if cmd_code == tpm2_proto::Command::StartAuthSession as u32 {
                let mut out = Vec::new();
                out.extend(0x0300_0000u32.to_be_bytes());
                out.extend(32u16.to_be_bytes());
                out.extend([7u8; 32]);
                return Ok((out, ResponseCode::Success));
            }
            Ok((Vec::new(), ResponseCode::Success))
        }
    }

    #[test]
    fn close_zeroizes_session_key_and_nonce_tpm() {
        let crypto = RustCryptoProvider;
        let mut transport = StartCloseTransport;
        let mut session = Session::start(
            &mut transport,
            &crypto,
            SessionKind::Policy,
            None,
            Some((0x4000_0001, b"bind-auth")),
            Algorithm::Null,
            HashAlg::Sha256,
        )
        .unwrap();

        assert!(!session.session_key.is_empty());
        assert!(!session.nonce_tpm.is_empty());

        session.close(&mut transport);

        assert!(session.session_key.is_empty());
        assert!(session.nonce_tpm.is_empty());
        assert_eq!(session.handle, 0);
        assert_eq!(session.state, State::Closed);
    }
}
