// SPDX-License-Identifier: MIT

use tpm2_proto::ResponseCode;

/// The error taxonomy of the authorization-session core.
///
/// Every variant other than `InvalidInput` raised before any TPM state
/// exists implies the owning `Session` (if any) has been closed and
/// zeroized by the time the error reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wrong-length nonces, empty curves, unrecognized hash algorithm.
    /// Caller-fixable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Non-retryable TPM response code, surfaced verbatim for diagnosis.
    #[error("TPM error: {0}")]
    Tpm(ResponseCode),

    /// A retry-class response code persisted after the bounded retry budget
    /// was exhausted.
    #[error("TPM retry class {0} exhausted after {1} attempts")]
    TpmRetry(ResponseCode, u8),

    /// The response HMAC did not match. Treated as potentially adversarial;
    /// the session is closed immediately and this error is never retried.
    #[error("authorization HMAC verification failed")]
    AuthVerificationFailed,

    /// Neither branch of a policy-OR applies, or PCR state does not match
    /// a simple policy. The caller may re-attempt after state changes.
    #[error("policy not satisfied")]
    PolicyNotSatisfied,

    /// A nonce, handle, or other session-management invariant failed
    /// midway through the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The transport collaborator timed out waiting for a response.
    #[error("transport timeout")]
    TransportTimeout,

    /// The transport collaborator failed for a reason other than timeout.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// HKDF output was shorter than the requested key material. A program
    /// error, not a recoverable condition.
    #[error("KDF configuration error: requested key material exceeds output")]
    KdfConfiguration,

    /// The peer's ECDH public key could not be used (e.g. empty/invalid).
    #[error("invalid peer ECDH key")]
    InvalidPeerKey,

    /// An invariant internal to this crate was violated, e.g. an attempt to
    /// exchange on a closed session.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;
