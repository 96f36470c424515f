// SPDX-License-Identifier: MIT
//! A tiny in-memory stand-in for a TPM, used only by this crate's
//! integration tests. It understands exactly the wire subset
//! `tpm2-session` emits: `StartAuthSession`, `PolicyPCR`, `PolicyGetDigest`,
//! `PolicyOR`, `FlushContext`, and one authorized command (`Unseal`).

use std::collections::HashMap;
use tpm2_proto::{Command, HashAlg, Name, ResponseCode};
use tpm2_session::{AuthHmac, AuthValue, CryptoProvider, Direction, ParameterHasher, RustCryptoProvider, Transport};

#[derive(Clone)]
pub struct SealedObject {
    pub handle: u32,
    pub name: Name,
    pub auth_value: Vec<u8>,
    pub policy_digest: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

struct LiveSession {
    is_trial: bool,
    auth_hash: HashAlg,
    nonce_tpm: Vec<u8>,
    policy_digest: Vec<u8>,
    /// When set, the next response authHMAC this session computes is
    /// corrupted by one bit, simulating an on-the-wire tamper.
    corrupt_next_response: bool,
}

/// An in-memory TPM simulator. PCR state, sealed objects, and sessions all
/// live here; tests configure it directly instead of going through a wire
/// protocol to set up fixtures.
pub struct SimTransport {
    crypto: RustCryptoProvider,
    next_handle: u32,
    sessions: HashMap<u32, LiveSession>,
    objects: HashMap<u32, SealedObject>,
    pcr_digest: Vec<u8>,
}

impl SimTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            crypto: RustCryptoProvider,
            next_handle: 0x0300_0000,
            sessions: HashMap::new(),
            objects: HashMap::new(),
            pcr_digest: vec![0u8; HashAlg::Sha256.output_len()],
        }
    }

    /// Sets the live PCR-composite digest that `PolicyPCR` checks against.
    pub fn set_pcr_digest(&mut self, digest: Vec<u8>) {
        self.pcr_digest = digest;
    }

    pub fn add_object(&mut self, object: SealedObject) {
        self.objects.insert(object.handle, object);
    }

    /// Corrupts the authHMAC of the very next response any session sends,
    /// to exercise `Session::exchange`'s tamper detection.
    pub fn corrupt_next_response(&mut self, session_handle: u32) {
        if let Some(session) = self.sessions.get_mut(&session_handle) {
            session.corrupt_next_response = true;
        }
    }

    fn alloc_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn send(&mut self, cmd: &[u8]) -> tpm2_session::Result<(Vec<u8>, ResponseCode)> {
        assert!(cmd.len() >= 6, "malformed command header");
        let tag = u16::from_be_bytes([cmd[0], cmd[1]]);
        let body = &cmd[6..];
        let cmd_code = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);

        if tag == 0x8002 {
            return Ok(self.handle_authorized(cmd_code, &body[4..]));
        }

        Ok(match cmd_code {
            c if c == Command::StartAuthSession as u32 => self.handle_start_auth_session(&body[4..]),
            c if c == Command::PolicyPcr as u32 => self.handle_policy_pcr(&body[4..]),
            c if c == Command::PolicyGetDigest as u32 => self.handle_policy_get_digest(&body[4..]),
            c if c == tpm2_proto::CC_POLICY_OR => self.handle_policy_or(&body[4..]),
            c if c == Command::FlushContext as u32 => self.handle_flush_context(&body[4..]),
            _ => (Vec::new(), ResponseCode::Tag),
        })
    }
}

impl SimTransport {
    fn handle_start_auth_session(&mut self, rest: &[u8]) -> (Vec<u8>, ResponseCode) {
        let mut offset = 8; // tpmKey(4) + bind(4), unused by the simulator
        let nonce_len = u16::from_be_bytes([rest[offset], rest[offset + 1]]) as usize;
        offset += 2;
        let nonce_caller = rest[offset..offset + nonce_len].to_vec();
        offset += nonce_len;
        let salt_len = u16::from_be_bytes([rest[offset], rest[offset + 1]]) as usize;
        offset += 2 + salt_len;
        let session_type = rest[offset];
        offset += 1;
        let sym_alg = u16::from_be_bytes([rest[offset], rest[offset + 1]]);
        offset += 2;
        if sym_alg != tpm2_proto::Algorithm::Null as u16 {
            offset += 4;
        }
        let auth_alg = u16::from_be_bytes([rest[offset], rest[offset + 1]]);
        let auth_hash = match tpm2_proto::Algorithm::from_repr(auth_alg) {
            Some(tpm2_proto::Algorithm::Sha1) => HashAlg::Sha1,
            Some(tpm2_proto::Algorithm::Sha256) => HashAlg::Sha256,
            Some(tpm2_proto::Algorithm::Sha384) => HashAlg::Sha384,
            Some(tpm2_proto::Algorithm::Sha512) => HashAlg::Sha512,
            _ => HashAlg::Sha256,
        };

        let handle = self.alloc_handle();
        let nonce_tpm = self.crypto.random_bytes(auth_hash.output_len());
        self.sessions.insert(
            handle,
            LiveSession {
                is_trial: session_type == tpm2_proto::Session::Trial as u8,
                auth_hash,
                nonce_tpm: nonce_tpm.clone(),
                policy_digest: vec![0u8; auth_hash.output_len()],
                corrupt_next_response: false,
            },
        );
        let _ = nonce_caller;

        let mut out = Vec::new();
        out.extend(handle.to_be_bytes());
        out.extend((nonce_tpm.len() as u16).to_be_bytes());
        out.extend(nonce_tpm);
        (out, ResponseCode::Success)
    }

    fn handle_policy_pcr(&mut self, rest: &[u8]) -> (Vec<u8>, ResponseCode) {
        let handle = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let session = self.sessions.get_mut(&handle).expect("unknown session handle");

        let cc = Command::PolicyPcr as u32;
        let mut message = Vec::new();
        message.extend(session.policy_digest.clone());
        message.extend(cc.to_be_bytes());
        // Simplified TPM2_PolicyPCR digest update: fold in the live PCR
        // composite directly, skipping the pcrSelection TPML encoding that
        // a real TPM also mixes in. Sufficient for exercising the
        // satisfied/violated branches this crate's tests care about.
        message.extend(self.pcr_digest.clone());
        session.policy_digest = self.crypto.hash(session.auth_hash, &message).into_bytes();
        (Vec::new(), ResponseCode::Success)
    }

    fn handle_policy_get_digest(&mut self, rest: &[u8]) -> (Vec<u8>, ResponseCode) {
        let handle = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let session = self.sessions.get(&handle).expect("unknown session handle");
        let mut out = Vec::new();
        out.extend((session.policy_digest.len() as u16).to_be_bytes());
        out.extend(session.policy_digest.clone());
        (out, ResponseCode::Success)
    }

    fn handle_policy_or(&mut self, rest: &[u8]) -> (Vec<u8>, ResponseCode) {
        let handle = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let count = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let mut offset = 8;
        let mut branches = Vec::with_capacity(count);
        for _ in 0..count {
            let len = u16::from_be_bytes([rest[offset], rest[offset + 1]]) as usize;
            offset += 2;
            branches.push(rest[offset..offset + len].to_vec());
            offset += len;
        }

        let session = self.sessions.get_mut(&handle).expect("unknown session handle");
        if branches.iter().any(|b| *b == session.policy_digest) {
            session.policy_digest = self
                .crypto
                .hash(
                    session.auth_hash,
                    &branches.iter().flatten().copied().collect::<Vec<u8>>(),
                )
                .into_bytes();
            (Vec::new(), ResponseCode::Success)
        } else {
            (Vec::new(), ResponseCode::Value)
        }
    }

    fn handle_flush_context(&mut self, rest: &[u8]) -> (Vec<u8>, ResponseCode) {
        let handle = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        self.sessions.remove(&handle);
        (Vec::new(), ResponseCode::Success)
    }

    fn handle_authorized(&mut self, cmd_code: u32, rest: &[u8]) -> (Vec<u8>, ResponseCode) {
        let object_handle = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let _auth_size = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let mut offset = 8;
        let session_handle = u32::from_be_bytes([rest[offset], rest[offset + 1], rest[offset + 2], rest[offset + 3]]);
        offset += 4;
        let nonce_len = u16::from_be_bytes([rest[offset], rest[offset + 1]]) as usize;
        offset += 2;
        let nonce_caller = rest[offset..offset + nonce_len].to_vec();
        offset += nonce_len;
        let attributes = tpm2_proto::SessionAttributes::from_bits_truncate(rest[offset]);
        offset += 1;
        let hmac_len = u16::from_be_bytes([rest[offset], rest[offset + 1]]) as usize;
        offset += 2;
        let received_hmac = rest[offset..offset + hmac_len].to_vec();
        offset += hmac_len;
        let params_in = rest[offset..].to_vec();

        let object = self.objects.get(&object_handle).expect("unknown object handle").clone();
        let session = self.sessions.get_mut(&session_handle).expect("unknown session handle");

        if let Some(required_policy) = &object.policy_digest {
            if session.is_trial || &session.policy_digest != required_policy {
                return (Vec::new(), ResponseCode::PolicyFail);
            }
        }

        let entity_auth = AuthValue::derive(&self.crypto, &object.auth_value, session.auth_hash);
        let cp_hash = ParameterHasher::cp_hash(&self.crypto, session.auth_hash, cmd_code, &object.name, &params_in);
        let expected_cmd_hmac = AuthHmac::compute(
            &self.crypto,
            session.auth_hash,
            &[],
            entity_auth.as_bytes(),
            &cp_hash,
            &nonce_caller,
            &session.nonce_tpm,
            attributes,
            Direction::Command,
        );
        if expected_cmd_hmac.as_bytes() != received_hmac.as_slice() {
            return (Vec::new(), ResponseCode::AuthFail);
        }

        let params_out = object.payload.clone();
        let new_nonce_tpm = self.crypto.random_bytes(session.auth_hash.output_len());
        let rp_hash = ParameterHasher::rp_hash(
            &self.crypto,
            session.auth_hash,
            ResponseCode::Success as u32,
            cmd_code,
            &params_out,
        );
        let mut response_hmac = AuthHmac::compute(
            &self.crypto,
            session.auth_hash,
            &[],
            entity_auth.as_bytes(),
            &rp_hash,
            &nonce_caller,
            &new_nonce_tpm,
            attributes,
            Direction::Response,
        )
        .into_bytes();

        if session.corrupt_next_response {
            response_hmac[0] ^= 0xFF;
            session.corrupt_next_response = false;
        }
        session.nonce_tpm = new_nonce_tpm.clone();

        let mut body = Vec::new();
        body.extend((params_out.len() as u32).to_be_bytes());
        body.extend(&params_out);
        body.extend((new_nonce_tpm.len() as u16).to_be_bytes());
        body.extend(&new_nonce_tpm);
        body.push(attributes.bits());
        body.extend((response_hmac.len() as u16).to_be_bytes());
        body.extend(&response_hmac);
        (body, ResponseCode::Success)
    }
}
