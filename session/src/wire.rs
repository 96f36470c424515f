// SPDX-License-Identifier: MIT
//! Minimal TSS2 command/response wire encoding for the handful of TPM
//! commands the session core issues directly: `StartAuthSession`, the
//! policy-shaping commands, and `FlushContext`. `Session::exchange`'s
//! authorized command body is assembled separately, in `session.rs`.

use tpm2_proto::{Algorithm, Command, HashAlg, PcrSelection, Tag};

pub(crate) fn start_auth_session(
    tpm_key: u32,
    bind: u32,
    nonce_caller: &[u8],
    encrypted_salt: &[u8],
    session_type: u8,
    symmetric_alg: Algorithm,
    auth_hash: HashAlg,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend((Command::StartAuthSession as u32).to_be_bytes());
    body.extend(tpm_key.to_be_bytes());
    body.extend(bind.to_be_bytes());
    body.extend((nonce_caller.len() as u16).to_be_bytes());
    body.extend(nonce_caller);
    body.extend((encrypted_salt.len() as u16).to_be_bytes());
    body.extend(encrypted_salt);
    body.push(session_type);

    let symmetric_id = symmetric_alg as u16;
    body.extend(symmetric_id.to_be_bytes());
    if symmetric_id != Algorithm::Null as u16 {
        // TPMT_SYM_DEF carries key bits + mode when the algorithm isn't
        // NULL. The session core only ever negotiates a NULL symmetric
        // parameter set (no parameter encryption), so this is unreachable
        // in practice but kept for protocol completeness.
        body.extend(0u16.to_be_bytes());
        body.extend((Algorithm::Null as u16).to_be_bytes());
    }
    body.extend((Algorithm::from(auth_hash) as u16).to_be_bytes());
    wrap(Tag::NoSessions, &body)
}

pub(crate) fn parse_start_auth_session_response(body: &[u8]) -> Option<(u32, Vec<u8>)> {
    if body.len() < 6 {
        return None;
    }
    let handle = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let nonce_len = u16::from_be_bytes([body[4], body[5]]) as usize;
    if body.len() != 6 + nonce_len {
        return None;
    }
    Some((handle, body[6..6 + nonce_len].to_vec()))
}

pub(crate) fn policy_pcr(
    session_handle: u32,
    pcr_digest: &[u8],
    pcr_selection: &PcrSelection,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend((Command::PolicyPcr as u32).to_be_bytes());
    body.extend(session_handle.to_be_bytes());
    body.extend((pcr_digest.len() as u16).to_be_bytes());
    body.extend(pcr_digest);
    body.extend(pcr_selection.to_wire_bytes());
    wrap(Tag::NoSessions, &body)
}

pub(crate) fn policy_get_digest(session_handle: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend((Command::PolicyGetDigest as u32).to_be_bytes());
    body.extend(session_handle.to_be_bytes());
    wrap(Tag::NoSessions, &body)
}

pub(crate) fn parse_policy_get_digest_response(body: &[u8]) -> Option<Vec<u8>> {
    if body.len() < 2 {
        return None;
    }
    let len = u16::from_be_bytes([body[0], body[1]]) as usize;
    if body.len() != 2 + len {
        return None;
    }
    Some(body[2..2 + len].to_vec())
}

pub(crate) fn policy_or(session_handle: u32, branches: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend((Command::PolicyOR as u32).to_be_bytes());
    body.extend(session_handle.to_be_bytes());
    body.extend((branches.len() as u32).to_be_bytes());
    for branch in branches {
        body.extend((branch.len() as u16).to_be_bytes());
        body.extend(branch);
    }
    wrap(Tag::NoSessions, &body)
}

pub(crate) fn flush_context(handle: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend((Command::FlushContext as u32).to_be_bytes());
    body.extend(handle.to_be_bytes());
    wrap(Tag::NoSessions, &body)
}

/// Prepends a command header: `tag(2) || size(4)`. Six bytes, not the ten a
/// response header carries — a response also has the four-byte
/// `responseCode` that a command has no equivalent of.
fn wrap(tag: Tag, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + body.len());
    out.extend((tag as u16).to_be_bytes());
    out.extend((6u32 + body.len() as u32).to_be_bytes());
    out.extend(body);
    out
}

/// Assembles a single-handle, single-session authorized command: header,
/// command code, the object handle being authorized against, the
/// authorization area, then the already-serialized command parameters.
#[allow(clippy::too_many_arguments)]
pub(crate) fn authorized_command(
    cmd_code: u32,
    object_handle: u32,
    session_handle: u32,
    nonce_caller: &[u8],
    attributes: tpm2_proto::SessionAttributes,
    hmac: &[u8],
    params: &[u8],
) -> Vec<u8> {
    let mut auth_area = Vec::new();
    auth_area.extend(session_handle.to_be_bytes());
    auth_area.extend((nonce_caller.len() as u16).to_be_bytes());
    auth_area.extend(nonce_caller);
    auth_area.push(attributes.bits());
    auth_area.extend((hmac.len() as u16).to_be_bytes());
    auth_area.extend(hmac);

    let mut body = Vec::new();
    body.extend(cmd_code.to_be_bytes());
    body.extend(object_handle.to_be_bytes());
    body.extend((auth_area.len() as u32).to_be_bytes());
    body.extend(&auth_area);
    body.extend(params);
    wrap(Tag::Sessions, &body)
}

/// The authorization area of a parsed response: `nonceTPM`, the session
/// attributes the TPM echoed back, and the response authHMAC.
pub(crate) struct ParsedResponseAuth {
    pub nonce_tpm: Vec<u8>,
    pub attributes: tpm2_proto::SessionAttributes,
    pub hmac: Vec<u8>,
}

/// Splits a `TPM_ST_SESSIONS`-tagged response body (header already
/// stripped by the transport) into `parametersOut` and the authorization
/// area that follows it.
pub(crate) fn parse_authorized_response(body: &[u8]) -> Option<(Vec<u8>, ParsedResponseAuth)> {
    if body.len() < 4 {
        return None;
    }
    let param_size = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
    if body.len() < 4 + param_size {
        return None;
    }
    let params = body[4..4 + param_size].to_vec();
    let auth_area = &body[4 + param_size..];

    if auth_area.len() < 2 {
        return None;
    }
    let nonce_len = u16::from_be_bytes([auth_area[0], auth_area[1]]) as usize;
    let mut offset = 2;
    if auth_area.len() < offset + nonce_len + 1 {
        return None;
    }
    let nonce_tpm = auth_area[offset..offset + nonce_len].to_vec();
    offset += nonce_len;

    let attr_byte = auth_area[offset];
    offset += 1;

    if auth_area.len() < offset + 2 {
        return None;
    }
    let hmac_len = u16::from_be_bytes([auth_area[offset], auth_area[offset + 1]]) as usize;
    offset += 2;
    if auth_area.len() != offset + hmac_len {
        return None;
    }
    let hmac = auth_area[offset..offset + hmac_len].to_vec();

    Some((
        params,
        ParsedResponseAuth {
            nonce_tpm,
            attributes: tpm2_proto::SessionAttributes::from_bits_truncate(attr_byte),
            hmac,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_auth_session_wraps_no_sessions_tag() {
        let cmd = start_auth_session(0, 0, &[1, 2, 3], &[], 0x01, Algorithm::Null, HashAlg::Sha256);
        assert_eq!(&cmd[0..2], &(Tag::NoSessions as u16).to_be_bytes());
    }

    #[test]
    fn round_trips_start_auth_session_response() {
        let body = {
            let mut b = Vec::new();
            b.extend(0x0200_0000u32.to_be_bytes());
            b.extend(4u16.to_be_bytes());
            b.extend([9, 9, 9, 9]);
            b
        };
        let (handle, nonce) = parse_start_auth_session_response(&body).unwrap();
        assert_eq!(handle, 0x0200_0000);
        assert_eq!(nonce, vec![9, 9, 9, 9]);
    }

    #[test]
    fn command_header_size_excludes_response_code() {
        let cmd = flush_context(0x8001_0001);
        let size = u32::from_be_bytes([cmd[2], cmd[3], cmd[4], cmd[5]]);
        assert_eq!(size as usize, cmd.len());
        assert_eq!(cmd.len(), 6 + 4 + 4);
    }

    #[test]
    fn round_trips_authorized_response() {
        let body = {
            let mut b = Vec::new();
            b.extend(3u32.to_be_bytes());
            b.extend([7, 7, 7]);
            b.extend(2u16.to_be_bytes());
            b.extend([1, 2]);
            b.push(0x01);
            b.extend(2u16.to_be_bytes());
            b.extend([3, 4]);
            b
        };
        let (params, auth) = parse_authorized_response(&body).unwrap();
        assert_eq!(params, vec![7, 7, 7]);
        assert_eq!(auth.nonce_tpm, vec![1, 2]);
        assert_eq!(auth.hmac, vec![3, 4]);
    }
}
