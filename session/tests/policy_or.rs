// SPDX-License-Identifier: MIT
//! Compound policy-OR: an object sealed under `H(branch1, branch2)` can be
//! unsealed by satisfying either branch, and by neither at once.

mod common;

use common::{SealedObject, SimTransport};
use tpm2_proto::{Command, HashAlg, Name, PcrSelection, PcrSelector, ResponseCode, SessionAttributes};
use tpm2_session::{Digest, Error, PolicyEngine, RustCryptoProvider, SaltMaterial, Session, SessionKind};

fn object_name() -> Name {
    Name::from(vec![0x00, 0x0b, 9, 9, 9, 9])
}

fn branch_digests(crypto: &RustCryptoProvider, transport: &mut SimTransport) -> (PcrSelection, PcrSelection, Digest, Digest, Digest) {
    let branch_a_pcrs = PcrSelection::single(PcrSelector::new(HashAlg::Sha256, &[0]));
    let branch_b_pcrs = PcrSelection::single(PcrSelector::new(HashAlg::Sha256, &[1]));

    transport.set_pcr_digest(vec![0x11; HashAlg::Sha256.output_len()]);
    let branch_a = PolicyEngine::build_policy_digest(transport, crypto, &branch_a_pcrs, HashAlg::Sha256).unwrap();

    transport.set_pcr_digest(vec![0x22; HashAlg::Sha256.output_len()]);
    let branch_b = PolicyEngine::build_policy_digest(transport, crypto, &branch_b_pcrs, HashAlg::Sha256).unwrap();

    let combined = PolicyEngine::combine_policy_or(crypto, HashAlg::Sha256, &branch_a, &branch_b);
    (branch_a_pcrs, branch_b_pcrs, branch_a, branch_b, combined)
}

#[test]
fn either_branch_of_a_policy_or_unseals() {
    let crypto = RustCryptoProvider;
    let mut transport = SimTransport::new();
    let (branch_a_pcrs, branch_b_pcrs, branch_a, branch_b, combined) = branch_digests(&crypto, &mut transport);

    let handle = 0x8001_1000;
    transport.add_object(SealedObject {
        handle,
        name: object_name(),
        auth_value: Vec::new(),
        policy_digest: Some(combined.as_bytes().to_vec()),
        payload: b"either branch unlocks this".to_vec(),
    });

    // Branch A is live.
    transport.set_pcr_digest(vec![0x11; HashAlg::Sha256.output_len()]);
    let mut session_a = Session::start(
        &mut transport,
        &crypto,
        SessionKind::Policy,
        None::<SaltMaterial>,
        None,
        tpm2_proto::Algorithm::Null,
        HashAlg::Sha256,
    )
    .unwrap();
    PolicyEngine::satisfy_policy_or(
        &mut transport,
        session_a.handle(),
        &branch_a_pcrs,
        &[branch_a.clone(), branch_b.clone()],
    )
    .unwrap();
    session_a.mark_policy_or_satisfied();

    let (rc, params) = session_a
        .exchange(
            &mut transport,
            &crypto,
            Command::Unseal as u32,
            handle,
            &object_name(),
            b"",
            b"",
            SessionAttributes::ContinueSession,
            None,
        )
        .unwrap();
    assert_eq!(rc, ResponseCode::Success);
    assert_eq!(params, b"either branch unlocks this");

    // Branch B is live instead; a fresh session satisfies the other branch.
    transport.set_pcr_digest(vec![0x22; HashAlg::Sha256.output_len()]);
    let mut session_b = Session::start(
        &mut transport,
        &crypto,
        SessionKind::Policy,
        None::<SaltMaterial>,
        None,
        tpm2_proto::Algorithm::Null,
        HashAlg::Sha256,
    )
    .unwrap();
    PolicyEngine::satisfy_policy_or(&mut transport, session_b.handle(), &branch_b_pcrs, &[branch_a, branch_b]).unwrap();
    session_b.mark_policy_or_satisfied();

    let (rc, params) = session_b
        .exchange(
            &mut transport,
            &crypto,
            Command::Unseal as u32,
            handle,
            &object_name(),
            b"",
            b"",
            SessionAttributes::ContinueSession,
            None,
        )
        .unwrap();
    assert_eq!(rc, ResponseCode::Success);
    assert_eq!(params, b"either branch unlocks this");
}

#[test]
fn neither_branch_live_fails_policy_or() {
    let crypto = RustCryptoProvider;
    let mut transport = SimTransport::new();
    let (branch_a_pcrs, _branch_b_pcrs, branch_a, branch_b, combined) = branch_digests(&crypto, &mut transport);

    let handle = 0x8001_1001;
    transport.add_object(SealedObject {
        handle,
        name: object_name(),
        auth_value: Vec::new(),
        policy_digest: Some(combined.as_bytes().to_vec()),
        payload: b"neither branch reaches this".to_vec(),
    });

    // PCR state matches neither branch.
    transport.set_pcr_digest(vec![0x33; HashAlg::Sha256.output_len()]);
    let session_handle = {
        let session = Session::start(
            &mut transport,
            &crypto,
            SessionKind::Policy,
            None::<SaltMaterial>,
            None,
            tpm2_proto::Algorithm::Null,
            HashAlg::Sha256,
        )
        .unwrap();
        session.handle()
    };

    let err = PolicyEngine::satisfy_policy_or(&mut transport, session_handle, &branch_a_pcrs, &[branch_a, branch_b]).unwrap_err();
    assert!(matches!(err, Error::PolicyNotSatisfied));
}
