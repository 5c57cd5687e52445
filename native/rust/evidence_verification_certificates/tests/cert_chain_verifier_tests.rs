// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use evidence_verification_certificates::{
    CertChain, CertChainVerifier, CertChainVerifyOptions, CertStatus, OcspResponse, OcspVerifier,
};
use evidence_verification_core::{ErrorKind, TrustConfiguration};
use evidence_verification_test_utils::{CertBuilder, OcspResponseBuilder, TestCert, TestPki, AT, INSTANCE};
use std::sync::Arc;

fn chain_verifier(config: &Arc<TrustConfiguration>) -> CertChainVerifier {
    CertChainVerifier::new(Arc::new(OcspVerifier::new(config.clone())))
}

fn ocsp(subject: &TestCert, issuer: &TestCert) -> OcspResponse {
    OcspResponseBuilder::new(&subject.certificate, &issuer.certificate)
        .embed(&issuer.certificate)
        .sign(issuer)
}

#[test]
fn direct_chain_with_ocsp_verifies() {
    let pki = TestPki::new();
    let config = Arc::new(pki.configuration().build());
    let chain = CertChain::create(&config, INSTANCE, pki.signer.certificate.clone(), &[]).unwrap();
    assert_eq!(chain.trust_anchor(), &pki.root.certificate);

    let response = pki.signer_ocsp().sign(&pki.root);
    let path = chain_verifier(&config).verify(&chain, &[response.clone()], AT).unwrap();

    assert_eq!(path.certificates.len(), 2);
    assert_eq!(path.end_entity(), Some(&pki.signer.certificate));
    assert_eq!(path.trust_anchor(), Some(&pki.root.certificate));
    assert_eq!(path.ocsp_responses, vec![response]);
}

#[test]
fn chain_through_intermediate_verifies() {
    let pki = TestPki::new();
    let intermediate = CertBuilder::new("Test Intermediate CA").ca().signed_by(&pki.root);
    let leaf = CertBuilder::new("EE/COM/12345").signing().signed_by(&intermediate);
    let config = Arc::new(pki.configuration().build());

    let chain = CertChain::create(
        &config,
        INSTANCE,
        leaf.certificate.clone(),
        &[intermediate.certificate.clone(), pki.tsa.certificate.clone()],
    )
    .unwrap();
    let responses = [ocsp(&intermediate, &pki.root), ocsp(&leaf, &intermediate)];

    let path = chain_verifier(&config).verify(&chain, &responses, AT).unwrap();
    assert_eq!(
        path.certificates,
        vec![leaf.certificate.clone(), intermediate.certificate.clone(), pki.root.certificate.clone()]
    );
    // Ordered by path position, not by input order.
    assert_eq!(path.ocsp_responses, vec![responses[1].clone(), responses[0].clone()]);
}

#[test]
fn missing_ocsp_response_is_rejected() {
    let pki = TestPki::new();
    let intermediate = CertBuilder::new("Test Intermediate CA").ca().signed_by(&pki.root);
    let leaf = CertBuilder::new("EE/COM/12345").signing().signed_by(&intermediate);
    let config = Arc::new(pki.configuration().build());
    let chain =
        CertChain::create(&config, INSTANCE, leaf.certificate.clone(), &[intermediate.certificate.clone()]).unwrap();

    let err = chain_verifier(&config)
        .verify(&chain, &[ocsp(&leaf, &intermediate)], AT)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OcspResponseNotFound);
}

#[test]
fn revoked_certificate_on_path_is_rejected() {
    let pki = TestPki::new();
    let config = Arc::new(pki.configuration().build());
    let chain = CertChain::create(&config, INSTANCE, pki.signer.certificate.clone(), &[]).unwrap();
    let response = pki
        .signer_ocsp()
        .status(CertStatus::Revoked {
            revocation_time: AT - 10,
            reason: None,
        })
        .sign(&pki.root);

    let err = chain_verifier(&config).verify(&chain, &[response], AT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OcspRevoked);
}

#[test]
fn expired_or_not_yet_valid_certificates_are_invalid() {
    let pki = TestPki::new();
    let config = Arc::new(pki.configuration().build());

    for builder in [
        CertBuilder::new("EE/GOV/1").validity((2020, 1, 1), (2021, 1, 1)),
        CertBuilder::new("EE/GOV/2").validity((2030, 1, 1), (2031, 1, 1)),
    ] {
        let leaf = builder.signing().signed_by(&pki.root);
        let chain = CertChain::create(&config, INSTANCE, leaf.certificate.clone(), &[]).unwrap();
        let err = chain_verifier(&config).verify_chain_only(&chain, AT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChainInvalid);
    }
}

#[test]
fn archived_evidence_is_checked_at_its_own_date() {
    let pki = TestPki::new();
    let config = Arc::new(pki.configuration().build());
    let leaf = CertBuilder::new("EE/GOV/1")
        .validity((2024, 1, 1), (2025, 1, 1))
        .signing()
        .signed_by(&pki.root);
    let chain = CertChain::create(&config, INSTANCE, leaf.certificate.clone(), &[]).unwrap();

    // 2024-06-01
    assert!(chain_verifier(&config).verify_chain_only(&chain, 1_717_200_000).is_ok());
    assert!(chain_verifier(&config).verify_chain_only(&chain, AT).is_err());
}

#[test]
fn non_ca_issuer_is_invalid() {
    let pki = TestPki::new();
    let config = Arc::new(pki.configuration().build());
    let leaf = CertBuilder::new("EE/GOV/3").signing().signed_by(&pki.signer);
    let chain =
        CertChain::create(&config, INSTANCE, leaf.certificate.clone(), &[pki.signer.certificate.clone()]).unwrap();

    let err = chain_verifier(&config).verify_chain_only(&chain, AT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainInvalid);
}

#[test]
fn path_length_constraint_is_enforced() {
    let root = CertBuilder::new("Constrained Root").ca_with_path_len(0).self_signed();
    let intermediate = CertBuilder::new("Intermediate").ca().signed_by(&root);
    let leaf = CertBuilder::new("EE/GOV/4").signing().signed_by(&intermediate);
    let direct = CertBuilder::new("EE/GOV/5").signing().signed_by(&root);
    let config = Arc::new(TrustConfiguration::builder().with_ca_certificate(INSTANCE, root.certificate.clone()).build());

    let chain =
        CertChain::create(&config, INSTANCE, leaf.certificate.clone(), &[intermediate.certificate.clone()]).unwrap();
    let err = chain_verifier(&config).verify_chain_only(&chain, AT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainInvalid);

    let chain = CertChain::create(&config, INSTANCE, direct.certificate.clone(), &[]).unwrap();
    assert!(chain_verifier(&config).verify_chain_only(&chain, AT).is_ok());
}

#[test]
fn certificate_without_configured_anchor_cannot_be_chained() {
    let pki = TestPki::new();
    let other_root = CertBuilder::new("Other Root").ca().self_signed();
    let leaf = CertBuilder::new("EE/GOV/6").signing().signed_by(&other_root);
    let config = pki.configuration().build();

    let err = CertChain::create(&config, INSTANCE, leaf.certificate.clone(), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainBuildFailure);

    let err = CertChain::create(&config, "FI", pki.signer.certificate.clone(), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainBuildFailure);
}

#[test]
fn issuer_with_matching_name_but_wrong_key_is_invalid() {
    let pki = TestPki::new();
    let impostor = CertBuilder::new("Test Root CA").ca().self_signed();
    let config = Arc::new(pki.configuration().build());
    let chain = CertChain::new(INSTANCE, impostor.certificate.clone(), pki.signer.certificate.clone(), Vec::new());

    let err = chain_verifier(&config).verify_chain_only(&chain, AT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainInvalid);
}

#[test]
fn unrelated_anchor_fails_to_build() {
    let pki = TestPki::new();
    let stranger = CertBuilder::new("Stranger").ca().self_signed();
    let config = Arc::new(pki.configuration().build());
    let chain = CertChain::new(INSTANCE, stranger.certificate.clone(), pki.signer.certificate.clone(), Vec::new());

    let err = chain_verifier(&config).verify_chain_only(&chain, AT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainBuildFailure);
}

#[test]
fn anchor_as_end_entity_is_invalid() {
    let pki = TestPki::new();
    let config = Arc::new(pki.configuration().build());
    let chain = CertChain::new(INSTANCE, pki.root.certificate.clone(), pki.root.certificate.clone(), Vec::new());

    let err = chain_verifier(&config).verify_chain_only(&chain, AT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainInvalid);
}

#[test]
fn path_longer_than_max_depth_fails_to_build() {
    let pki = TestPki::new();
    let intermediate = CertBuilder::new("Test Intermediate CA").ca().signed_by(&pki.root);
    let leaf = CertBuilder::new("EE/COM/12345").signing().signed_by(&intermediate);
    let config = Arc::new(pki.configuration().build());
    let chain =
        CertChain::create(&config, INSTANCE, leaf.certificate.clone(), &[intermediate.certificate.clone()]).unwrap();

    let verifier = chain_verifier(&config).with_options(CertChainVerifyOptions { max_depth: 1 });
    let err = verifier.verify_chain_only(&chain, AT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainBuildFailure);
}

#[test]
fn dead_end_intermediate_is_backed_out() {
    let pki = TestPki::new();
    let other_root = CertBuilder::new("Other Root CA").ca().self_signed();
    let intermediate = CertBuilder::new("Test Intermediate CA").ca().signed_by(&pki.root);
    // Same name and key as `intermediate`, but issued by a root the chain cannot reach.
    let cross_signed = CertBuilder::new("Test Intermediate CA")
        .ca()
        .signed_by_with_key_of(&intermediate, &other_root);
    let leaf = CertBuilder::new("EE/COM/12345").signing().signed_by(&intermediate);
    let config = Arc::new(pki.configuration().build());

    let chain = CertChain::new(
        INSTANCE,
        pki.root.certificate.clone(),
        leaf.certificate.clone(),
        vec![cross_signed.certificate.clone(), intermediate.certificate.clone()],
    );
    let path = chain_verifier(&config).verify_chain_only(&chain, AT).unwrap();
    assert_eq!(
        path.certificates,
        vec![leaf.certificate.clone(), intermediate.certificate.clone(), pki.root.certificate.clone()]
    );

    let dead_end_only = CertChain::new(
        INSTANCE,
        pki.root.certificate.clone(),
        leaf.certificate.clone(),
        vec![cross_signed.certificate.clone()],
    );
    let err = chain_verifier(&config).verify_chain_only(&dead_end_only, AT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainBuildFailure);
}
