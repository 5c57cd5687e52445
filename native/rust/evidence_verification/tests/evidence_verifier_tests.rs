// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use evidence_verification::{
    CommonNameProfile, EvidenceOutcome, EvidenceRecord, EvidenceStage, EvidenceTimestamp, EvidenceVerifier, MessagePart,
    SignatureDocument, SignedReference, SignerIdentity, SigningCertificateProfile, StageResultKind,
    TimestampCoverage, TimestampManifest, VerificationRequest, HASH_CHAIN_RESULT_URI, HASH_CHAIN_URI,
};
use evidence_verification_certificates::{CertStatus, JsonOcspResponseDecoder, OcspResponse};
use evidence_verification_core::crypto::ECDSA_WITH_SHA256_OID;
use evidence_verification_core::{Certificate, DigestMethod, DigestValue, ErrorKind, TrustConfiguration, VerifyResult};
use evidence_verification_hashchain::{AbstractValue, HashChain, HashChainResult, InMemoryResolver};
use evidence_verification_test_utils::{
    single_input_hash_chain, timestamp_token, CertBuilder, OcspResponseBuilder, TestCert, TestPki, AT, INSTANCE,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const MESSAGE_URI: &str = "/message";
const ATTACHMENT_URI: &str = "/attachment1";

fn sha256(data: &[u8]) -> DigestValue {
    DigestValue::compute(DigestMethod::Sha256, data)
}

fn expected_signer() -> SignerIdentity {
    SignerIdentity::member(INSTANCE, "GOV", "70000001")
}

fn verifier(pki: &TestPki) -> EvidenceVerifier {
    EvidenceVerifier::new(Arc::new(pki.configuration().build()))
}

/// Signs `signed_info` with `signer` and attaches a good OCSP response from the root.
fn signed_document(
    pki: &TestPki,
    signer: &TestCert,
    signed_info: Vec<u8>,
    references: Vec<SignedReference>,
) -> SignatureDocument {
    let signature_value = signer.sign(&signed_info);
    SignatureDocument {
        signing_certificate: Some(signer.certificate.clone()),
        signature_algorithm_oid: ECDSA_WITH_SHA256_OID.to_string(),
        signed_info,
        signature_value,
        references,
        ocsp_responses: vec![OcspResponseBuilder::new(&signer.certificate, &pki.root.certificate).sign(&pki.root)],
        ..Default::default()
    }
}

fn signature_timestamp(pki: &TestPki, signature: &SignatureDocument) -> EvidenceTimestamp {
    EvidenceTimestamp {
        token: timestamp_token(&signature.signature_value, &pki.tsa, AT - 30),
        coverage: TimestampCoverage::SignatureValue,
    }
}

/// A batch record: the signature covers a hash chain result over one message.
fn batch_record(pki: &TestPki) -> EvidenceRecord {
    let message = sha256(b"<message>batch</message>");
    let (result, chain) = single_input_hash_chain(HASH_CHAIN_URI, MESSAGE_URI, &message);
    let result_bytes = result.to_json_vec().unwrap();

    let reference = SignedReference {
        uri: HASH_CHAIN_RESULT_URI.to_string(),
        digest: sha256(&result_bytes),
    };
    let signed_info = [b"signed-info:".as_slice(), reference.digest.value()].concat();
    let signature = signed_document(pki, &pki.signer, signed_info, vec![reference]);

    EvidenceRecord {
        timestamps: vec![signature_timestamp(pki, &signature)],
        signature,
        hash_chain_result: Some(result_bytes),
        hash_chains: BTreeMap::from([(HASH_CHAIN_URI.to_string(), chain.to_json_vec().unwrap())]),
        parts: vec![MessagePart {
            name: MESSAGE_URI.to_string(),
            digest: message,
        }],
    }
}

/// A record whose signature references each message part directly.
fn single_record(pki: &TestPki) -> EvidenceRecord {
    let parts = vec![
        MessagePart {
            name: MESSAGE_URI.to_string(),
            digest: sha256(b"<message>single</message>"),
        },
        MessagePart {
            name: ATTACHMENT_URI.to_string(),
            digest: sha256(b"attachment"),
        },
    ];
    let references: Vec<SignedReference> = parts
        .iter()
        .map(|p| SignedReference {
            uri: p.name.clone(),
            digest: p.digest.clone(),
        })
        .collect();
    let signed_info = references.iter().flat_map(|r| r.digest.value().to_vec()).collect();
    let signature = signed_document(pki, &pki.signer, signed_info, references);

    EvidenceRecord {
        timestamps: vec![signature_timestamp(pki, &signature)],
        signature,
        parts,
        ..Default::default()
    }
}

fn rejected_at(verifier: &EvidenceVerifier, record: &EvidenceRecord, at: i64) -> (EvidenceStage, ErrorKind) {
    let signer = expected_signer();
    let result = verifier.evaluate(&VerificationRequest::new(record, &signer, at));
    match &result.outcome {
        EvidenceOutcome::Rejected { stage, error } => {
            assert_eq!(result.stage(*stage), StageResultKind::Failure);
            (*stage, error.kind())
        }
        EvidenceOutcome::Accepted(_) => panic!("record was accepted"),
    }
}

fn rejected(verifier: &EvidenceVerifier, record: &EvidenceRecord) -> (EvidenceStage, ErrorKind) {
    rejected_at(verifier, record, AT)
}

fn rewrite_chain(record: &mut EvidenceRecord, edit: impl FnOnce(&mut HashChain)) {
    let bytes = &record.hash_chains[HASH_CHAIN_URI];
    let mut chain = HashChain::from_json_slice(bytes).unwrap();
    edit(&mut chain);
    record.hash_chains.insert(HASH_CHAIN_URI.to_string(), chain.to_json_vec().unwrap());
}

#[test]
fn batch_record_is_accepted() {
    let pki = TestPki::new();
    let record = batch_record(&pki);
    let signer = expected_signer();

    let evidence = verifier(&pki)
        .verify(&VerificationRequest::new(&record, &signer, AT))
        .unwrap();

    assert!(evidence.batch);
    assert_eq!(evidence.signing_certificate, pki.signer.certificate);
    assert_eq!(evidence.signing_ocsp_response.as_ref(), record.signature.ocsp_responses.first());
    assert_eq!(evidence.cert_path.trust_anchor(), Some(&pki.root.certificate));
    assert_eq!(evidence.timestamp_times, vec![AT - 30]);
}

#[test]
fn every_stage_succeeds_for_a_batch_record() {
    let pki = TestPki::new();
    let record = batch_record(&pki);
    let signer = expected_signer();

    let result = verifier(&pki).evaluate(&VerificationRequest::new(&record, &signer, AT));
    assert!(result.outcome.is_accepted());
    assert!(result.outcome.error().is_none());
    assert_eq!(result.stages.len(), EvidenceStage::ALL.len());
    for stage in EvidenceStage::ALL {
        assert_eq!(result.stage(stage), StageResultKind::Success, "stage {}", stage.name());
    }
}

#[test]
fn single_record_is_accepted_without_hash_chain() {
    let pki = TestPki::new();
    let record = single_record(&pki);
    let signer = expected_signer();

    let result = verifier(&pki).evaluate(&VerificationRequest::new(&record, &signer, AT));
    assert!(result.outcome.is_accepted());
    assert_eq!(result.stage(EvidenceStage::HashChain), StageResultKind::NotApplicable);
    assert_eq!(result.stage(EvidenceStage::CertificateChain), StageResultKind::Success);

    let evidence = result.outcome.into_result().unwrap();
    assert!(!evidence.batch);
}

#[test]
fn corrupted_hash_chain_digest_is_rejected_first() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    rewrite_chain(&mut record, |chain| {
        if let AbstractValue::DataRef(data_ref) = &mut chain.hash_steps[0].values[0] {
            data_ref.digest_value[0] ^= 0x01;
        }
    });
    // Later stages would fail too; only the hash chain stage may run.
    record.signature.ocsp_responses.clear();

    let signer = expected_signer();
    let result = verifier(&pki).evaluate(&VerificationRequest::new(&record, &signer, AT));
    assert_eq!(result.outcome.error().map(|e| e.kind()), Some(ErrorKind::DigestMismatch));
    assert_eq!(result.stage(EvidenceStage::HashChain), StageResultKind::Failure);
    for stage in &EvidenceStage::ALL[1..] {
        assert_eq!(result.stage(*stage), StageResultKind::NotApplicable);
    }
}

#[test]
fn corrupted_hash_chain_result_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    let mut result = HashChainResult::from_json_slice(record.hash_chain_result.as_deref().unwrap()).unwrap();
    result.digest_value[31] ^= 0x80;
    record.hash_chain_result = Some(result.to_json_vec().unwrap());

    assert_eq!(rejected(&verifier(&pki), &record), (EvidenceStage::HashChain, ErrorKind::DigestMismatch));
}

#[test]
fn hash_chain_input_not_in_chain_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    record.parts.push(MessagePart {
        name: ATTACHMENT_URI.to_string(),
        digest: sha256(b"attachment"),
    });

    assert_eq!(rejected(&verifier(&pki), &record), (EvidenceStage::HashChain, ErrorKind::UnusedInput));
}

#[test]
fn hash_chain_document_can_come_from_the_caller() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    let chain = record.hash_chains.remove(HASH_CHAIN_URI).unwrap();
    let signer = expected_signer();

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::HashChain, ErrorKind::UnresolvedReference)
    );

    let resolver = InMemoryResolver::new().with_entry(HASH_CHAIN_URI, chain);
    let request = VerificationRequest::new(&record, &signer, AT).with_resolver(&resolver);
    assert!(verifier(&pki).verify(&request).is_ok());
}

#[test]
fn reserialized_hash_chain_result_breaks_the_signed_reference() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    // Still a valid hash chain result, but no longer the signed bytes.
    if let Some(bytes) = record.hash_chain_result.as_mut() {
        bytes.push(b' ');
    }

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::SignatureValue, ErrorKind::InvalidSignatureValue)
    );
}

#[test]
fn missing_signing_certificate_is_malformed() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    record.signature.signing_certificate = None;

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::SigningCertificate, ErrorKind::MalformedSignature)
    );
    let err = EvidenceVerifier::signing_certificate(&record).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);
}

#[test]
fn certificate_without_non_repudiation_is_not_a_signing_certificate() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    record.signature.signing_certificate = Some(pki.tsa.certificate.clone());

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::SigningCertificate, ErrorKind::MalformedSignature)
    );
}

#[test]
fn signer_name_must_match_the_certificate() {
    let pki = TestPki::new();
    let record = batch_record(&pki);
    let verifier = verifier(&pki);

    for expected in [
        SignerIdentity::member(INSTANCE, "GOV", "70000002"),
        SignerIdentity::member(INSTANCE, "COM", "70000001"),
        SignerIdentity::member("FI", "GOV", "70000001"),
        expected_signer().with_subsystem("registry"),
    ] {
        let result = verifier.evaluate(&VerificationRequest::new(&record, &expected, AT));
        assert_eq!(
            result.outcome.error().map(|e| e.kind()),
            Some(ErrorKind::SignerIdentityMismatch),
            "expected signer {expected}"
        );
        assert_eq!(result.stage(EvidenceStage::SignerName), StageResultKind::Failure);
    }
}

#[test]
fn tampered_signed_info_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    record.signature.signed_info.push(0);

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::SignatureValue, ErrorKind::InvalidSignatureValue)
    );
}

#[test]
fn single_record_must_reference_every_part() {
    let pki = TestPki::new();
    let mut record = single_record(&pki);
    record.parts.push(MessagePart {
        name: "/attachment2".to_string(),
        digest: sha256(b"second attachment"),
    });

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::SignatureValue, ErrorKind::UnusedInput)
    );
}

#[test]
fn single_record_reference_to_a_missing_part_is_unresolved() {
    let pki = TestPki::new();
    let mut record = single_record(&pki);
    record.parts.retain(|p| p.name != ATTACHMENT_URI);

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::SignatureValue, ErrorKind::UnresolvedReference)
    );
}

#[test]
fn single_record_part_digest_must_match_the_reference() {
    let pki = TestPki::new();
    let mut record = single_record(&pki);
    record.parts[0].digest = sha256(b"<message>tampered</message>");

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::SignatureValue, ErrorKind::InvalidSignatureValue)
    );
}

#[test]
fn timestamp_over_other_bytes_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    record.timestamps[0].token = timestamp_token(b"something else", &pki.tsa, AT);

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::Timestamps, ErrorKind::TimestampImprintMismatch)
    );
}

#[test]
fn timestamp_from_untrusted_authority_is_rejected() {
    let pki = TestPki::new();
    let record = batch_record(&pki);
    let config = TrustConfiguration::builder()
        .with_ca_certificate(INSTANCE, pki.root.certificate.clone())
        .build();

    assert_eq!(
        rejected(&EvidenceVerifier::new(Arc::new(config)), &record),
        (EvidenceStage::Timestamps, ErrorKind::TimestampSignerNotFound)
    );
}

#[test]
fn manifest_timestamp_is_accepted() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    add_manifest_timestamp(&pki, &mut record);
    let signer = expected_signer();

    let evidence = verifier(&pki)
        .verify(&VerificationRequest::new(&record, &signer, AT))
        .unwrap();
    assert_eq!(evidence.timestamp_times, vec![AT - 30, AT - 20]);
}

#[test]
fn manifest_reference_mismatch_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    add_manifest_timestamp(&pki, &mut record);
    record
        .signature
        .id_objects
        .insert("signature-value".to_string(), b"other signature value".to_vec());

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::Timestamps, ErrorKind::DigestMismatch)
    );
}

#[test]
fn manifest_timestamp_without_manifest_is_unresolved() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    add_manifest_timestamp(&pki, &mut record);
    record.signature.timestamp_manifests.clear();

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::Timestamps, ErrorKind::UnresolvedReference)
    );
}

#[test]
fn manifest_over_another_signature_value_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    record.timestamps.clear();

    let foreign = b"signature value of some other record".to_vec();
    let manifest_bytes = [b"manifest:".as_slice(), &foreign].concat();
    let signature = &mut record.signature;
    signature.id_objects.insert("signature-value".to_string(), foreign.clone());
    signature.id_objects.insert("ts-manifest".to_string(), manifest_bytes.clone());
    signature.timestamp_manifests.push(TimestampManifest {
        id: "ts-manifest".to_string(),
        references: vec![SignedReference {
            uri: "#signature-value".to_string(),
            digest: sha256(&foreign),
        }],
    });
    record.timestamps.push(EvidenceTimestamp {
        token: timestamp_token(&manifest_bytes, &pki.tsa, AT - 20),
        coverage: TimestampCoverage::Manifest {
            id: "ts-manifest".to_string(),
        },
    });

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::Timestamps, ErrorKind::DigestMismatch)
    );
}

#[test]
fn signing_certificate_is_extracted() {
    let pki = TestPki::new();
    let record = batch_record(&pki);
    assert_eq!(EvidenceVerifier::signing_certificate(&record), Ok(pki.signer.certificate.clone()));

    let mut unusable = record.clone();
    unusable.signature.signing_certificate = Some(pki.ocsp_responder.certificate.clone());
    let err = EvidenceVerifier::signing_certificate(&unusable).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);
}

#[test]
fn relabeled_ocsp_status_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    let builder = pki.signer_ocsp().status(CertStatus::Revoked {
        revocation_time: AT - 3600,
        reason: None,
    });
    let mut data = builder.data(&pki.root);
    let revoked = builder.sign(&pki.root);
    data.status = CertStatus::Good;
    record.signature.ocsp_responses = vec![OcspResponse::new(
        JsonOcspResponseDecoder::encode(&data).unwrap(),
        revoked.signature_algorithm_oid(),
        revoked.signature().to_vec(),
        Vec::new(),
    )];

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::CertificateChain, ErrorKind::OcspBadSignature)
    );
}

#[test]
fn revoked_signing_certificate_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    record.signature.ocsp_responses = vec![pki
        .signer_ocsp()
        .status(CertStatus::Revoked {
            revocation_time: AT - 3600,
            reason: Some(1),
        })
        .sign(&pki.root)];

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::CertificateChain, ErrorKind::OcspRevoked)
    );
}

#[test]
fn missing_ocsp_response_is_rejected() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    record.signature.ocsp_responses.clear();

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::CertificateChain, ErrorKind::OcspResponseNotFound)
    );
}

#[test]
fn ocsp_response_too_old_for_the_verification_date_is_stale() {
    let pki = TestPki::new();
    let record = batch_record(&pki);

    assert_eq!(
        rejected_at(&verifier(&pki), &record, AT + 7200),
        (EvidenceStage::CertificateChain, ErrorKind::OcspStale)
    );
}

#[test]
fn untrusted_signing_certificate_fails_to_chain() {
    let pki = TestPki::new();
    let other_root = CertBuilder::new("Other Root").ca().self_signed();
    let impostor = CertBuilder::new("EE/GOV/70000001").signing().signed_by(&other_root);
    let mut record = batch_record(&pki);
    let signed_info = record.signature.signed_info.clone();
    record.signature = SignatureDocument {
        signing_certificate: Some(impostor.certificate.clone()),
        signature_value: impostor.sign(&signed_info),
        ocsp_responses: vec![
            OcspResponseBuilder::new(&impostor.certificate, &other_root.certificate).sign(&other_root),
        ],
        ..record.signature.clone()
    };
    record.timestamps = vec![signature_timestamp(&pki, &record.signature)];

    assert_eq!(
        rejected(&verifier(&pki), &record),
        (EvidenceStage::CertificateChain, ErrorKind::ChainBuildFailure)
    );
}

#[test]
fn signing_ocsp_response_is_located() {
    let pki = TestPki::new();
    let mut record = batch_record(&pki);
    let unrelated: OcspResponse = OcspResponseBuilder::new(&pki.tsa.certificate, &pki.root.certificate).sign(&pki.root);
    record.signature.ocsp_responses.insert(0, unrelated);

    let verifier = verifier(&pki);
    let found = verifier.signing_ocsp_response(&record, INSTANCE).unwrap();
    assert_eq!(found.as_ref(), record.signature.ocsp_responses.get(1));
    assert_eq!(verifier.signing_ocsp_response(&record, "FI").unwrap(), None);
}

#[test]
fn ocsp_validation_is_cached_across_records() {
    let pki = TestPki::new();
    let record = batch_record(&pki);
    let signer = expected_signer();
    let verifier = verifier(&pki);
    assert!(verifier.ocsp_cache().is_empty());

    verifier.verify(&VerificationRequest::new(&record, &signer, AT)).unwrap();
    verifier.verify(&VerificationRequest::new(&record, &signer, AT + 60)).unwrap();
    assert_eq!(verifier.ocsp_cache().len(), 1);

    // A verifier for a newer snapshot can share the cache.
    let next = EvidenceVerifier::new(Arc::new(pki.configuration().build()))
        .with_ocsp_cache(verifier.ocsp_cache().clone());
    next.verify(&VerificationRequest::new(&record, &signer, AT)).unwrap();
    assert_eq!(next.configuration().generation(), verifier.configuration().generation());
    assert_eq!(verifier.ocsp_cache().len(), 1);
}

/// Maps every certificate to one organization identity.
struct FixedProfile(SignerIdentity);

impl SigningCertificateProfile for FixedProfile {
    fn subject_identity(&self, _instance: &str, _cert: &Certificate) -> VerifyResult<SignerIdentity> {
        Ok(self.0.clone())
    }
}

#[test]
fn signing_certificate_profile_is_pluggable() {
    let pki = TestPki::new();
    let organization = CertBuilder::new("Acme Ltd").signing().signed_by(&pki.root);
    let identity = SignerIdentity::member(INSTANCE, "COM", "acme");
    let signed_info = b"signed-info".to_vec();
    let signature = signed_document(&pki, &organization, signed_info, Vec::new());
    let record = EvidenceRecord {
        timestamps: vec![signature_timestamp(&pki, &signature)],
        signature,
        ..Default::default()
    };

    let default_profile = verifier(&pki).with_profile(Arc::new(CommonNameProfile));
    let result = default_profile.evaluate(&VerificationRequest::new(&record, &identity, AT));
    assert_eq!(result.outcome.error().map(|e| e.kind()), Some(ErrorKind::SignerIdentityMismatch));

    let custom = verifier(&pki).with_profile(Arc::new(FixedProfile(identity.clone())));
    assert!(custom.verify(&VerificationRequest::new(&record, &identity, AT)).is_ok());
}

fn add_manifest_timestamp(pki: &TestPki, record: &mut EvidenceRecord) {
    let signature = &mut record.signature;
    let manifest_bytes = [b"manifest:".as_slice(), &signature.signature_value].concat();
    signature
        .id_objects
        .insert("signature-value".to_string(), signature.signature_value.clone());
    signature.id_objects.insert("ts-manifest".to_string(), manifest_bytes.clone());
    signature.timestamp_manifests.push(TimestampManifest {
        id: "ts-manifest".to_string(),
        references: vec![SignedReference {
            uri: "#signature-value".to_string(),
            digest: sha256(&signature.signature_value),
        }],
    });
    record.timestamps.push(EvidenceTimestamp {
        token: timestamp_token(&manifest_bytes, &pki.tsa, AT - 20),
        coverage: TimestampCoverage::Manifest {
            id: "ts-manifest".to_string(),
        },
    });
}
