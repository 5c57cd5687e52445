// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use base64::Engine as _;
use evidence_verification_core::config::{
    DEFAULT_OCSP_CACHE_MAX_ENTRIES, DEFAULT_OCSP_CACHE_PERIOD_SECONDS, DEFAULT_OCSP_FRESHNESS_SECONDS,
};
use evidence_verification_core::{ConfigError, ErrorKind, TrustConfiguration, TrustConfigurationHandle, VerifyError};
use evidence_verification_test_utils::{CertBuilder, TestPki, INSTANCE};
use std::time::Duration;

fn b64(der: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(der)
}

#[test]
fn builder_defaults() {
    let config = TrustConfiguration::builder().build();
    assert_eq!(config.ocsp_freshness_seconds(), DEFAULT_OCSP_FRESHNESS_SECONDS);
    assert!(config.verify_ocsp_next_update());
    assert_eq!(config.ocsp_cache_period(), Duration::from_secs(DEFAULT_OCSP_CACHE_PERIOD_SECONDS));
    assert_eq!(config.ocsp_cache_max_entries(), DEFAULT_OCSP_CACHE_MAX_ENTRIES);
    assert_eq!(config.generation(), 0);
    assert!(config.ca_certificates(INSTANCE).is_empty());
}

#[test]
fn cache_period_is_clamped() {
    let config = TrustConfiguration::builder().with_ocsp_cache_period_seconds(600).build();
    assert_eq!(config.ocsp_cache_period(), Duration::from_secs(180));

    let config = TrustConfiguration::builder().with_ocsp_cache_period_seconds(0).build();
    assert_eq!(config.ocsp_cache_period(), Duration::ZERO);
}

#[test]
fn trust_anchor_is_found_directly_and_through_intermediates() {
    let pki = TestPki::new();
    let intermediate = CertBuilder::new("Test Intermediate CA").ca().signed_by(&pki.root);
    let leaf = CertBuilder::new("EE/COM/12345").signing().signed_by(&intermediate);
    let config = pki.configuration().build();

    let anchor = config.find_trust_anchor(INSTANCE, &pki.signer.certificate, &[]);
    assert_eq!(anchor, Some(&pki.root.certificate));

    assert_eq!(config.find_trust_anchor(INSTANCE, &leaf.certificate, &[]), None);
    let anchor = config.find_trust_anchor(INSTANCE, &leaf.certificate, &[intermediate.certificate.clone()]);
    assert_eq!(anchor, Some(&pki.root.certificate));

    assert_eq!(config.find_trust_anchor("FI", &pki.signer.certificate, &[]), None);
}

#[test]
fn unrelated_self_signed_certificate_has_no_anchor() {
    let pki = TestPki::new();
    let stranger = CertBuilder::new("Stranger").ca().self_signed();
    let config = pki.configuration().build();
    assert_eq!(config.find_trust_anchor(INSTANCE, &stranger.certificate, &[]), None);
}

#[test]
fn ocsp_responder_associations() {
    let pki = TestPki::new();
    let config = pki
        .configuration()
        .with_ocsp_responder(INSTANCE, pki.root.certificate.clone(), pki.ocsp_responder.certificate.clone())
        .build();

    assert!(config.is_authorized_ocsp_responder(&pki.root.certificate, &pki.ocsp_responder.certificate));
    assert!(!config.is_authorized_ocsp_responder(&pki.root.certificate, &pki.tsa.certificate));
    assert_eq!(config.ocsp_responder_certificates().count(), 1);
}

#[test]
fn loads_json_configuration() {
    let pki = TestPki::new();
    let json = format!(
        r#"{{
            "ocspFreshnessSeconds": 600,
            "verifyOcspNextUpdate": false,
            "ocspCachePeriodSeconds": 1000,
            "ocspCacheMaxEntries": 10,
            "instances": {{
                "EE": {{
                    "caCertificates": ["{root}"],
                    "ocspResponders": [{{ "ca": "{root}", "responder": "{responder}" }}]
                }}
            }},
            "timestampingCertificates": ["{tsa}"]
        }}"#,
        root = b64(pki.root.der()),
        responder = b64(pki.ocsp_responder.der()),
        tsa = b64(pki.tsa.der()),
    );

    let config = TrustConfiguration::from_json_slice(json.as_bytes()).unwrap();
    assert_eq!(config.ocsp_freshness_seconds(), 600);
    assert!(!config.verify_ocsp_next_update());
    assert_eq!(config.ocsp_cache_period(), Duration::from_secs(180));
    assert_eq!(config.ocsp_cache_max_entries(), 10);
    assert_eq!(config.instances().collect::<Vec<_>>(), vec!["EE"]);
    assert_eq!(config.ca_certificates("EE"), &[pki.root.certificate.clone()]);
    assert!(config.is_authorized_ocsp_responder(&pki.root.certificate, &pki.ocsp_responder.certificate));
    assert_eq!(config.timestamping_certificates(), &[pki.tsa.certificate.clone()]);
}

#[test]
fn empty_json_object_uses_defaults() {
    let config = TrustConfiguration::from_json_slice(b"{}").unwrap();
    assert_eq!(config.ocsp_freshness_seconds(), DEFAULT_OCSP_FRESHNESS_SECONDS);
    assert_eq!(config.instances().count(), 0);
}

#[test]
fn malformed_json_configuration_is_rejected() {
    let err = TrustConfiguration::from_json_slice(b"{ not json").unwrap_err();
    assert!(matches!(err, ConfigError::Json(_)));

    let json = format!(r#"{{ "instances": {{ "EE": {{ "caCertificates": ["{}"] }} }} }}"#, b64(b"not a certificate"));
    let err = TrustConfiguration::from_json_slice(json.as_bytes()).unwrap_err();
    assert!(matches!(err, ConfigError::Certificate(_)));

    let err: VerifyError = err.into();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
}

#[test]
fn published_snapshots_get_increasing_generations() {
    let handle = TrustConfigurationHandle::new(TrustConfiguration::default());
    let first = handle.snapshot();
    assert_eq!(first.generation(), 1);

    let generation = handle.publish(TrustConfiguration::builder().with_ocsp_freshness_seconds(5).build());
    assert_eq!(generation, 2);
    assert_eq!(handle.snapshot().generation(), 2);
    assert_eq!(handle.snapshot().ocsp_freshness_seconds(), 5);

    // Snapshots taken earlier are unaffected.
    assert_eq!(first.generation(), 1);
    assert_eq!(first.ocsp_freshness_seconds(), DEFAULT_OCSP_FRESHNESS_SECONDS);

    assert_eq!(handle.publish(TrustConfiguration::default()), 3);
}

#[test]
fn error_kind_codes() {
    assert_eq!(ErrorKind::DigestMismatch.code(), "DIGEST_MISMATCH");
    let err = VerifyError::new(ErrorKind::OcspRevoked, "revoked");
    assert_eq!(err.to_string(), "OCSP_REVOKED: revoked");
    assert_eq!(err.message(), "revoked");
}
