// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test-only utilities for composing verification scenarios.
//!
//! Certificates are generated with `rcgen` and everything else (OCSP responses, timestamp
//! tokens, signature values) is signed with real ECDSA P-256 keys, so tests exercise the
//! production signature primitive end to end.

use evidence_verification_certificates::{
    CertStatus, JsonOcspResponseDecoder, OcspCertId, OcspResponse, OcspResponseData, ResponderId,
};
use evidence_verification_core::crypto::ECDSA_WITH_SHA256_OID;
use evidence_verification_core::{Certificate, DigestMethod, DigestValue, TrustConfigurationBuilder};
use evidence_verification_hashchain::digest_list::encode_digest_list;
use evidence_verification_hashchain::{AbstractValue, DataRef, HashChain, HashChainResult, HashStep};
use evidence_verification_timestamp::{JsonTstInfoDecoder, SignerIdentifier, TimestampToken, TstInfo};
use p256::ecdsa::signature::Signer as _;
use p256::pkcs8::DecodePrivateKey as _;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};

/// 2025-06-01T00:00:00Z
pub const AT: i64 = 1_748_736_000;
/// 2024-01-01T00:00:00Z, default `notBefore` of generated certificates.
pub const NOT_BEFORE: i64 = 1_704_067_200;
/// 2034-01-01T00:00:00Z, default `notAfter` of generated certificates.
pub const NOT_AFTER: i64 = 2_019_686_400;

pub const INSTANCE: &str = "EE";
pub const SIGNER_CN: &str = "EE/GOV/70000001";

/// A generated certificate together with its private key.
pub struct TestCert {
    pub certificate: Certificate,
    pub key_pair: KeyPair,
    issued: rcgen::Certificate,
}

impl TestCert {
    pub fn der(&self) -> &[u8] {
        self.certificate.der()
    }

    /// ECDSA P-256 / SHA-256 signature in DER form.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        sign_p256(&self.key_pair, message)
    }
}

pub fn sign_p256(key_pair: &KeyPair, message: &[u8]) -> Vec<u8> {
    let signing_key =
        p256::ecdsa::SigningKey::from_pkcs8_der(&key_pair.serialize_der()).expect("rcgen key is a P-256 PKCS#8 key");
    let signature: p256::ecdsa::Signature = signing_key.sign(message);
    signature.to_der().as_bytes().to_vec()
}

pub struct CertBuilder {
    params: CertificateParams,
}

impl CertBuilder {
    pub fn new(common_name: &str) -> Self {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.not_before = rcgen::date_time_ymd(2024, 1, 1);
        params.not_after = rcgen::date_time_ymd(2034, 1, 1);
        // rcgen drops key usage unless another extension forces the extensions block out.
        params.use_authority_key_identifier_extension = true;
        Self { params }
    }

    pub fn ca(mut self) -> Self {
        self.params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        self.params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        self
    }

    pub fn ca_with_path_len(mut self, path_len: u8) -> Self {
        self = self.ca();
        self.params.is_ca = IsCa::Ca(BasicConstraints::Constrained(path_len));
        self
    }

    /// Key usage for certificates that sign evidence (digitalSignature + nonRepudiation).
    pub fn signing(self) -> Self {
        self.key_usages(vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::ContentCommitment,
        ])
    }

    pub fn key_usages(mut self, usages: Vec<KeyUsagePurpose>) -> Self {
        self.params.key_usages = usages;
        self
    }

    pub fn extended_key_usages(mut self, usages: Vec<ExtendedKeyUsagePurpose>) -> Self {
        self.params.extended_key_usages = usages;
        self
    }

    pub fn validity(mut self, from: (i32, u8, u8), to: (i32, u8, u8)) -> Self {
        self.params.not_before = rcgen::date_time_ymd(from.0, from.1, from.2);
        self.params.not_after = rcgen::date_time_ymd(to.0, to.1, to.2);
        self
    }

    pub fn self_signed(self) -> TestCert {
        let key_pair = KeyPair::generate().expect("generate key pair");
        let issued = self.params.self_signed(&key_pair).expect("self-sign certificate");
        finish(issued, key_pair)
    }

    pub fn signed_by(self, issuer: &TestCert) -> TestCert {
        let key_pair = KeyPair::generate().expect("generate key pair");
        let issued = self
            .params
            .signed_by(&key_pair, &issuer.issued, &issuer.key_pair)
            .expect("sign certificate");
        finish(issued, key_pair)
    }

    /// Issues a certificate for the key pair of `subject_key` instead of a fresh one.
    pub fn signed_by_with_key_of(self, subject_key: &TestCert, issuer: &TestCert) -> TestCert {
        let key_pair = KeyPair::from_pem(&subject_key.key_pair.serialize_pem()).expect("copy key pair");
        let issued = self
            .params
            .signed_by(&key_pair, &issuer.issued, &issuer.key_pair)
            .expect("sign certificate");
        finish(issued, key_pair)
    }
}

fn finish(issued: rcgen::Certificate, key_pair: KeyPair) -> TestCert {
    let certificate = Certificate::from_der(issued.der()).expect("generated certificate parses");
    TestCert {
        certificate,
        key_pair,
        issued,
    }
}

/// Root CA, evidence signer, delegated OCSP responder and timestamping authority.
pub struct TestPki {
    pub root: TestCert,
    pub signer: TestCert,
    pub ocsp_responder: TestCert,
    pub tsa: TestCert,
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPki {
    pub fn new() -> Self {
        let root = CertBuilder::new("Test Root CA").ca().self_signed();
        let signer = CertBuilder::new(SIGNER_CN).signing().signed_by(&root);
        let ocsp_responder = CertBuilder::new("Test OCSP Responder")
            .key_usages(vec![KeyUsagePurpose::DigitalSignature])
            .extended_key_usages(vec![ExtendedKeyUsagePurpose::OcspSigning])
            .signed_by(&root);
        let tsa = CertBuilder::new("Test TSA")
            .key_usages(vec![KeyUsagePurpose::DigitalSignature])
            .extended_key_usages(vec![ExtendedKeyUsagePurpose::TimeStamping])
            .signed_by(&root);
        Self {
            root,
            signer,
            ocsp_responder,
            tsa,
        }
    }

    /// Trusts the root for [`INSTANCE`] and the TSA for timestamps.
    pub fn configuration(&self) -> TrustConfigurationBuilder {
        TrustConfigurationBuilder::new()
            .with_ca_certificate(INSTANCE, self.root.certificate.clone())
            .with_timestamping_certificate(self.tsa.certificate.clone())
    }

    /// A fresh good response for the signer, produced shortly before [`AT`].
    pub fn signer_ocsp(&self) -> OcspResponseBuilder {
        OcspResponseBuilder::new(&self.signer.certificate, &self.root.certificate)
    }
}

pub struct OcspResponseBuilder {
    cert_id: OcspCertId,
    status: CertStatus,
    this_update: i64,
    next_update: Option<i64>,
    responder_id: Option<ResponderId>,
    certificates: Vec<Certificate>,
}

impl OcspResponseBuilder {
    pub fn new(subject: &Certificate, issuer: &Certificate) -> Self {
        Self {
            cert_id: OcspCertId::for_certificate(DigestMethod::Sha1, subject, issuer),
            status: CertStatus::Good,
            this_update: AT - 60,
            next_update: Some(AT + 3600),
            responder_id: None,
            certificates: Vec::new(),
        }
    }

    pub fn cert_id(mut self, cert_id: OcspCertId) -> Self {
        self.cert_id = cert_id;
        self
    }

    pub fn status(mut self, status: CertStatus) -> Self {
        self.status = status;
        self
    }

    pub fn this_update(mut self, this_update: i64) -> Self {
        self.this_update = this_update;
        self
    }

    pub fn next_update(mut self, next_update: Option<i64>) -> Self {
        self.next_update = next_update;
        self
    }

    pub fn responder_id(mut self, responder_id: ResponderId) -> Self {
        self.responder_id = Some(responder_id);
        self
    }

    pub fn embed(mut self, cert: &Certificate) -> Self {
        self.certificates.push(cert.clone());
        self
    }

    /// Signs with `signer`, identified by name unless a responder id was set.
    pub fn sign(self, signer: &TestCert) -> OcspResponse {
        let data = self.data(signer);
        sign_ocsp_response_data(&data, signer, self.certificates)
    }

    /// The response data [`Self::sign`] would sign.
    pub fn data(&self, signer: &TestCert) -> OcspResponseData {
        OcspResponseData {
            cert_id: self.cert_id.clone(),
            status: self.status.clone(),
            this_update: self.this_update,
            next_update: self.next_update,
            produced_at: self.this_update,
            responder_id: self
                .responder_id
                .clone()
                .unwrap_or_else(|| ResponderId::ByName(signer.certificate.subject_raw().to_vec())),
        }
    }
}

pub fn sign_ocsp_response_data(
    data: &OcspResponseData,
    signer: &TestCert,
    certificates: Vec<Certificate>,
) -> OcspResponse {
    let tbs_response_data = JsonOcspResponseDecoder::encode(data).expect("encode ocsp response data");
    let signature = signer.sign(&tbs_response_data);
    OcspResponse::new(tbs_response_data, ECDSA_WITH_SHA256_OID, signature, certificates)
}

/// A SHA-256 timestamp token over `stamped` signed by `tsa`.
pub fn timestamp_token(stamped: &[u8], tsa: &TestCert, gen_time: i64) -> TimestampToken {
    let info = TstInfo {
        hash_method: DigestMethod::Sha256,
        message_imprint: DigestMethod::Sha256.digest(stamped),
        gen_time,
        serial_number: gen_time.to_be_bytes().to_vec(),
    };
    sign_tst_info(&info, tsa)
}

pub fn sign_tst_info(info: &TstInfo, tsa: &TestCert) -> TimestampToken {
    let signed_content = JsonTstInfoDecoder::encode(info).expect("encode tst info");
    let signature = tsa.sign(&signed_content);
    TimestampToken::new(
        SignerIdentifier::for_certificate(&tsa.certificate),
        signed_content,
        ECDSA_WITH_SHA256_OID,
        signature,
    )
}

/// Digest of a step whose values resolve to `values`.
pub fn step_digest(method: DigestMethod, values: &[DigestValue]) -> Vec<u8> {
    method.digest(&encode_digest_list(values))
}

pub fn data_ref(uri: &str, digest: &DigestValue) -> AbstractValue {
    AbstractValue::DataRef(DataRef {
        uri: uri.to_string(),
        digest_method: Some(digest.method().uri().to_string()),
        digest_value: digest.value().to_vec(),
        transforms: Vec::new(),
    })
}

/// One-step hash chain over a single input. Returns the result and the chain document,
/// with the result pointing at `<chain_uri>#step1`.
pub fn single_input_hash_chain(chain_uri: &str, input_uri: &str, input: &DigestValue) -> (HashChainResult, HashChain) {
    let chain = HashChain {
        default_digest_method: DigestMethod::Sha256.uri().to_string(),
        hash_steps: vec![HashStep {
            id: "step1".to_string(),
            values: vec![data_ref(input_uri, input)],
        }],
    };
    let result = HashChainResult {
        digest_method: DigestMethod::Sha256.uri().to_string(),
        digest_value: step_digest(DigestMethod::Sha256, std::slice::from_ref(input)),
        uri: format!("{chain_uri}#step1"),
    };
    (result, chain)
}
