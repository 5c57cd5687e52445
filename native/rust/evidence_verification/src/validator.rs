// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Staged evidence verification.
//!
//! Stages run in a fixed order and the first failure ends verification:
//!
//! 1. hash chain (batch records only)
//! 2. signing certificate extraction
//! 3. signer name match
//! 4. signature value and references
//! 5. timestamp manifests and tokens
//! 6. certificate chain and OCSP status
//!
//! Structural validation of the decoded record happens before it reaches this module.

use crate::record::{EvidenceRecord, SignatureDocument, TimestampCoverage, HASH_CHAIN_RESULT_URI};
use crate::signer::{CommonNameProfile, SignerIdentity, SigningCertificateProfile};
use evidence_verification_certificates::{
    CertChain, CertChainVerifier, CertChainVerifyOptions, JsonOcspResponseDecoder, OcspResponse, OcspResponseDecoder,
    OcspValidationCache, OcspVerifier, VerifiedCertPath,
};
use evidence_verification_core::{
    Certificate, DigestValue, ErrorKind, RustCryptoSignaturePrimitive, SignaturePrimitive, TrustConfiguration,
    VerifyError, VerifyResult,
};
use evidence_verification_hashchain::{HashChainReferenceResolver, HashChainVerifier};
use evidence_verification_timestamp::{JsonTstInfoDecoder, TimestampVerifier, TstInfoDecoder};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceStage {
    HashChain,
    SigningCertificate,
    SignerName,
    SignatureValue,
    Timestamps,
    CertificateChain,
}

impl EvidenceStage {
    pub const ALL: [EvidenceStage; 6] = [
        EvidenceStage::HashChain,
        EvidenceStage::SigningCertificate,
        EvidenceStage::SignerName,
        EvidenceStage::SignatureValue,
        EvidenceStage::Timestamps,
        EvidenceStage::CertificateChain,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::HashChain => "HashChain",
            Self::SigningCertificate => "SigningCertificate",
            Self::SignerName => "SignerName",
            Self::SignatureValue => "SignatureValue",
            Self::Timestamps => "Timestamps",
            Self::CertificateChain => "CertificateChain",
        }
    }
}

/// Outcome classification for a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageResultKind {
    Success,
    Failure,
    /// Stage did not run, either because it does not apply to the record or because an
    /// earlier stage failed.
    #[default]
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageResult {
    pub stage: EvidenceStage,
    pub kind: StageResultKind,
}

/// What an accepted record proved.
#[derive(Debug, Clone)]
pub struct VerifiedEvidence {
    pub batch: bool,
    pub signing_certificate: Certificate,
    pub signing_ocsp_response: Option<OcspResponse>,
    pub cert_path: VerifiedCertPath,
    /// Generation times of the verified timestamp tokens, in record order.
    pub timestamp_times: Vec<i64>,
}

#[derive(Debug, Clone)]
pub enum EvidenceOutcome {
    Accepted(VerifiedEvidence),
    Rejected { stage: EvidenceStage, error: VerifyError },
}

impl EvidenceOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn error(&self) -> Option<&VerifyError> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected { error, .. } => Some(error),
        }
    }

    pub fn into_result(self) -> VerifyResult<VerifiedEvidence> {
        match self {
            Self::Accepted(evidence) => Ok(evidence),
            Self::Rejected { error, .. } => Err(error),
        }
    }
}

/// Full verifier output: every stage in order plus the terminal outcome.
#[derive(Debug, Clone)]
pub struct EvidenceVerificationResult {
    pub stages: Vec<StageResult>,
    pub outcome: EvidenceOutcome,
}

impl EvidenceVerificationResult {
    pub fn stage(&self, stage: EvidenceStage) -> StageResultKind {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.kind)
            .unwrap_or_default()
    }
}

/// Input to [`EvidenceVerifier::evaluate`].
#[derive(Clone, Copy)]
pub struct VerificationRequest<'a> {
    pub record: &'a EvidenceRecord,
    pub expected_signer: &'a SignerIdentity,
    /// Unix seconds at which certificates and OCSP freshness are evaluated.
    pub at: i64,
    /// Consulted for hash chain URIs the record does not carry itself.
    pub resolver: Option<&'a dyn HashChainReferenceResolver>,
}

impl<'a> VerificationRequest<'a> {
    pub fn new(record: &'a EvidenceRecord, expected_signer: &'a SignerIdentity, at: i64) -> Self {
        Self {
            record,
            expected_signer,
            at,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: &'a dyn HashChainReferenceResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

pub struct EvidenceVerifier {
    config: Arc<TrustConfiguration>,
    primitive: Arc<dyn SignaturePrimitive>,
    profile: Arc<dyn SigningCertificateProfile>,
    ocsp_decoder: Arc<dyn OcspResponseDecoder>,
    tst_info_decoder: Arc<dyn TstInfoDecoder>,
    ocsp_verifier: Arc<OcspVerifier>,
    chain_options: CertChainVerifyOptions,
    timestamp_verifier: TimestampVerifier,
}

impl EvidenceVerifier {
    pub fn new(config: Arc<TrustConfiguration>) -> Self {
        let ocsp_verifier = Arc::new(OcspVerifier::new(config.clone()));
        Self {
            config,
            primitive: Arc::new(RustCryptoSignaturePrimitive),
            profile: Arc::new(CommonNameProfile),
            ocsp_decoder: Arc::new(JsonOcspResponseDecoder),
            tst_info_decoder: Arc::new(JsonTstInfoDecoder),
            ocsp_verifier,
            chain_options: CertChainVerifyOptions::default(),
            timestamp_verifier: TimestampVerifier::new(),
        }
    }

    pub fn with_primitive(mut self, primitive: Arc<dyn SignaturePrimitive>) -> Self {
        self.primitive = primitive;
        let cache = self.ocsp_verifier.cache().clone();
        self.rebuild(cache)
    }

    /// Replaces how OCSP `tbsResponseData` and timestamp `TSTInfo` bytes are decoded.
    pub fn with_decoders(
        mut self,
        ocsp_decoder: Arc<dyn OcspResponseDecoder>,
        tst_info_decoder: Arc<dyn TstInfoDecoder>,
    ) -> Self {
        self.ocsp_decoder = ocsp_decoder;
        self.tst_info_decoder = tst_info_decoder;
        let cache = self.ocsp_verifier.cache().clone();
        self.rebuild(cache)
    }

    pub fn with_profile(mut self, profile: Arc<dyn SigningCertificateProfile>) -> Self {
        self.profile = profile;
        self
    }

    /// Shares an OCSP validation cache, e.g. with the verifier built for the previous
    /// configuration snapshot.
    pub fn with_ocsp_cache(self, cache: Arc<OcspValidationCache>) -> Self {
        self.rebuild(cache)
    }

    pub fn with_chain_options(mut self, options: CertChainVerifyOptions) -> Self {
        self.chain_options = options;
        self
    }

    fn rebuild(mut self, cache: Arc<OcspValidationCache>) -> Self {
        self.ocsp_verifier = Arc::new(
            OcspVerifier::new(self.config.clone())
                .with_primitive(self.primitive.clone())
                .with_decoder(self.ocsp_decoder.clone())
                .with_cache(cache),
        );
        self.timestamp_verifier = TimestampVerifier::new()
            .with_primitive(self.primitive.clone())
            .with_decoder(self.tst_info_decoder.clone());
        self
    }

    pub fn ocsp_cache(&self) -> &Arc<OcspValidationCache> {
        self.ocsp_verifier.cache()
    }

    pub fn configuration(&self) -> &Arc<TrustConfiguration> {
        &self.config
    }

    pub fn verify(&self, request: &VerificationRequest<'_>) -> VerifyResult<VerifiedEvidence> {
        self.evaluate(request).outcome.into_result()
    }

    pub fn evaluate(&self, request: &VerificationRequest<'_>) -> EvidenceVerificationResult {
        let mut stages = Vec::with_capacity(EvidenceStage::ALL.len());
        let outcome = match self.run(request, &mut stages) {
            Ok(evidence) => {
                tracing::debug!(signer = %request.expected_signer, "evidence accepted");
                EvidenceOutcome::Accepted(evidence)
            }
            Err((stage, error)) => {
                tracing::debug!(
                    signer = %request.expected_signer,
                    stage = stage.name(),
                    code = error.kind().code(),
                    message = error.message(),
                    "evidence rejected"
                );
                EvidenceOutcome::Rejected { stage, error }
            }
        };

        for stage in EvidenceStage::ALL {
            if !stages.iter().any(|s: &StageResult| s.stage == stage) {
                stages.push(StageResult {
                    stage,
                    kind: StageResultKind::NotApplicable,
                });
            }
        }
        stages.sort_by_key(|s| EvidenceStage::ALL.iter().position(|x| *x == s.stage));

        EvidenceVerificationResult { stages, outcome }
    }

    /// Returns the signing certificate of `record` without verifying anything else.
    pub fn signing_certificate(record: &EvidenceRecord) -> VerifyResult<Certificate> {
        let cert = record.signature.signing_certificate.clone().ok_or_else(|| {
            VerifyError::new(ErrorKind::MalformedSignature, "signature does not contain a signing certificate")
        })?;
        match cert.key_usage() {
            Some(usage) if usage.non_repudiation => Ok(cert),
            _ => Err(VerifyError::new(
                ErrorKind::MalformedSignature,
                format!("certificate {cert} is not a signing certificate"),
            )),
        }
    }

    /// Returns the OCSP response in `record` that covers its signing certificate, if any.
    pub fn signing_ocsp_response(&self, record: &EvidenceRecord, instance: &str) -> VerifyResult<Option<OcspResponse>> {
        let cert = Self::signing_certificate(record)?;
        let signature = &record.signature;
        let issuers = signature
            .extra_certificates
            .iter()
            .chain(self.config.ca_certificates(instance).iter())
            .filter(|issuer| issuer.subject_raw() == cert.issuer_raw());

        for issuer in issuers {
            let response = signature
                .ocsp_responses
                .iter()
                .find(|r| self.ocsp_verifier.applies_to(r, &cert, issuer));
            if let Some(response) = response {
                return Ok(Some(response.clone()));
            }
        }
        Ok(None)
    }

    fn run(
        &self,
        request: &VerificationRequest<'_>,
        stages: &mut Vec<StageResult>,
    ) -> Result<VerifiedEvidence, (EvidenceStage, VerifyError)> {
        let record = request.record;
        let batch = record.is_batch();

        if batch {
            run_stage(stages, EvidenceStage::HashChain, || self.verify_hash_chain(request))?;
        }

        let signing_certificate =
            run_stage(stages, EvidenceStage::SigningCertificate, || Self::signing_certificate(record))?;

        run_stage(stages, EvidenceStage::SignerName, || {
            self.verify_signer_name(&signing_certificate, request.expected_signer)
        })?;

        run_stage(stages, EvidenceStage::SignatureValue, || {
            self.verify_signature_value(record, &signing_certificate, batch)
        })?;

        let timestamp_times = run_stage(stages, EvidenceStage::Timestamps, || self.verify_timestamps(record))?;

        let cert_path = run_stage(stages, EvidenceStage::CertificateChain, || {
            self.verify_certificate_chain(
                &record.signature,
                &signing_certificate,
                &request.expected_signer.instance,
                request.at,
            )
        })?;

        Ok(VerifiedEvidence {
            batch,
            signing_ocsp_response: cert_path.ocsp_responses.first().cloned(),
            signing_certificate,
            cert_path,
            timestamp_times,
        })
    }

    fn verify_hash_chain(&self, request: &VerificationRequest<'_>) -> VerifyResult<()> {
        let record = request.record;
        let result = record.hash_chain_result.as_deref().ok_or_else(|| {
            VerifyError::new(ErrorKind::UnresolvedReference, "record has no hash chain result")
        })?;
        let inputs: BTreeMap<String, DigestValue> = record
            .parts
            .iter()
            .map(|p| (p.name.clone(), p.digest.clone()))
            .collect();
        let resolver = RecordResolver {
            documents: &record.hash_chains,
            fallback: request.resolver,
        };
        HashChainVerifier::verify_result_bytes(result, &resolver, &inputs)
    }

    fn verify_signer_name(&self, cert: &Certificate, expected: &SignerIdentity) -> VerifyResult<()> {
        let actual = self.profile.subject_identity(&expected.instance, cert)?;
        if &actual != expected {
            return Err(VerifyError::new(
                ErrorKind::SignerIdentityMismatch,
                format!("signer name '{expected}' does not match the signing certificate identity '{actual}'"),
            ));
        }
        Ok(())
    }

    fn verify_signature_value(&self, record: &EvidenceRecord, cert: &Certificate, batch: bool) -> VerifyResult<()> {
        let signature = &record.signature;
        self.primitive
            .verify(
                cert.spki_der(),
                &signature.signature_algorithm_oid,
                &signature.signed_info,
                &signature.signature_value,
            )
            .map_err(|e| VerifyError::new(ErrorKind::InvalidSignatureValue, format!("signature value is invalid: {e}")))?;

        for reference in &signature.references {
            let matches = if batch && reference.uri == HASH_CHAIN_RESULT_URI {
                record
                    .hash_chain_result
                    .as_deref()
                    .is_some_and(|bytes| reference.digest.matches_data(bytes))
            } else if let Some(id) = reference.uri.strip_prefix('#') {
                let bytes = signature.id_object(id).ok_or_else(|| unresolved_reference(&reference.uri))?;
                reference.digest.matches_data(bytes)
            } else if let Some(part) = record.part(&reference.uri) {
                part.digest == reference.digest
            } else {
                return Err(unresolved_reference(&reference.uri));
            };

            if !matches {
                return Err(VerifyError::new(
                    ErrorKind::InvalidSignatureValue,
                    format!("digest of signed reference {} does not match", reference.uri),
                ));
            }
        }

        if !batch {
            let unreferenced: Vec<&str> = record
                .parts
                .iter()
                .filter(|p| !signature.references_uri(&p.name))
                .map(|p| p.name.as_str())
                .collect();
            if !unreferenced.is_empty() {
                return Err(VerifyError::new(
                    ErrorKind::UnusedInput,
                    format!("message parts not covered by the signature: {}", unreferenced.join(", ")),
                ));
            }
        }
        Ok(())
    }

    fn verify_timestamps(&self, record: &EvidenceRecord) -> VerifyResult<Vec<i64>> {
        let signature = &record.signature;

        for manifest in &signature.timestamp_manifests {
            for reference in &manifest.references {
                let bytes = reference
                    .uri
                    .strip_prefix('#')
                    .and_then(|id| signature.id_object(id))
                    .ok_or_else(|| unresolved_reference(&reference.uri))?;
                if !reference.digest.matches_data(bytes) {
                    return Err(VerifyError::new(
                        ErrorKind::DigestMismatch,
                        format!("manifest {} reference {} does not match", manifest.id, reference.uri),
                    ));
                }
            }
        }

        let trusted = self.config.timestamping_certificates();
        let mut times = Vec::with_capacity(record.timestamps.len());
        for timestamp in &record.timestamps {
            let time = match &timestamp.coverage {
                TimestampCoverage::SignatureValue => {
                    self.timestamp_verifier
                        .verify(&timestamp.token, &signature.signature_value, trusted)?
                }
                TimestampCoverage::Manifest { id } => {
                    let manifest = signature
                        .manifest(id)
                        .ok_or_else(|| unresolved_reference(&format!("#{id}")))?;
                    let manifest_bytes = signature
                        .id_object(&manifest.id)
                        .ok_or_else(|| unresolved_reference(&format!("#{id}")))?;
                    // The manifest only stands in for the signature value if it covers it.
                    if !manifest
                        .references
                        .iter()
                        .any(|r| r.digest.matches_data(&signature.signature_value))
                    {
                        return Err(VerifyError::new(
                            ErrorKind::DigestMismatch,
                            format!("manifest {id} does not cover the signature value"),
                        ));
                    }
                    self.timestamp_verifier.verify_imprint(&timestamp.token, manifest_bytes)?;
                    self.timestamp_verifier
                        .verify_signature_only(&timestamp.token, trusted)?
                }
            };
            times.push(time);
        }
        Ok(times)
    }

    fn verify_certificate_chain(
        &self,
        signature: &SignatureDocument,
        cert: &Certificate,
        instance: &str,
        at: i64,
    ) -> VerifyResult<VerifiedCertPath> {
        let chain = CertChain::create(&self.config, instance, cert.clone(), &signature.extra_certificates)?;
        CertChainVerifier::new(self.ocsp_verifier.clone())
            .with_options(self.chain_options.clone())
            .verify(&chain, &signature.ocsp_responses, at)
    }
}

fn run_stage<T>(
    stages: &mut Vec<StageResult>,
    stage: EvidenceStage,
    f: impl FnOnce() -> VerifyResult<T>,
) -> Result<T, (EvidenceStage, VerifyError)> {
    tracing::trace!(stage = stage.name(), "running evidence stage");
    match f() {
        Ok(v) => {
            stages.push(StageResult {
                stage,
                kind: StageResultKind::Success,
            });
            Ok(v)
        }
        Err(e) => {
            stages.push(StageResult {
                stage,
                kind: StageResultKind::Failure,
            });
            Err((stage, e))
        }
    }
}

fn unresolved_reference(uri: &str) -> VerifyError {
    VerifyError::new(ErrorKind::UnresolvedReference, format!("cannot resolve signed reference {uri}"))
}

/// Serves hash chain documents stored in the record, then defers to the caller's resolver.
struct RecordResolver<'a> {
    documents: &'a BTreeMap<String, Vec<u8>>,
    fallback: Option<&'a dyn HashChainReferenceResolver>,
}

impl HashChainReferenceResolver for RecordResolver<'_> {
    fn resolve(&self, uri: &str) -> std::io::Result<Option<Box<dyn Read + Send + '_>>> {
        if let Some(bytes) = self.documents.get(uri) {
            return Ok(Some(Box::new(Cursor::new(bytes.as_slice()))));
        }
        match self.fallback {
            Some(fallback) => fallback.resolve(uri),
            None => Ok(None),
        }
    }

    fn should_resolve(&self, uri: &str, digest: &DigestValue) -> bool {
        if self.documents.contains_key(uri) {
            return true;
        }
        self.fallback.map_or(true, |f| f.should_resolve(uri, digest))
    }

    fn transform(&self, algorithm: &str, data: Vec<u8>) -> Result<Vec<u8>, String> {
        match self.fallback {
            Some(fallback) => fallback.transform(algorithm, data),
            None => Err(format!("unsupported transform: {algorithm}")),
        }
    }
}
