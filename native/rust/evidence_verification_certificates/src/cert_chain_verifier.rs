// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Certificate path building and validation against a pinned trust anchor.
//!
//! Validation is evaluated as of a caller-supplied date, so archived evidence can be checked
//! long after its certificates expired.

use crate::cert_chain::{CertChain, VerifiedCertPath};
use crate::ocsp_response::OcspResponse;
use crate::ocsp_verifier::OcspVerifier;
use evidence_verification_core::{Certificate, ErrorKind, SignaturePrimitive, VerifyError, VerifyResult};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CertChainVerifyOptions {
    /// Maximum number of issuer hops from the end entity to the trust anchor.
    pub max_depth: usize,
}

impl Default for CertChainVerifyOptions {
    fn default() -> Self {
        Self { max_depth: 16 }
    }
}

pub struct CertChainVerifier {
    ocsp_verifier: Arc<OcspVerifier>,
    options: CertChainVerifyOptions,
}

impl CertChainVerifier {
    pub fn new(ocsp_verifier: Arc<OcspVerifier>) -> Self {
        Self {
            ocsp_verifier,
            options: CertChainVerifyOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CertChainVerifyOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the path at `at` and checks every non-anchor certificate against its OCSP
    /// response from `ocsp_responses`.
    pub fn verify(
        &self,
        chain: &CertChain,
        ocsp_responses: &[OcspResponse],
        at: i64,
    ) -> VerifyResult<VerifiedCertPath> {
        let mut path = self.verify_chain_only(chain, at)?;

        let mut matched = Vec::with_capacity(path.certificates.len().saturating_sub(1));
        for pair in path.certificates.windows(2) {
            let (subject, issuer) = (&pair[0], &pair[1]);
            let response = ocsp_responses
                .iter()
                .find(|r| self.ocsp_verifier.applies_to(r, subject, issuer))
                .ok_or_else(|| {
                    VerifyError::new(
                        ErrorKind::OcspResponseNotFound,
                        format!("no ocsp response found for certificate {subject}"),
                    )
                })?;
            self.ocsp_verifier
                .verify_validity_and_status(response, subject, issuer, at)?;
            matched.push(response.clone());
        }

        path.ocsp_responses = matched;
        Ok(path)
    }

    /// Builds and validates the path without revocation checks.
    pub fn verify_chain_only(&self, chain: &CertChain, at: i64) -> VerifyResult<VerifiedCertPath> {
        tracing::debug!(instance = chain.instance(), end_entity = %chain.end_entity(), at, "verifying certificate chain");

        let certificates = self.build_path(chain)?;
        validate_path(&certificates, at)?;
        Ok(VerifiedCertPath {
            certificates,
            ocsp_responses: Vec::new(),
        })
    }

    /// Depth-first search from the end entity to the trust anchor. Every certificate whose
    /// subject matches the current issuer name and whose key verifies the current signature
    /// is a candidate. A candidate that dead-ends is backed out and the next one is tried.
    fn build_path(&self, chain: &CertChain) -> VerifyResult<Vec<Certificate>> {
        if chain.end_entity() == chain.trust_anchor() {
            return Err(VerifyError::new(
                ErrorKind::ChainInvalid,
                "end-entity certificate must not be the trust anchor",
            ));
        }

        let mut path = vec![chain.end_entity().clone()];
        let mut search = PathSearch::default();
        if self.extend_path(chain, &mut path, &mut search) {
            return Ok(path);
        }
        Err(search.into_error(self.options.max_depth))
    }

    fn extend_path(&self, chain: &CertChain, path: &mut Vec<Certificate>, search: &mut PathSearch) -> bool {
        if path.len() > self.options.max_depth {
            search.depth_exceeded = true;
            return false;
        }

        let primitive = self.ocsp_verifier.primitive().as_ref();
        let anchor = chain.trust_anchor();
        let current = path[path.len() - 1].clone();

        // Intermediates first, the trust anchor last.
        let candidates: Vec<&Certificate> = chain
            .intermediates()
            .iter()
            .chain(std::iter::once(anchor))
            .filter(|c| c.subject_raw() == current.issuer_raw() && !path.contains(*c))
            .collect();
        if candidates.is_empty() {
            search
                .dead_end
                .get_or_insert_with(|| format!("no issuer found for {current} on the way to the trust anchor"));
            return false;
        }

        for issuer in candidates {
            if !signature_verifies(&current, issuer, primitive) {
                search
                    .bad_signature
                    .get_or_insert_with(|| format!("signature of {current} does not verify with issuer {issuer}"));
                continue;
            }
            path.push(issuer.clone());
            if issuer == anchor || self.extend_path(chain, path, search) {
                return true;
            }
            path.pop();
        }
        false
    }
}

/// Why the path search failed, first occurrence of each reason.
#[derive(Default)]
struct PathSearch {
    bad_signature: Option<String>,
    dead_end: Option<String>,
    depth_exceeded: bool,
}

impl PathSearch {
    fn into_error(self, max_depth: usize) -> VerifyError {
        if let Some(message) = self.bad_signature {
            return VerifyError::new(ErrorKind::ChainInvalid, message);
        }
        if self.depth_exceeded {
            return VerifyError::new(
                ErrorKind::ChainBuildFailure,
                format!("certificate path exceeds {max_depth} issuers"),
            );
        }
        VerifyError::new(
            ErrorKind::ChainBuildFailure,
            self.dead_end.unwrap_or_else(|| "no certificate path to the trust anchor".to_string()),
        )
    }
}

fn signature_verifies(subject: &Certificate, issuer: &Certificate, primitive: &dyn SignaturePrimitive) -> bool {
    primitive
        .verify(issuer.spki_der(), subject.signature_oid(), subject.tbs_der(), subject.signature())
        .is_ok()
}

fn validate_path(path: &[Certificate], at: i64) -> VerifyResult<()> {
    for cert in path {
        if !cert.is_valid_at(at) {
            return Err(VerifyError::new(
                ErrorKind::ChainInvalid,
                format!(
                    "certificate {cert} is not valid at {at} (valid {} to {})",
                    cert.not_before(),
                    cert.not_after()
                ),
            ));
        }
    }

    for (index, issuer) in path.iter().enumerate().skip(1) {
        if !issuer.is_ca() {
            return Err(VerifyError::new(
                ErrorKind::ChainInvalid,
                format!("issuing certificate {issuer} is not a CA"),
            ));
        }
        if let Some(usage) = issuer.key_usage() {
            if !usage.key_cert_sign {
                return Err(VerifyError::new(
                    ErrorKind::ChainInvalid,
                    format!("issuing certificate {issuer} is not allowed to sign certificates"),
                ));
            }
        }
        // Intermediate CAs strictly between this issuer and the end entity.
        let below = (index - 1) as u64;
        if let Some(limit) = issuer.path_len_constraint() {
            if u64::from(limit) < below {
                return Err(VerifyError::new(
                    ErrorKind::ChainInvalid,
                    format!("path length constraint of {issuer} exceeded"),
                ));
            }
        }
    }
    Ok(())
}
