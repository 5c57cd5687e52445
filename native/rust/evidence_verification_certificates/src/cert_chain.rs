// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use evidence_verification_core::{Certificate, ErrorKind, TrustConfiguration, VerifyError, VerifyResult};

/// Certificates to validate: one end entity, candidate intermediates and the pinned trust
/// anchor, tagged with the security domain they belong to.
#[derive(Debug, Clone)]
pub struct CertChain {
    instance: String,
    end_entity: Certificate,
    intermediates: Vec<Certificate>,
    trust_anchor: Certificate,
}

impl CertChain {
    pub fn new(
        instance: impl Into<String>,
        trust_anchor: Certificate,
        end_entity: Certificate,
        intermediates: Vec<Certificate>,
    ) -> Self {
        Self {
            instance: instance.into(),
            end_entity,
            intermediates,
            trust_anchor,
        }
    }

    /// Pins the trust anchor of `instance` that `end_entity` chains to through
    /// `additional_certificates`.
    pub fn create(
        config: &TrustConfiguration,
        instance: &str,
        end_entity: Certificate,
        additional_certificates: &[Certificate],
    ) -> VerifyResult<Self> {
        let anchor = config
            .find_trust_anchor(instance, &end_entity, additional_certificates)
            .cloned()
            .ok_or_else(|| {
                VerifyError::new(
                    ErrorKind::ChainBuildFailure,
                    format!("no trust anchor of instance {instance} found for {end_entity}"),
                )
            })?;

        let intermediates = additional_certificates
            .iter()
            .filter(|c| **c != anchor && **c != end_entity)
            .cloned()
            .collect();
        Ok(Self::new(instance, anchor, end_entity, intermediates))
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn end_entity(&self) -> &Certificate {
        &self.end_entity
    }

    pub fn intermediates(&self) -> &[Certificate] {
        &self.intermediates
    }

    pub fn trust_anchor(&self) -> &Certificate {
        &self.trust_anchor
    }
}

/// A validated path from the end entity to the trust anchor.
#[derive(Debug, Clone)]
pub struct VerifiedCertPath {
    /// End entity first, trust anchor last.
    pub certificates: Vec<Certificate>,
    /// `ocsp_responses[i]` proves the status of `certificates[i]`. Empty when revocation was
    /// not checked.
    pub ocsp_responses: Vec<crate::ocsp_response::OcspResponse>,
}

impl VerifiedCertPath {
    pub fn end_entity(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    pub fn trust_anchor(&self) -> Option<&Certificate> {
        self.certificates.last()
    }
}
