// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! OCSP response verification.
//!
//! Applicability, responder lookup, signature and responder authorization depend only on
//! the response, the certificate pair and the trust configuration, so their outcome is
//! cached. Freshness depends on the verification date and is evaluated on every call.
//!
//! Every decision is made on fields decoded from the signed `tbsResponseData` by the
//! verifier's own [`OcspResponseDecoder`].

use crate::ocsp_cache::{OcspCacheKey, OcspValidationCache};
use crate::ocsp_response::{CertStatus, JsonOcspResponseDecoder, OcspResponse, OcspResponseData, OcspResponseDecoder};
use evidence_verification_core::{
    Certificate, ErrorKind, RustCryptoSignaturePrimitive, SignaturePrimitive, TrustConfiguration, VerifyError,
    VerifyResult,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OcspVerifierOptions {
    /// Reject responses whose `nextUpdate` precedes the verification date.
    pub verify_next_update: bool,
    pub cache_period: Duration,
    pub cache_max_entries: usize,
}

impl Default for OcspVerifierOptions {
    fn default() -> Self {
        Self::from_configuration(&TrustConfiguration::default())
    }
}

impl OcspVerifierOptions {
    pub fn from_configuration(config: &TrustConfiguration) -> Self {
        Self {
            verify_next_update: config.verify_ocsp_next_update(),
            cache_period: config.ocsp_cache_period(),
            cache_max_entries: config.ocsp_cache_max_entries(),
        }
    }
}

pub struct OcspVerifier {
    config: Arc<TrustConfiguration>,
    primitive: Arc<dyn SignaturePrimitive>,
    decoder: Arc<dyn OcspResponseDecoder>,
    options: OcspVerifierOptions,
    cache: Arc<OcspValidationCache>,
}

impl OcspVerifier {
    pub fn new(config: Arc<TrustConfiguration>) -> Self {
        let options = OcspVerifierOptions::from_configuration(&config);
        let cache = Arc::new(OcspValidationCache::new(options.cache_period, options.cache_max_entries));
        Self {
            config,
            primitive: Arc::new(RustCryptoSignaturePrimitive),
            decoder: Arc::new(JsonOcspResponseDecoder),
            options,
            cache,
        }
    }

    pub fn with_primitive(mut self, primitive: Arc<dyn SignaturePrimitive>) -> Self {
        self.primitive = primitive;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn OcspResponseDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replaces the options and rebuilds the validation cache with their period and size.
    pub fn with_options(mut self, options: OcspVerifierOptions) -> Self {
        self.cache = Arc::new(OcspValidationCache::new(options.cache_period, options.cache_max_entries));
        self.options = options;
        self
    }

    /// Shares a validation cache between verifiers, e.g. across configuration generations.
    pub fn with_cache(mut self, cache: Arc<OcspValidationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<OcspValidationCache> {
        &self.cache
    }

    pub fn configuration(&self) -> &Arc<TrustConfiguration> {
        &self.config
    }

    pub fn primitive(&self) -> &Arc<dyn SignaturePrimitive> {
        &self.primitive
    }

    pub fn decoder(&self) -> &Arc<dyn OcspResponseDecoder> {
        &self.decoder
    }

    /// Decodes the signed response data. Nothing is verified.
    pub fn decode(&self, response: &OcspResponse) -> VerifyResult<OcspResponseData> {
        self.decoder.decode(response.tbs_response_data())
    }

    /// True when `response` decodes and names `subject` as issued by `issuer`.
    pub fn applies_to(&self, response: &OcspResponse, subject: &Certificate, issuer: &Certificate) -> bool {
        self.decode(response).is_ok_and(|data| data.is_for(subject, issuer))
    }

    /// Verifies that `response` is a valid, fresh response for `subject` at `at`, and that it
    /// reports the certificate as good.
    pub fn verify_validity_and_status(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
        at: i64,
    ) -> VerifyResult<()> {
        let data = self.verify_validity(response, subject, issuer, at)?;
        Self::check_status(&data)
    }

    /// Everything except the status check. Returns the verified response data.
    pub fn verify_validity(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
        at: i64,
    ) -> VerifyResult<OcspResponseData> {
        tracing::debug!(subject = %subject, at, "verifying ocsp response validity");

        let data = self.decode(response)?;
        let key = OcspCacheKey::new(response, subject, issuer, self.config.generation());
        self.cache
            .get_or_validate(key, || self.validate_signed_response(response, &data, subject, issuer))?;

        self.verify_freshness(&data, at)?;
        Ok(data)
    }

    /// Status check only. The response signature is not verified.
    pub fn verify_status(&self, response: &OcspResponse) -> VerifyResult<()> {
        Self::check_status(&self.decode(response)?)
    }

    fn check_status(data: &OcspResponseData) -> VerifyResult<()> {
        match &data.status {
            CertStatus::Good => Ok(()),
            CertStatus::Revoked { revocation_time, reason } => Err(VerifyError::new(
                ErrorKind::OcspRevoked,
                match reason {
                    Some(r) => format!("certificate was revoked at {revocation_time} (reason {r})"),
                    None => format!("certificate was revoked at {revocation_time}"),
                },
            )),
            CertStatus::Unknown => Err(VerifyError::new(
                ErrorKind::OcspUnknownStatus,
                "ocsp responder does not know the certificate",
            )),
        }
    }

    /// True when `response` is too old to prove status at `at`.
    /// A response that does not decode counts as expired.
    pub fn is_expired(&self, response: &OcspResponse, at: i64) -> bool {
        self.decode(response)
            .and_then(|data| self.verify_freshness(&data, at))
            .is_err()
    }

    /// Finds the certificate that signed `response` among the configured OCSP responder
    /// certificates, all configured CA certificates and the certificates in the response.
    pub fn find_responder_certificate(&self, response: &OcspResponse) -> Option<Certificate> {
        let data = self.decode(response).ok()?;
        self.find_responder(response, &data)
    }

    fn find_responder(&self, response: &OcspResponse, data: &OcspResponseData) -> Option<Certificate> {
        self.config
            .ocsp_responder_certificates()
            .chain(self.config.all_ca_certificates())
            .chain(response.certificates().iter())
            .find(|c| data.responder_id.matches(c))
            .cloned()
    }

    fn validate_signed_response(
        &self,
        response: &OcspResponse,
        data: &OcspResponseData,
        subject: &Certificate,
        issuer: &Certificate,
    ) -> VerifyResult<()> {
        if !data.is_for(subject, issuer) {
            return Err(VerifyError::new(
                ErrorKind::OcspCertMismatch,
                format!("ocsp response does not apply to certificate {subject}"),
            ));
        }

        let signer = self.find_responder(response, data).ok_or_else(|| {
            VerifyError::new(ErrorKind::OcspSignerNotFound, "could not find ocsp responder certificate")
        })?;

        self.primitive
            .verify(
                signer.spki_der(),
                response.signature_algorithm_oid(),
                response.tbs_response_data(),
                response.signature(),
            )
            .map_err(|e| VerifyError::new(ErrorKind::OcspBadSignature, format!("ocsp response signature is invalid: {e}")))?;

        if !self.is_authorized_responder(&signer, issuer) {
            return Err(VerifyError::new(
                ErrorKind::OcspUnauthorizedSigner,
                format!("ocsp responder {signer} is not authorized for issuer {issuer}"),
            ));
        }
        Ok(())
    }

    fn is_authorized_responder(&self, signer: &Certificate, issuer: &Certificate) -> bool {
        if self.config.is_authorized_ocsp_responder(issuer, signer) {
            return true;
        }
        if signer == issuer {
            return true;
        }
        // Delegated responder: issued by the same CA and marked for OCSP signing.
        signer.has_ocsp_signing_usage() && signer.verify_issued_by(issuer, self.primitive.as_ref()).is_ok()
    }

    fn verify_freshness(&self, data: &OcspResponseData, at: i64) -> VerifyResult<()> {
        let freshness = self.config.ocsp_freshness_seconds();
        let oldest_allowed = at.saturating_sub(freshness);
        tracing::trace!(
            this_update = data.this_update,
            next_update = ?data.next_update,
            at,
            freshness,
            "checking ocsp freshness"
        );

        if data.this_update < oldest_allowed {
            return Err(VerifyError::new(
                ErrorKind::OcspStale,
                format!(
                    "ocsp response is too old (thisUpdate {} is before {})",
                    data.this_update, oldest_allowed
                ),
            ));
        }

        if self.options.verify_next_update {
            if let Some(next_update) = data.next_update {
                if next_update < at {
                    return Err(VerifyError::new(
                        ErrorKind::OcspStaleNextUpdate,
                        format!("ocsp response nextUpdate {next_update} is before {at}"),
                    ));
                }
            }
        }
        Ok(())
    }
}
