// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Certificate chain and OCSP verification.
//!
//! [`cert_chain_verifier::CertChainVerifier`] builds a path from an end-entity certificate to
//! a pinned trust anchor and validates it as of a given date. Revocation status of every
//! non-anchor certificate on the path is proven by an OCSP response, checked by
//! [`ocsp_verifier::OcspVerifier`].

pub mod cert_chain;
pub mod cert_chain_verifier;
pub mod ocsp_cache;
pub mod ocsp_response;
pub mod ocsp_verifier;

pub use cert_chain::{CertChain, VerifiedCertPath};
pub use cert_chain_verifier::{CertChainVerifier, CertChainVerifyOptions};
pub use ocsp_cache::{OcspCacheKey, OcspValidationCache};
pub use ocsp_response::{
    CertStatus, JsonOcspResponseDecoder, OcspCertId, OcspResponse, OcspResponseData, OcspResponseDecoder, ResponderId,
};
pub use ocsp_verifier::{OcspVerifier, OcspVerifierOptions};
