// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use thiserror::Error;

/// Machine-readable classification of a verification failure.
///
/// Every rejection produced by the verifiers in this workspace carries exactly one kind.
/// [`ErrorKind::code`] returns the stable string form used in logs and by callers that
/// persist outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedReference,
    UnresolvedReference,
    DigestMismatch,
    UnusedInput,
    ChainBuildFailure,
    ChainInvalid,
    OcspResponseNotFound,
    OcspCertMismatch,
    OcspSignerNotFound,
    OcspBadSignature,
    OcspUnauthorizedSigner,
    OcspStale,
    OcspStaleNextUpdate,
    OcspRevoked,
    OcspUnknownStatus,
    TimestampImprintMismatch,
    TimestampSignerNotFound,
    TimestampBadSignature,
    SignerIdentityMismatch,
    MalformedSignature,
    InvalidSignatureValue,
    InvalidConfiguration,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::MalformedReference => "MALFORMED_REFERENCE",
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::DigestMismatch => "DIGEST_MISMATCH",
            Self::UnusedInput => "UNUSED_INPUT",
            Self::ChainBuildFailure => "CHAIN_BUILD_FAILURE",
            Self::ChainInvalid => "CHAIN_INVALID",
            Self::OcspResponseNotFound => "OCSP_RESPONSE_NOT_FOUND",
            Self::OcspCertMismatch => "OCSP_CERT_MISMATCH",
            Self::OcspSignerNotFound => "OCSP_SIGNER_NOT_FOUND",
            Self::OcspBadSignature => "OCSP_BAD_SIGNATURE",
            Self::OcspUnauthorizedSigner => "OCSP_UNAUTHORIZED_SIGNER",
            Self::OcspStale => "OCSP_STALE",
            Self::OcspStaleNextUpdate => "OCSP_STALE_NEXT_UPDATE",
            Self::OcspRevoked => "OCSP_REVOKED",
            Self::OcspUnknownStatus => "OCSP_UNKNOWN_STATUS",
            Self::TimestampImprintMismatch => "TIMESTAMP_IMPRINT_MISMATCH",
            Self::TimestampSignerNotFound => "TIMESTAMP_SIGNER_NOT_FOUND",
            Self::TimestampBadSignature => "TIMESTAMP_BAD_SIGNATURE",
            Self::SignerIdentityMismatch => "SIGNER_IDENTITY_MISMATCH",
            Self::MalformedSignature => "MALFORMED_SIGNATURE",
            Self::InvalidSignatureValue => "INVALID_SIGNATURE_VALUE",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A typed verification failure: the kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct VerifyError {
    kind: ErrorKind,
    message: String,
}

impl VerifyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("invalid certificate DER: {0}")]
    InvalidDer(String),

    #[error("invalid certificate extension: {0}")]
    InvalidExtension(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid trust configuration json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid certificate in trust configuration: {0}")]
    Certificate(#[from] CertificateError),
}

impl From<ConfigError> for VerifyError {
    fn from(value: ConfigError) -> Self {
        VerifyError::new(ErrorKind::InvalidConfiguration, value.to_string())
    }
}
