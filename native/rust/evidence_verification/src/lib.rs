// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end verification of evidence records.
//!
//! An evidence record proves that a logged message exchange was signed by a known party,
//! not tampered with, not revoked at signing time and time-stamped by a trusted authority.
//! [`validator::EvidenceVerifier`] composes the hash chain, timestamp, certificate chain and
//! OCSP verifiers from the sibling crates into a single accept/reject decision.
//!
//! ```ignore
//! let verifier = EvidenceVerifier::new(handle.snapshot());
//! let signer = SignerIdentity::member("EE", "GOV", "70000001");
//! let evidence = verifier.verify(&VerificationRequest::new(&record, &signer, signed_at))?;
//! ```

pub mod record;
pub mod signer;
pub mod validator;

pub use record::{
    EvidenceRecord, EvidenceTimestamp, MessagePart, SignatureDocument, SignedReference, TimestampCoverage,
    TimestampManifest, HASH_CHAIN_RESULT_URI, HASH_CHAIN_URI,
};
pub use signer::{CommonNameProfile, SignerIdentity, SigningCertificateProfile};
pub use validator::{
    EvidenceOutcome, EvidenceStage, EvidenceVerificationResult, EvidenceVerifier, StageResult, StageResultKind,
    VerificationRequest, VerifiedEvidence,
};
