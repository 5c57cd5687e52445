// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evidence record model.
//!
//! Records are decoded by the caller. Every byte field holds exactly the bytes that were
//! signed, digested or stamped, so verification never re-serializes anything.

use evidence_verification_certificates::OcspResponse;
use evidence_verification_core::{Certificate, DigestValue};
use evidence_verification_timestamp::TimestampToken;
use std::collections::BTreeMap;

/// URI under which a batch signature references the hash chain result.
pub const HASH_CHAIN_RESULT_URI: &str = "/hashchainresult";
/// Default URI of the hash chain document stored with a batch record.
pub const HASH_CHAIN_URI: &str = "/hashchain";

/// A reference covered by the signed info, with its expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedReference {
    pub uri: String,
    pub digest: DigestValue,
}

/// A manifest whose own bytes are time-stamped and whose references bind other signature
/// objects (typically the signature value) to that timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampManifest {
    /// Id of the object holding the manifest bytes in [`SignatureDocument::id_objects`].
    pub id: String,
    pub references: Vec<SignedReference>,
}

#[derive(Debug, Clone, Default)]
pub struct SignatureDocument {
    pub signing_certificate: Option<Certificate>,
    pub signature_algorithm_oid: String,
    /// Canonical bytes of the signed info, the input of the signature value.
    pub signed_info: Vec<u8>,
    pub signature_value: Vec<u8>,
    pub references: Vec<SignedReference>,
    /// Canonical bytes of signature objects addressable as `#<id>`.
    pub id_objects: BTreeMap<String, Vec<u8>>,
    pub timestamp_manifests: Vec<TimestampManifest>,
    pub ocsp_responses: Vec<OcspResponse>,
    /// Intermediate certificates shipped with the signature.
    pub extra_certificates: Vec<Certificate>,
}

impl SignatureDocument {
    pub fn references_uri(&self, uri: &str) -> bool {
        self.references.iter().any(|r| r.uri == uri)
    }

    pub fn id_object(&self, id: &str) -> Option<&[u8]> {
        self.id_objects.get(id).map(Vec::as_slice)
    }

    pub fn manifest(&self, id: &str) -> Option<&TimestampManifest> {
        self.timestamp_manifests.iter().find(|m| m.id == id)
    }
}

/// A message part the caller digested itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    pub name: String,
    pub digest: DigestValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampCoverage {
    /// The token stamps the signature value bytes directly.
    SignatureValue,
    /// The token stamps the manifest object with this id.
    Manifest { id: String },
}

#[derive(Debug, Clone)]
pub struct EvidenceTimestamp {
    pub token: TimestampToken,
    pub coverage: TimestampCoverage,
}

#[derive(Debug, Clone, Default)]
pub struct EvidenceRecord {
    pub signature: SignatureDocument,
    /// Serialized hash chain result, present for batch signatures.
    pub hash_chain_result: Option<Vec<u8>>,
    /// Serialized hash chain documents by URI.
    pub hash_chains: BTreeMap<String, Vec<u8>>,
    pub parts: Vec<MessagePart>,
    pub timestamps: Vec<EvidenceTimestamp>,
}

impl EvidenceRecord {
    /// A batch record carries a hash chain result that its signature references.
    pub fn is_batch(&self) -> bool {
        self.hash_chain_result.is_some() && self.signature.references_uri(HASH_CHAIN_RESULT_URI)
    }

    pub fn part(&self, name: &str) -> Option<&MessagePart> {
        self.parts.iter().find(|p| p.name == name)
    }
}
