// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! OCSP responses as archived with evidence.
//!
//! An [`OcspResponse`] is only the raw `tbsResponseData` the responder signed, the signature
//! over it and the embedded certificates. The fields a verifier evaluates are obtained by
//! decoding the signed bytes with an [`OcspResponseDecoder`], so they cannot disagree with
//! what the signature covers.

use evidence_verification_core::{serde_base64, Certificate, DigestMethod, ErrorKind, VerifyError, VerifyResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The `CertID` an OCSP response is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OcspCertId {
    pub hash_method: DigestMethod,
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    pub serial_number: Vec<u8>,
}

impl OcspCertId {
    pub fn for_certificate(hash_method: DigestMethod, subject: &Certificate, issuer: &Certificate) -> Self {
        Self {
            hash_method,
            issuer_name_hash: hash_method.digest(issuer.subject_raw()),
            issuer_key_hash: hash_method.digest(issuer.public_key_bits()),
            serial_number: subject.serial_raw().to_vec(),
        }
    }

    /// True when this identifier names `subject` as issued by `issuer`.
    pub fn identifies(&self, subject: &Certificate, issuer: &Certificate) -> bool {
        *self == Self::for_certificate(self.hash_method, subject, issuer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponderId {
    /// Raw DER of the responder's subject name.
    ByName(Vec<u8>),
    /// SHA-1 over the responder's public key bits.
    ByKeyHash(Vec<u8>),
}

impl ResponderId {
    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            Self::ByName(name) => name.as_slice() == cert.subject_raw(),
            Self::ByKeyHash(hash) => *hash == cert.public_key_sha1(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked { revocation_time: i64, reason: Option<u8> },
    Unknown,
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => f.write_str("good"),
            Self::Revoked { revocation_time, .. } => write!(f, "revoked at {revocation_time}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// The single response of a `tbsResponseData`, as decoded from the signed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponseData {
    pub cert_id: OcspCertId,
    pub status: CertStatus,
    pub this_update: i64,
    pub next_update: Option<i64>,
    pub produced_at: i64,
    pub responder_id: ResponderId,
}

impl OcspResponseData {
    pub fn is_for(&self, subject: &Certificate, issuer: &Certificate) -> bool {
        self.cert_id.identifies(subject, issuer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponse {
    /// Encoded `tbsResponseData`, the bytes covered by `signature`.
    tbs_response_data: Vec<u8>,
    signature_algorithm_oid: String,
    signature: Vec<u8>,
    /// Certificates embedded in the basic response.
    certificates: Vec<Certificate>,
}

impl OcspResponse {
    pub fn new(
        tbs_response_data: Vec<u8>,
        signature_algorithm_oid: impl Into<String>,
        signature: Vec<u8>,
        certificates: Vec<Certificate>,
    ) -> Self {
        Self {
            tbs_response_data,
            signature_algorithm_oid: signature_algorithm_oid.into(),
            signature,
            certificates,
        }
    }

    pub fn tbs_response_data(&self) -> &[u8] {
        &self.tbs_response_data
    }

    pub fn signature_algorithm_oid(&self) -> &str {
        &self.signature_algorithm_oid
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Digest identifying the response by the bytes the responder signed.
    pub fn identity_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.tbs_response_data.len() as u64).to_be_bytes());
        hasher.update(&self.tbs_response_data);
        hasher.update(&self.signature);
        hasher.finalize().into()
    }
}

/// Decodes `tbsResponseData` into the fields the verifier evaluates.
///
/// Implementations must be deterministic: validation outcomes are cached by the signed
/// bytes, not by the decoded fields.
pub trait OcspResponseDecoder: Send + Sync {
    fn decode(&self, tbs_response_data: &[u8]) -> VerifyResult<OcspResponseData>;
}

/// Decoder for the JSON form of `tbsResponseData` stored with archived evidence.
///
/// ```json
/// { "certId": { "hashAlgorithm": "1.3.14.3.2.26", "issuerNameHash": "<b64>",
///               "issuerKeyHash": "<b64>", "serialNumber": "<b64>" },
///   "status": { "kind": "good" },
///   "thisUpdate": 1748735940, "nextUpdate": 1748739600, "producedAt": 1748735940,
///   "responderId": { "byName": "<b64 der>" } }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonOcspResponseDecoder;

impl JsonOcspResponseDecoder {
    pub fn encode(data: &OcspResponseData) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&ResponseDataJson::from(data))
    }
}

impl OcspResponseDecoder for JsonOcspResponseDecoder {
    fn decode(&self, tbs_response_data: &[u8]) -> VerifyResult<OcspResponseData> {
        let json: ResponseDataJson = serde_json::from_slice(tbs_response_data)
            .map_err(|e| malformed(format!("cannot decode ocsp response data: {e}")))?;
        json.into_data()
    }
}

fn malformed(message: String) -> VerifyError {
    VerifyError::new(ErrorKind::MalformedSignature, message)
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseDataJson {
    cert_id: CertIdJson,
    status: CertStatusJson,
    this_update: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_update: Option<i64>,
    produced_at: i64,
    responder_id: ResponderIdJson,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertIdJson {
    /// Dotted OID of the hash algorithm.
    hash_algorithm: String,
    #[serde(with = "serde_base64")]
    issuer_name_hash: Vec<u8>,
    #[serde(with = "serde_base64")]
    issuer_key_hash: Vec<u8>,
    #[serde(with = "serde_base64")]
    serial_number: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum CertStatusJson {
    Good,
    Revoked {
        #[serde(rename = "revocationTime")]
        revocation_time: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<u8>,
    },
    Unknown,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ResponderIdJson {
    ByName(#[serde(with = "serde_base64")] Vec<u8>),
    ByKeyHash(#[serde(with = "serde_base64")] Vec<u8>),
}

impl From<&OcspResponseData> for ResponseDataJson {
    fn from(data: &OcspResponseData) -> Self {
        Self {
            cert_id: CertIdJson {
                hash_algorithm: data.cert_id.hash_method.oid().to_string(),
                issuer_name_hash: data.cert_id.issuer_name_hash.clone(),
                issuer_key_hash: data.cert_id.issuer_key_hash.clone(),
                serial_number: data.cert_id.serial_number.clone(),
            },
            status: match &data.status {
                CertStatus::Good => CertStatusJson::Good,
                CertStatus::Revoked { revocation_time, reason } => CertStatusJson::Revoked {
                    revocation_time: *revocation_time,
                    reason: *reason,
                },
                CertStatus::Unknown => CertStatusJson::Unknown,
            },
            this_update: data.this_update,
            next_update: data.next_update,
            produced_at: data.produced_at,
            responder_id: match &data.responder_id {
                ResponderId::ByName(name) => ResponderIdJson::ByName(name.clone()),
                ResponderId::ByKeyHash(hash) => ResponderIdJson::ByKeyHash(hash.clone()),
            },
        }
    }
}

impl ResponseDataJson {
    fn into_data(self) -> VerifyResult<OcspResponseData> {
        let json = self;
        let hash_method = DigestMethod::from_oid(&json.cert_id.hash_algorithm).ok_or_else(|| {
            malformed(format!(
                "unsupported ocsp cert id hash algorithm {}",
                json.cert_id.hash_algorithm
            ))
        })?;
        Ok(OcspResponseData {
            cert_id: OcspCertId {
                hash_method,
                issuer_name_hash: json.cert_id.issuer_name_hash,
                issuer_key_hash: json.cert_id.issuer_key_hash,
                serial_number: json.cert_id.serial_number,
            },
            status: match json.status {
                CertStatusJson::Good => CertStatus::Good,
                CertStatusJson::Revoked { revocation_time, reason } => CertStatus::Revoked { revocation_time, reason },
                CertStatusJson::Unknown => CertStatus::Unknown,
            },
            this_update: json.this_update,
            next_update: json.next_update,
            produced_at: json.produced_at,
            responder_id: match json.responder_id {
                ResponderIdJson::ByName(name) => ResponderId::ByName(name),
                ResponderIdJson::ByKeyHash(hash) => ResponderId::ByKeyHash(hash),
            },
        })
    }
}
