// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Timestamp tokens as archived with evidence.
//!
//! A [`TimestampToken`] keeps the encoded `TSTInfo` the authority signed, the signature over
//! it and the identifier of the signing certificate. The stamped imprint and generation time
//! are only ever read by decoding the signed content with a [`TstInfoDecoder`].

use evidence_verification_core::{serde_base64, Certificate, DigestMethod, ErrorKind, VerifyError, VerifyResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a timestamp token names the certificate of its signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerIdentifier {
    IssuerAndSerial {
        /// Raw DER of the issuer name.
        issuer: Vec<u8>,
        serial_number: Vec<u8>,
    },
    SubjectKeyIdentifier(Vec<u8>),
}

impl SignerIdentifier {
    pub fn for_certificate(cert: &Certificate) -> Self {
        Self::IssuerAndSerial {
            issuer: cert.issuer_raw().to_vec(),
            serial_number: cert.serial_raw().to_vec(),
        }
    }

    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            Self::IssuerAndSerial { issuer, serial_number } => {
                issuer.as_slice() == cert.issuer_raw() && serial_number.as_slice() == cert.serial_raw()
            }
            Self::SubjectKeyIdentifier(kid) => cert.subject_key_identifier() == Some(kid.as_slice()),
        }
    }
}

impl fmt::Display for SignerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IssuerAndSerial { serial_number, .. } => write!(f, "serial {}", hex::encode(serial_number)),
            Self::SubjectKeyIdentifier(kid) => write!(f, "key id {}", hex::encode(kid)),
        }
    }
}

/// The `TSTInfo` fields a verifier evaluates, as decoded from the signed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TstInfo {
    pub hash_method: DigestMethod,
    pub message_imprint: Vec<u8>,
    pub gen_time: i64,
    pub serial_number: Vec<u8>,
}

/// An RFC 3161 timestamp token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampToken {
    /// Unsigned, like the `sid` of a CMS signer info. A wrong value only fails the lookup.
    signer: SignerIdentifier,
    /// Encoded `TSTInfo`, the bytes covered by `signature`.
    signed_content: Vec<u8>,
    signature_algorithm_oid: String,
    signature: Vec<u8>,
}

impl TimestampToken {
    pub fn new(
        signer: SignerIdentifier,
        signed_content: Vec<u8>,
        signature_algorithm_oid: impl Into<String>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            signer,
            signed_content,
            signature_algorithm_oid: signature_algorithm_oid.into(),
            signature,
        }
    }

    pub fn signer(&self) -> &SignerIdentifier {
        &self.signer
    }

    pub fn signed_content(&self) -> &[u8] {
        &self.signed_content
    }

    pub fn signature_algorithm_oid(&self) -> &str {
        &self.signature_algorithm_oid
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

/// Decodes the signed content of a token into its `TSTInfo` fields.
pub trait TstInfoDecoder: Send + Sync {
    fn decode(&self, signed_content: &[u8]) -> VerifyResult<TstInfo>;
}

/// Decoder for the JSON form of `TSTInfo` stored with archived evidence:
/// `{"hashAlgorithm": "<oid>", "messageImprint": "<b64>", "genTime": <unix>, "serialNumber": "<b64>"}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTstInfoDecoder;

impl JsonTstInfoDecoder {
    pub fn encode(info: &TstInfo) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&TstInfoJson {
            hash_algorithm: info.hash_method.oid().to_string(),
            message_imprint: info.message_imprint.clone(),
            gen_time: info.gen_time,
            serial_number: info.serial_number.clone(),
        })
    }
}

impl TstInfoDecoder for JsonTstInfoDecoder {
    fn decode(&self, signed_content: &[u8]) -> VerifyResult<TstInfo> {
        let json: TstInfoJson = serde_json::from_slice(signed_content).map_err(|e| {
            VerifyError::new(ErrorKind::MalformedSignature, format!("cannot decode timestamp info: {e}"))
        })?;
        let hash_method = DigestMethod::from_oid(&json.hash_algorithm).ok_or_else(|| {
            VerifyError::new(
                ErrorKind::MalformedSignature,
                format!("unsupported timestamp hash algorithm {}", json.hash_algorithm),
            )
        })?;
        Ok(TstInfo {
            hash_method,
            message_imprint: json.message_imprint,
            gen_time: json.gen_time,
            serial_number: json.serial_number,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TstInfoJson {
    hash_algorithm: String,
    #[serde(with = "serde_base64")]
    message_imprint: Vec<u8>,
    gen_time: i64,
    #[serde(with = "serde_base64")]
    serial_number: Vec<u8>,
}
