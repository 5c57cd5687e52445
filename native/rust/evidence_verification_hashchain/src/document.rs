// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Serialized forms of hash chain results and hash chain documents.

use evidence_verification_core::{DigestMethod, ErrorKind, VerifyError, VerifyResult};
use serde::{Deserialize, Serialize};

/// The signed top of a hash chain: a digest plus the URI of the step it commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashChainResult {
    pub digest_method: String,
    #[serde(with = "evidence_verification_core::serde_base64")]
    pub digest_value: Vec<u8>,
    pub uri: String,
}

impl HashChainResult {
    pub fn from_json_slice(bytes: &[u8]) -> VerifyResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VerifyError::new(ErrorKind::MalformedReference, format!("invalid hash chain result: {e}")))
    }

    pub fn to_json_vec(&self) -> VerifyResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| VerifyError::new(ErrorKind::MalformedReference, format!("cannot encode hash chain result: {e}")))
    }

    pub fn method(&self) -> VerifyResult<DigestMethod> {
        parse_digest_method(&self.digest_method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashChain {
    pub default_digest_method: String,
    pub hash_steps: Vec<HashStep>,
}

impl HashChain {
    pub fn from_json_slice(bytes: &[u8]) -> VerifyResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VerifyError::new(ErrorKind::MalformedReference, format!("invalid hash chain: {e}")))
    }

    pub fn to_json_vec(&self) -> VerifyResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| VerifyError::new(ErrorKind::MalformedReference, format!("cannot encode hash chain: {e}")))
    }

    pub fn step(&self, id: &str) -> Option<&HashStep> {
        self.hash_steps.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashStep {
    pub id: String,
    pub values: Vec<AbstractValue>,
}

/// One constituent digest of a hash step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AbstractValue {
    DataRef(DataRef),
    StepRef(StepRef),
    HashValue(HashValue),
}

impl AbstractValue {
    pub fn digest_method_override(&self) -> Option<&str> {
        match self {
            Self::DataRef(v) => v.digest_method.as_deref(),
            Self::StepRef(v) => v.digest_method.as_deref(),
            Self::HashValue(v) => v.digest_method.as_deref(),
        }
    }
}

/// Reference to external data, with the digest the producer computed over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRef {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_method: Option<String>,
    #[serde(with = "evidence_verification_core::serde_base64")]
    pub digest_value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<String>,
}

/// Reference to another hash step, `<document-uri>#<step-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRef {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_method: Option<String>,
    #[serde(with = "evidence_verification_core::serde_base64")]
    pub digest_value: Vec<u8>,
}

pub(crate) fn parse_digest_method(uri: &str) -> VerifyResult<DigestMethod> {
    DigestMethod::from_uri(uri)
        .ok_or_else(|| VerifyError::new(ErrorKind::MalformedReference, format!("unsupported digest method: {uri}")))
}
