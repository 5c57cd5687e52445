// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use evidence_verification_core::DigestValue;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

pub const BASE64_TRANSFORM: &str = "http://www.w3.org/2000/09/xmldsig#base64";

/// Supplies the bytes behind hash chain URIs.
///
/// Used both for hash chain documents (step URIs without their fragment) and for the data
/// referenced by `DataRef` values. Implementations may block; callers that need a deadline
/// enforce it around the resolver.
pub trait HashChainReferenceResolver: Send + Sync {
    /// Returns `Ok(None)` when nothing is known under `uri`.
    fn resolve(&self, uri: &str) -> std::io::Result<Option<Box<dyn Read + Send + '_>>>;

    /// Returning false makes the verifier trust the embedded `digest` for `uri` without
    /// fetching the data.
    fn should_resolve(&self, uri: &str, digest: &DigestValue) -> bool {
        let _ = (uri, digest);
        true
    }

    /// Applies a transform other than the built-in base64 decode.
    fn transform(&self, algorithm: &str, data: Vec<u8>) -> Result<Vec<u8>, String> {
        let _ = data;
        Err(format!("unsupported transform: {algorithm}"))
    }
}

/// Resolver over an in-memory URI map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResolver {
    entries: BTreeMap<String, Vec<u8>>,
    skip: Vec<String>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, uri: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(uri.into(), bytes.into());
        self
    }

    /// Marks `uri` as not fetchable; its embedded digest is trusted.
    pub fn with_unresolvable(mut self, uri: impl Into<String>) -> Self {
        self.skip.push(uri.into());
        self
    }
}

impl HashChainReferenceResolver for InMemoryResolver {
    fn resolve(&self, uri: &str) -> std::io::Result<Option<Box<dyn Read + Send + '_>>> {
        Ok(self
            .entries
            .get(uri)
            .map(|bytes| Box::new(Cursor::new(bytes.as_slice())) as Box<dyn Read + Send + '_>))
    }

    fn should_resolve(&self, uri: &str, _digest: &DigestValue) -> bool {
        !self.skip.iter().any(|s| s == uri)
    }
}
