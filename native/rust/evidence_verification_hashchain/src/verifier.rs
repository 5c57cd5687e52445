// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hash chain verification.
//!
//! A hash chain result names one step of a hash chain document and carries the digest of
//! that step's concatenated values. Verification walks the reference graph from that step,
//! recomputing every digest it can reach, and finally checks that every declared input was
//! consumed by exactly one `DataRef`.
//!
//! The reference graph is a DAG. Documents are fetched once per call and keyed by document
//! URI; step results are memoized by `(document, step id)` so a shared sub-step is resolved
//! once no matter how many steps refer to it.

use crate::digest_list::encode_digest_list;
use crate::document::{parse_digest_method, AbstractValue, DataRef, HashChain, HashChainResult};
use crate::resolver::{HashChainReferenceResolver, BASE64_TRANSFORM};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use evidence_verification_core::{DigestMethod, DigestValue, ErrorKind, VerifyError, VerifyResult};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verifies `result` against the graph reachable through `resolver`.
    ///
    /// `inputs` maps data URIs to digests computed by the caller. A `DataRef` naming an
    /// input with the same digest method must carry that digest; every input must be named
    /// by exactly one `DataRef`.
    pub fn verify(
        result: &HashChainResult,
        resolver: &dyn HashChainReferenceResolver,
        inputs: &BTreeMap<String, DigestValue>,
    ) -> VerifyResult<()> {
        tracing::debug!(uri = %result.uri, inputs = inputs.len(), "verifying hash chain");

        let method = result.method()?;
        let mut resolution = Resolution::new(resolver, inputs);
        let top = resolution.resolve_step(&result.uri, None)?;

        if method.digest(&top) != result.digest_value {
            return Err(VerifyError::new(
                ErrorKind::DigestMismatch,
                format!("hash chain result digest does not match step {}", result.uri),
            ));
        }

        resolution.check_all_inputs_used()
    }

    /// Parses the serialized hash chain result and verifies it.
    pub fn verify_result_bytes(
        result_json: &[u8],
        resolver: &dyn HashChainReferenceResolver,
        inputs: &BTreeMap<String, DigestValue>,
    ) -> VerifyResult<()> {
        let result = HashChainResult::from_json_slice(result_json)?;
        Self::verify(&result, resolver, inputs)
    }
}

type StepKey = (String, String);

struct Resolution<'a> {
    resolver: &'a dyn HashChainReferenceResolver,
    inputs: &'a BTreeMap<String, DigestValue>,
    used_inputs: BTreeSet<String>,
    documents: HashMap<String, Arc<HashChain>>,
    steps: HashMap<StepKey, Arc<Vec<u8>>>,
    in_progress: HashSet<StepKey>,
}

impl<'a> Resolution<'a> {
    fn new(resolver: &'a dyn HashChainReferenceResolver, inputs: &'a BTreeMap<String, DigestValue>) -> Self {
        Self {
            resolver,
            inputs,
            used_inputs: BTreeSet::new(),
            documents: HashMap::new(),
            steps: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Returns the digest-list encoding of the step's values.
    fn resolve_step(&mut self, uri: &str, current_document: Option<&str>) -> VerifyResult<Arc<Vec<u8>>> {
        let key = split_step_uri(uri, current_document)?;
        if let Some(done) = self.steps.get(&key) {
            tracing::trace!(uri, "hash step already resolved");
            return Ok(done.clone());
        }
        if !self.in_progress.insert(key.clone()) {
            return Err(VerifyError::new(
                ErrorKind::MalformedReference,
                format!("hash step reference cycle at {uri}"),
            ));
        }

        tracing::trace!(uri, "resolving hash step");
        let (document_uri, step_id) = &key;
        let chain = self.document(document_uri)?;
        let step = chain.step(step_id).ok_or_else(|| {
            VerifyError::new(
                ErrorKind::UnresolvedReference,
                format!("hash step {step_id} not found in {document_uri}"),
            )
        })?;
        let default_method = parse_digest_method(&chain.default_digest_method)?;

        let mut digests = Vec::with_capacity(step.values.len());
        for value in &step.values {
            let method = match value.digest_method_override() {
                Some(m) => parse_digest_method(m)?,
                None => default_method,
            };
            let digest = match value {
                AbstractValue::DataRef(data_ref) => self.resolve_data_ref(data_ref, method)?,
                AbstractValue::StepRef(step_ref) => {
                    let resolved = self.resolve_step(&step_ref.uri, Some(document_uri.as_str()))?;
                    DigestValue::compute(method, &resolved)
                }
                AbstractValue::HashValue(hash_value) => DigestValue::new(method, hash_value.digest_value.clone()),
            };
            digests.push(digest);
        }

        let encoded = Arc::new(encode_digest_list(&digests));
        self.in_progress.remove(&key);
        self.steps.insert(key, encoded.clone());
        Ok(encoded)
    }

    fn resolve_data_ref(&mut self, data_ref: &DataRef, method: DigestMethod) -> VerifyResult<DigestValue> {
        let embedded = DigestValue::new(method, data_ref.digest_value.clone());

        if let Some(input) = self.inputs.get(&data_ref.uri) {
            if !self.used_inputs.insert(data_ref.uri.clone()) {
                return Err(VerifyError::new(
                    ErrorKind::MalformedReference,
                    format!("input {} is referenced more than once", data_ref.uri),
                ));
            }
            if input.method() == method {
                if input.value() != embedded.value() {
                    return Err(VerifyError::new(
                        ErrorKind::DigestMismatch,
                        format!("invalid digest value in hash chain reference to input {}", data_ref.uri),
                    ));
                }
                return Ok(input.clone());
            }
        }

        if !self.resolver.should_resolve(&data_ref.uri, &embedded) {
            tracing::trace!(uri = %data_ref.uri, "trusting embedded digest");
            return Ok(embedded);
        }

        let computed = self.fetch_and_digest(&data_ref.uri, &data_ref.transforms, method)?;
        if computed != embedded.value() {
            tracing::debug!(uri = %data_ref.uri, calculated = %STANDARD.encode(&computed), "hash chain reference mismatch");
            return Err(VerifyError::new(
                ErrorKind::DigestMismatch,
                format!("invalid digest value in hash chain reference to {}", data_ref.uri),
            ));
        }
        Ok(embedded)
    }

    fn fetch_and_digest(&self, uri: &str, transforms: &[String], method: DigestMethod) -> VerifyResult<Vec<u8>> {
        let resolver = self.resolver;
        let mut reader = resolver
            .resolve(uri)
            .map_err(|e| unresolved(uri, &e.to_string()))?
            .ok_or_else(|| unresolved(uri, "no data"))?;

        if transforms.is_empty() {
            return method
                .digest_reader(&mut reader)
                .map_err(|e| unresolved(uri, &e.to_string()));
        }

        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| unresolved(uri, &e.to_string()))?;
        for transform in transforms {
            data = if transform == BASE64_TRANSFORM {
                let text: Vec<u8> = data.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
                STANDARD.decode(text).map_err(|e| {
                    VerifyError::new(ErrorKind::MalformedReference, format!("base64 transform of {uri} failed: {e}"))
                })?
            } else {
                resolver.transform(transform, data).map_err(|e| {
                    VerifyError::new(ErrorKind::MalformedReference, format!("transform of {uri} failed: {e}"))
                })?
            };
        }
        Ok(method.digest(&data))
    }

    fn document(&mut self, uri: &str) -> VerifyResult<Arc<HashChain>> {
        if let Some(chain) = self.documents.get(uri) {
            return Ok(chain.clone());
        }

        let mut reader = self
            .resolver
            .resolve(uri)
            .map_err(|e| unresolved(uri, &e.to_string()))?
            .ok_or_else(|| unresolved(uri, "no hash chain document"))?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| unresolved(uri, &e.to_string()))?;

        let chain = Arc::new(HashChain::from_json_slice(&bytes)?);
        tracing::trace!(uri, steps = chain.hash_steps.len(), "loaded hash chain document");
        self.documents.insert(uri.to_string(), chain.clone());
        Ok(chain)
    }

    fn check_all_inputs_used(&self) -> VerifyResult<()> {
        tracing::trace!(used = ?self.used_inputs, "checking referenced inputs");
        let unused: Vec<&str> = self
            .inputs
            .keys()
            .filter(|k| !self.used_inputs.contains(*k))
            .map(String::as_str)
            .collect();
        if unused.is_empty() {
            return Ok(());
        }
        Err(VerifyError::new(
            ErrorKind::UnusedInput,
            format!("some inputs were not referenced by the hash chain: {}", unused.join(", ")),
        ))
    }
}

/// Splits `<document>#<step>`; an empty document part means `current_document`.
fn split_step_uri(uri: &str, current_document: Option<&str>) -> VerifyResult<StepKey> {
    let malformed = |why: &str| VerifyError::new(ErrorKind::MalformedReference, format!("invalid step URI {uri}: {why}"));

    let (document, fragment) = uri.split_once('#').ok_or_else(|| malformed("missing fragment"))?;
    if fragment.is_empty() {
        return Err(malformed("empty fragment"));
    }
    let document = if document.is_empty() {
        current_document.ok_or_else(|| malformed("no enclosing hash chain document"))?
    } else {
        document
    };
    Ok((document.to_string(), fragment.to_string()))
}

fn unresolved(uri: &str, why: &str) -> VerifyError {
    VerifyError::new(ErrorKind::UnresolvedReference, format!("cannot resolve URI {uri}: {why}"))
}
