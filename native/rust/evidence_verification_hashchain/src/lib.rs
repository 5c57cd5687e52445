// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hash chain verification for batch-signed evidence.
//!
//! A batch signature covers one hash chain result instead of each message. The result
//! commits to a step of a hash chain document, whose steps combine data references,
//! references to other steps and literal digests. See [`verifier::HashChainVerifier`].

pub mod digest_list;
pub mod document;
pub mod resolver;
pub mod verifier;

pub use document::{AbstractValue, DataRef, HashChain, HashChainResult, HashStep, HashValue, StepRef};
pub use resolver::{HashChainReferenceResolver, InMemoryResolver};
pub use verifier::HashChainVerifier;
