// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Length-delimited concatenation of digest values.
//!
//! Each value is written as `u16 BE len(method uri) || method uri || u32 BE len(digest) ||
//! digest`. The delimiters make the encoding injective, so two different digest lists never
//! concatenate to the same bytes.

use evidence_verification_core::DigestValue;

pub fn encode_digest_list(values: &[DigestValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        let uri = value.method().uri().as_bytes();
        // Method URIs are a fixed set of short constants.
        out.extend_from_slice(&(uri.len() as u16).to_be_bytes());
        out.extend_from_slice(uri);
        out.extend_from_slice(&(value.value().len() as u32).to_be_bytes());
        out.extend_from_slice(value.value());
    }
    out
}
