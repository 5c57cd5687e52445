// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Timestamp token verification.

pub mod token;
pub mod verifier;

pub use token::{JsonTstInfoDecoder, SignerIdentifier, TimestampToken, TstInfo, TstInfoDecoder};
pub use verifier::TimestampVerifier;
