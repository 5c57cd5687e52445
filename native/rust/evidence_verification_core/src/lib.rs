// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared building blocks for evidence verification.
//!
//! This crate holds what every verifier in the workspace needs: the typed failure model
//! ([`error`]), digest methods and values ([`digest`]), an owned X.509 certificate model
//! ([`certificate`]), the injectable signature primitive ([`crypto`]) and immutable trust
//! configuration snapshots ([`config`]).

pub mod certificate;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod serde_base64;

pub use certificate::{Certificate, KeyUsageFlags};
pub use config::{TrustConfiguration, TrustConfigurationBuilder, TrustConfigurationHandle};
pub use crypto::{RustCryptoSignaturePrimitive, SignaturePrimitive};
pub use digest::{DigestMethod, DigestValue};
pub use error::{CertificateError, ConfigError, ErrorKind, VerifyError, VerifyResult};
