// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Owned X.509 certificate model.
//!
//! Certificates are parsed once with `x509-parser` and the fields the verifiers need are
//! copied out, so a [`Certificate`] can be cloned, shared across threads and stored in
//! trust configuration snapshots without borrowing the DER.

use crate::crypto::SignaturePrimitive;
use crate::error::CertificateError;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use x509_parser::extensions::ParsedExtension;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsageFlags {
    pub digital_signature: bool,
    pub non_repudiation: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
}

#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    subject_name: String,
    issuer_name: String,
    common_name: Option<String>,
    serial_raw: Vec<u8>,
    not_before: i64,
    not_after: i64,
    spki_der: Vec<u8>,
    public_key_bits: Vec<u8>,
    tbs_der: Vec<u8>,
    signature_oid: String,
    signature: Vec<u8>,
    is_ca: bool,
    path_len_constraint: Option<u32>,
    key_usage: Option<KeyUsageFlags>,
    eku_ocsp_signing: bool,
    eku_time_stamping: bool,
    subject_key_identifier: Option<Vec<u8>>,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) =
            x509_parser::parse_x509_certificate(der).map_err(|e| CertificateError::InvalidDer(e.to_string()))?;

        let basic_constraints = cert
            .basic_constraints()
            .map_err(|e| CertificateError::InvalidExtension(format!("basic constraints: {e}")))?;
        let (is_ca, path_len_constraint) = match basic_constraints {
            Some(bc) => (bc.value.ca, bc.value.path_len_constraint),
            None => (false, None),
        };

        let key_usage = cert
            .key_usage()
            .map_err(|e| CertificateError::InvalidExtension(format!("key usage: {e}")))?
            .map(|ku| KeyUsageFlags {
                digital_signature: ku.value.digital_signature(),
                non_repudiation: ku.value.non_repudiation(),
                key_cert_sign: ku.value.key_cert_sign(),
                crl_sign: ku.value.crl_sign(),
            });

        let (eku_ocsp_signing, eku_time_stamping) = match cert
            .extended_key_usage()
            .map_err(|e| CertificateError::InvalidExtension(format!("extended key usage: {e}")))?
        {
            Some(eku) => (eku.value.ocsp_signing, eku.value.time_stamping),
            None => (false, false),
        };

        let mut subject_key_identifier = None;
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectKeyIdentifier(kid) = ext.parsed_extension() {
                subject_key_identifier = Some(kid.0.to_vec());
            }
        }

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        Ok(Self {
            der: der.to_vec(),
            subject_raw: cert.tbs_certificate.subject.as_raw().to_vec(),
            issuer_raw: cert.tbs_certificate.issuer.as_raw().to_vec(),
            subject_name: cert.tbs_certificate.subject.to_string(),
            issuer_name: cert.tbs_certificate.issuer.to_string(),
            common_name,
            serial_raw: cert.tbs_certificate.raw_serial().to_vec(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            spki_der: cert.tbs_certificate.subject_pki.raw.to_vec(),
            public_key_bits: cert.tbs_certificate.subject_pki.subject_public_key.data.to_vec(),
            // `x509-parser` keeps the raw DER for TBSCertificate; expose it via `AsRef`.
            tbs_der: cert.tbs_certificate.as_ref().to_vec(),
            signature_oid: cert.signature_algorithm.algorithm.to_string(),
            signature: cert.signature_value.data.to_vec(),
            is_ca,
            path_len_constraint,
            key_usage,
            eku_ocsp_signing,
            eku_time_stamping,
            subject_key_identifier,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Raw DER encoding of the subject name.
    pub fn subject_raw(&self) -> &[u8] {
        &self.subject_raw
    }

    /// Raw DER encoding of the issuer name.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn issuer_name(&self) -> &str {
        &self.issuer_name
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// Serial number as the content bytes of the DER INTEGER.
    pub fn serial_raw(&self) -> &[u8] {
        &self.serial_raw
    }

    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// Contents of the subjectPublicKey BIT STRING.
    pub fn public_key_bits(&self) -> &[u8] {
        &self.public_key_bits
    }

    pub fn tbs_der(&self) -> &[u8] {
        &self.tbs_der
    }

    pub fn signature_oid(&self) -> &str {
        &self.signature_oid
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    pub fn path_len_constraint(&self) -> Option<u32> {
        self.path_len_constraint
    }

    /// `None` when the certificate carries no key usage extension.
    pub fn key_usage(&self) -> Option<KeyUsageFlags> {
        self.key_usage
    }

    pub fn has_ocsp_signing_usage(&self) -> bool {
        self.eku_ocsp_signing
    }

    pub fn has_time_stamping_usage(&self) -> bool {
        self.eku_time_stamping
    }

    pub fn subject_key_identifier(&self) -> Option<&[u8]> {
        self.subject_key_identifier.as_deref()
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject_raw == self.issuer_raw
    }

    /// Inclusive validity check at `at` (Unix seconds).
    pub fn is_valid_at(&self, at: i64) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    pub fn fingerprint_sha256(&self) -> [u8; 32] {
        Sha256::digest(&self.der).into()
    }

    /// SHA-1 over the public key bits; the form OCSP uses for key-hash identifiers.
    pub fn public_key_sha1(&self) -> Vec<u8> {
        Sha1::digest(&self.public_key_bits).to_vec()
    }

    /// Checks that `issuer` is named as the issuer of this certificate and that its key
    /// produced this certificate's signature.
    pub fn verify_issued_by(&self, issuer: &Certificate, primitive: &dyn SignaturePrimitive) -> Result<(), String> {
        if self.issuer_raw != issuer.subject_raw {
            return Err(format!(
                "certificate issuer '{}' does not match '{}'",
                self.issuer_name, issuer.subject_name
            ));
        }
        primitive.verify(&issuer.spki_der, &self.signature_oid, &self.tbs_der, &self.signature)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject_name)
            .field("issuer", &self.issuer_name)
            .field("serial", &hex::encode(&self.serial_raw))
            .finish()
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (serial {})", self.subject_name, hex::encode(&self.serial_raw))
    }
}
