// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Digest algorithms and digest values.
//!
//! Digest methods are identified by XML-DSig URIs in hash-chain documents and by OIDs in
//! OCSP certificate identifiers and timestamp imprints. Both identifier forms map onto the
//! same [`DigestMethod`].

use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::io::Read;

const READ_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestMethod {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestMethod {
    pub const ALL: [DigestMethod; 5] = [
        DigestMethod::Sha1,
        DigestMethod::Sha224,
        DigestMethod::Sha256,
        DigestMethod::Sha384,
        DigestMethod::Sha512,
    ];

    pub fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha224 => "http://www.w3.org/2001/04/xmldsig-more#sha224",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    pub fn oid(self) -> &'static str {
        match self {
            Self::Sha1 => "1.3.14.3.2.26",
            Self::Sha224 => "2.16.840.1.101.3.4.2.4",
            Self::Sha256 => "2.16.840.1.101.3.4.2.1",
            Self::Sha384 => "2.16.840.1.101.3.4.2.2",
            Self::Sha512 => "2.16.840.1.101.3.4.2.3",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.uri() == uri)
    }

    pub fn from_oid(oid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.oid() == oid)
    }

    pub fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha224 => Sha224::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Streams `reader` to EOF through the digest.
    pub fn digest_reader<R: Read + ?Sized>(self, reader: &mut R) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Sha1 => hash_reader::<Sha1, R>(reader),
            Self::Sha224 => hash_reader::<Sha224, R>(reader),
            Self::Sha256 => hash_reader::<Sha256, R>(reader),
            Self::Sha384 => hash_reader::<Sha384, R>(reader),
            Self::Sha512 => hash_reader::<Sha512, R>(reader),
        }
    }
}

impl fmt::Display for DigestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

fn hash_reader<D: Digest, R: Read + ?Sized>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

/// A digest paired with the method that produced it.
///
/// Equality is defined over both fields: the same bytes under different methods are
/// different values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DigestValue {
    method: DigestMethod,
    value: Vec<u8>,
}

impl DigestValue {
    pub fn new(method: DigestMethod, value: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            value: value.into(),
        }
    }

    pub fn compute(method: DigestMethod, data: &[u8]) -> Self {
        Self::new(method, method.digest(data))
    }

    pub fn method(&self) -> DigestMethod {
        self.method
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// True when `data` digests to this value under this value's method.
    pub fn matches_data(&self, data: &[u8]) -> bool {
        self.method.digest(data) == self.value
    }
}

impl fmt::Display for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.method.uri(), hex::encode(&self.value))
    }
}
