// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Asymmetric signature verification.

use p256::elliptic_curve::sec1::ToEncodedPoint as _;
use rsa::pkcs1v15;
use rsa::pkcs8::der::oid::AssociatedOid;
use rsa::pkcs8::DecodePublicKey as _;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::Verifier;

pub const SHA256_WITH_RSA_OID: &str = "1.2.840.113549.1.1.11";
pub const SHA384_WITH_RSA_OID: &str = "1.2.840.113549.1.1.12";
pub const SHA512_WITH_RSA_OID: &str = "1.2.840.113549.1.1.13";
pub const ECDSA_WITH_SHA256_OID: &str = "1.2.840.10045.4.3.2";
pub const ECDSA_WITH_SHA384_OID: &str = "1.2.840.10045.4.3.3";
pub const ECDSA_WITH_SHA512_OID: &str = "1.2.840.10045.4.3.4";

/// Verifies a signature made by the key in `spki_der` over `message`.
///
/// Implementations must be safe to call concurrently. Errors are plain strings, the
/// caller maps them onto the failure kind for its own stage.
pub trait SignaturePrimitive: Send + Sync {
    fn verify(&self, spki_der: &[u8], algorithm_oid: &str, message: &[u8], signature: &[u8]) -> Result<(), String>;
}

/// RustCrypto-backed [`SignaturePrimitive`] covering RSA PKCS#1 v1.5 and ECDSA over the NIST curves.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoSignaturePrimitive;

impl SignaturePrimitive for RustCryptoSignaturePrimitive {
    fn verify(&self, spki_der: &[u8], algorithm_oid: &str, message: &[u8], signature: &[u8]) -> Result<(), String> {
        match algorithm_oid {
            SHA256_WITH_RSA_OID => verify_rsa::<Sha256>(spki_der, message, signature),
            SHA384_WITH_RSA_OID => verify_rsa::<Sha384>(spki_der, message, signature),
            SHA512_WITH_RSA_OID => verify_rsa::<Sha512>(spki_der, message, signature),
            ECDSA_WITH_SHA256_OID => verify_ecdsa::<p256::NistP256>(spki_der, message, signature),
            ECDSA_WITH_SHA384_OID => verify_ecdsa::<p384::NistP384>(spki_der, message, signature),
            ECDSA_WITH_SHA512_OID => verify_ecdsa::<p521::NistP521>(spki_der, message, signature),
            _ => Err(format!("unsupported signature algorithm OID: {algorithm_oid}")),
        }
    }
}

fn verify_rsa<D>(spki_der: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String>
where
    D: Digest + AssociatedOid,
{
    let key = RsaPublicKey::from_public_key_der(spki_der).map_err(|e| format!("bad RSA public key: {e}"))?;
    let signature =
        pkcs1v15::Signature::try_from(signature).map_err(|e| format!("bad RSA signature bytes: {e}"))?;
    pkcs1v15::VerifyingKey::<D>::new(key)
        .verify(message, &signature)
        .map_err(|_| VERIFICATION_FAILED.to_string())
}

fn verify_ecdsa<C: EcdsaCurve>(spki_der: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String> {
    let key = C::verifying_key(spki_der).map_err(|e| format!("bad {} public key: {e}", C::NAME))?;
    let signature = C::signature_from_der(signature).map_err(|e| format!("bad ECDSA signature bytes: {e}"))?;
    key.verify(message, &signature).map_err(|_| VERIFICATION_FAILED.to_string())
}

const VERIFICATION_FAILED: &str = "signature verification failed";

/// A NIST curve whose ECDSA verifying key is read from SPKI DER.
///
/// Each curve hashes with its own digest (SHA-256 for P-256, SHA-384 for P-384, SHA-512 for
/// P-521), which is what the matching `ecdsa-with-SHA*` OIDs name.
trait EcdsaCurve {
    const NAME: &'static str;
    type VerifyingKey: Verifier<Self::Signature>;
    type Signature;

    fn verifying_key(spki_der: &[u8]) -> Result<Self::VerifyingKey, String>;
    fn signature_from_der(der: &[u8]) -> Result<Self::Signature, String>;
}

macro_rules! ecdsa_curve {
    ($curve:ty, $krate:ident, $name:literal) => {
        impl EcdsaCurve for $curve {
            const NAME: &'static str = $name;
            type VerifyingKey = $krate::ecdsa::VerifyingKey;
            type Signature = $krate::ecdsa::Signature;

            fn verifying_key(spki_der: &[u8]) -> Result<Self::VerifyingKey, String> {
                let point = $krate::PublicKey::from_public_key_der(spki_der)
                    .map_err(|e| e.to_string())?
                    .to_encoded_point(false);
                $krate::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes()).map_err(|e| e.to_string())
            }

            fn signature_from_der(der: &[u8]) -> Result<Self::Signature, String> {
                $krate::ecdsa::Signature::from_der(der).map_err(|e| e.to_string())
            }
        }
    };
}

ecdsa_curve!(p256::NistP256, p256, "P-256");
ecdsa_curve!(p384::NistP384, p384, "P-384");
ecdsa_curve!(p521::NistP521, p521, "P-521");
