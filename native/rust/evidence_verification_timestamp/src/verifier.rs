// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::token::{JsonTstInfoDecoder, TimestampToken, TstInfo, TstInfoDecoder};
use evidence_verification_core::{
    Certificate, ErrorKind, RustCryptoSignaturePrimitive, SignaturePrimitive, VerifyError, VerifyResult,
};
use std::sync::Arc;

pub struct TimestampVerifier {
    primitive: Arc<dyn SignaturePrimitive>,
    decoder: Arc<dyn TstInfoDecoder>,
}

impl Default for TimestampVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampVerifier {
    pub fn new() -> Self {
        Self {
            primitive: Arc::new(RustCryptoSignaturePrimitive),
            decoder: Arc::new(JsonTstInfoDecoder),
        }
    }

    pub fn with_primitive(mut self, primitive: Arc<dyn SignaturePrimitive>) -> Self {
        self.primitive = primitive;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TstInfoDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Decodes the signed `TSTInfo`. Nothing is verified.
    pub fn decode(&self, token: &TimestampToken) -> VerifyResult<TstInfo> {
        self.decoder.decode(token.signed_content())
    }

    /// Verifies that `token` stamps `stamped_bytes` and was signed by one of `trusted`.
    /// Returns the token generation time.
    pub fn verify(&self, token: &TimestampToken, stamped_bytes: &[u8], trusted: &[Certificate]) -> VerifyResult<i64> {
        self.verify_imprint(token, stamped_bytes)?;
        self.verify_signature_only(token, trusted)
    }

    /// Signature check only, for callers that already matched the imprint themselves.
    pub fn verify_signature_only(&self, token: &TimestampToken, trusted: &[Certificate]) -> VerifyResult<i64> {
        let info = self.decode(token)?;
        let signer = trusted.iter().find(|c| token.signer().matches(c)).ok_or_else(|| {
            VerifyError::new(
                ErrorKind::TimestampSignerNotFound,
                format!("could not find timestamp signer certificate ({})", token.signer()),
            )
        })?;

        self.primitive
            .verify(
                signer.spki_der(),
                token.signature_algorithm_oid(),
                token.signed_content(),
                token.signature(),
            )
            .map_err(|e| VerifyError::new(ErrorKind::TimestampBadSignature, format!("timestamp signature is invalid: {e}")))?;

        tracing::debug!(signer = %signer, gen_time = info.gen_time, "timestamp verified");
        Ok(info.gen_time)
    }

    pub fn verify_imprint(&self, token: &TimestampToken, stamped_bytes: &[u8]) -> VerifyResult<()> {
        let info = self.decode(token)?;
        if info.hash_method.digest(stamped_bytes) != info.message_imprint {
            return Err(VerifyError::new(
                ErrorKind::TimestampImprintMismatch,
                "timestamp message imprint does not match the stamped data",
            ));
        }
        Ok(())
    }
}
