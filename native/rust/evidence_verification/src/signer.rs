// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use evidence_verification_core::{Certificate, ErrorKind, VerifyError, VerifyResult};
use std::fmt;

/// Identity of the party a signature is claimed to come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignerIdentity {
    pub instance: String,
    pub member_class: String,
    pub member_code: String,
    pub subsystem: Option<String>,
}

impl SignerIdentity {
    pub fn member(instance: &str, member_class: &str, member_code: &str) -> Self {
        Self {
            instance: instance.to_string(),
            member_class: member_class.to_string(),
            member_code: member_code.to_string(),
            subsystem: None,
        }
    }

    pub fn with_subsystem(mut self, subsystem: &str) -> Self {
        self.subsystem = Some(subsystem.to_string());
        self
    }

    /// Parses `instance/class/code[/subsystem]`.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [instance, class, code] => Some(Self::member(instance, class, code)),
            [instance, class, code, subsystem] => Some(Self::member(instance, class, code).with_subsystem(subsystem)),
            _ => None,
        }
    }
}

impl fmt::Display for SignerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instance, self.member_class, self.member_code)?;
        if let Some(subsystem) = &self.subsystem {
            write!(f, "/{subsystem}")?;
        }
        Ok(())
    }
}

/// Derives the identity a signing certificate was issued to.
///
/// Certification authorities encode identities differently; deployments plug in the
/// profile matching their CA.
pub trait SigningCertificateProfile: Send + Sync {
    fn subject_identity(&self, instance: &str, cert: &Certificate) -> VerifyResult<SignerIdentity>;
}

/// Reads the identity from a subject common name of the form
/// `instance/class/code[/subsystem]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommonNameProfile;

impl SigningCertificateProfile for CommonNameProfile {
    fn subject_identity(&self, instance: &str, cert: &Certificate) -> VerifyResult<SignerIdentity> {
        let cn = cert.common_name().ok_or_else(|| {
            VerifyError::new(
                ErrorKind::SignerIdentityMismatch,
                format!("signing certificate {cert} has no common name"),
            )
        })?;
        let identity = SignerIdentity::parse(cn).ok_or_else(|| {
            VerifyError::new(
                ErrorKind::SignerIdentityMismatch,
                format!("cannot derive signer identity from common name '{cn}'"),
            )
        })?;
        if identity.instance != instance {
            return Err(VerifyError::new(
                ErrorKind::SignerIdentityMismatch,
                format!("signing certificate belongs to instance {}, expected {instance}", identity.instance),
            ));
        }
        Ok(identity)
    }
}
