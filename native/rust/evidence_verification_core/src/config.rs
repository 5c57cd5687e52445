// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Trust configuration snapshots.
//!
//! A [`TrustConfiguration`] is immutable once built. Verifiers capture an `Arc` of the
//! snapshot at construction time, so a configuration refresh never changes the trust
//! decisions of a verification already in flight. New snapshots are published through a
//! [`TrustConfigurationHandle`], which stamps each one with a monotonically increasing
//! generation.

use crate::certificate::Certificate;
use crate::error::ConfigError;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_OCSP_FRESHNESS_SECONDS: i64 = 3600;
pub const DEFAULT_OCSP_CACHE_PERIOD_SECONDS: u64 = 60;
pub const MAX_OCSP_CACHE_PERIOD_SECONDS: u64 = 180;
pub const DEFAULT_OCSP_CACHE_MAX_ENTRIES: usize = 1000;

/// Upper bound on issuer hops when searching for a trust anchor.
const MAX_ANCHOR_SEARCH_DEPTH: usize = 16;

/// An authorized OCSP responder for one certification authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponderAssociation {
    pub ca: Certificate,
    pub responder: Certificate,
}

/// Trust material of one security domain.
#[derive(Debug, Clone, Default)]
pub struct InstanceTrust {
    pub ca_certificates: Vec<Certificate>,
    pub ocsp_responders: Vec<OcspResponderAssociation>,
}

#[derive(Debug, Clone)]
pub struct TrustConfiguration {
    generation: u64,
    instances: BTreeMap<String, InstanceTrust>,
    ocsp_freshness_seconds: i64,
    verify_ocsp_next_update: bool,
    timestamping_certificates: Vec<Certificate>,
    ocsp_cache_period: Duration,
    ocsp_cache_max_entries: usize,
}

impl Default for TrustConfiguration {
    fn default() -> Self {
        TrustConfigurationBuilder::new().build()
    }
}

impl TrustConfiguration {
    pub fn builder() -> TrustConfigurationBuilder {
        TrustConfigurationBuilder::new()
    }

    /// Loads a snapshot from its JSON form. Certificates are base64-encoded DER.
    pub fn from_json_slice(json: &[u8]) -> Result<Self, ConfigError> {
        let file: TrustConfigurationFile = serde_json::from_slice(json)?;
        file.into_builder().map(TrustConfigurationBuilder::build)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn instances(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn instance(&self, instance: &str) -> Option<&InstanceTrust> {
        self.instances.get(instance)
    }

    pub fn ca_certificates(&self, instance: &str) -> &[Certificate] {
        self.instances
            .get(instance)
            .map(|i| i.ca_certificates.as_slice())
            .unwrap_or(&[])
    }

    /// CA certificates of every instance.
    pub fn all_ca_certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.instances.values().flat_map(|i| i.ca_certificates.iter())
    }

    /// Configured OCSP responder certificates of every instance.
    pub fn ocsp_responder_certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.instances
            .values()
            .flat_map(|i| i.ocsp_responders.iter().map(|a| &a.responder))
    }

    /// True when `responder` is explicitly configured as an OCSP responder for `ca`.
    pub fn is_authorized_ocsp_responder(&self, ca: &Certificate, responder: &Certificate) -> bool {
        self.instances
            .values()
            .flat_map(|i| i.ocsp_responders.iter())
            .any(|a| &a.ca == ca && &a.responder == responder)
    }

    pub fn ocsp_freshness_seconds(&self) -> i64 {
        self.ocsp_freshness_seconds
    }

    pub fn verify_ocsp_next_update(&self) -> bool {
        self.verify_ocsp_next_update
    }

    pub fn timestamping_certificates(&self) -> &[Certificate] {
        &self.timestamping_certificates
    }

    pub fn ocsp_cache_period(&self) -> Duration {
        self.ocsp_cache_period
    }

    pub fn ocsp_cache_max_entries(&self) -> usize {
        self.ocsp_cache_max_entries
    }

    /// Finds the configured CA certificate of `instance` that `cert` chains up to by issuer
    /// name, following issuers through `extra_certificates`.
    pub fn find_trust_anchor(
        &self,
        instance: &str,
        cert: &Certificate,
        extra_certificates: &[Certificate],
    ) -> Option<&Certificate> {
        let anchors = self.ca_certificates(instance);
        let mut current = cert;
        for _ in 0..MAX_ANCHOR_SEARCH_DEPTH {
            if let Some(anchor) = anchors.iter().find(|a| a.subject_raw() == current.issuer_raw()) {
                return Some(anchor);
            }
            if current.is_self_issued() {
                return None;
            }
            current = extra_certificates
                .iter()
                .find(|c| c.subject_raw() == current.issuer_raw())?;
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct TrustConfigurationBuilder {
    instances: BTreeMap<String, InstanceTrust>,
    ocsp_freshness_seconds: i64,
    verify_ocsp_next_update: bool,
    timestamping_certificates: Vec<Certificate>,
    ocsp_cache_period_seconds: u64,
    ocsp_cache_max_entries: usize,
}

impl Default for TrustConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            instances: BTreeMap::new(),
            ocsp_freshness_seconds: DEFAULT_OCSP_FRESHNESS_SECONDS,
            verify_ocsp_next_update: true,
            timestamping_certificates: Vec::new(),
            ocsp_cache_period_seconds: DEFAULT_OCSP_CACHE_PERIOD_SECONDS,
            ocsp_cache_max_entries: DEFAULT_OCSP_CACHE_MAX_ENTRIES,
        }
    }

    pub fn with_ca_certificate(mut self, instance: &str, cert: Certificate) -> Self {
        self.instances
            .entry(instance.to_string())
            .or_default()
            .ca_certificates
            .push(cert);
        self
    }

    pub fn with_ocsp_responder(mut self, instance: &str, ca: Certificate, responder: Certificate) -> Self {
        self.instances
            .entry(instance.to_string())
            .or_default()
            .ocsp_responders
            .push(OcspResponderAssociation { ca, responder });
        self
    }

    pub fn with_ocsp_freshness_seconds(mut self, seconds: i64) -> Self {
        self.ocsp_freshness_seconds = seconds;
        self
    }

    pub fn with_verify_ocsp_next_update(mut self, enabled: bool) -> Self {
        self.verify_ocsp_next_update = enabled;
        self
    }

    pub fn with_timestamping_certificate(mut self, cert: Certificate) -> Self {
        self.timestamping_certificates.push(cert);
        self
    }

    /// Clamped to [`MAX_OCSP_CACHE_PERIOD_SECONDS`].
    pub fn with_ocsp_cache_period_seconds(mut self, seconds: u64) -> Self {
        self.ocsp_cache_period_seconds = seconds;
        self
    }

    pub fn with_ocsp_cache_max_entries(mut self, max_entries: usize) -> Self {
        self.ocsp_cache_max_entries = max_entries;
        self
    }

    pub fn build(self) -> TrustConfiguration {
        TrustConfiguration {
            generation: 0,
            instances: self.instances,
            ocsp_freshness_seconds: self.ocsp_freshness_seconds,
            verify_ocsp_next_update: self.verify_ocsp_next_update,
            timestamping_certificates: self.timestamping_certificates,
            ocsp_cache_period: Duration::from_secs(
                self.ocsp_cache_period_seconds.min(MAX_OCSP_CACHE_PERIOD_SECONDS),
            ),
            ocsp_cache_max_entries: self.ocsp_cache_max_entries,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustConfigurationFile {
    ocsp_freshness_seconds: Option<i64>,
    verify_ocsp_next_update: Option<bool>,
    ocsp_cache_period_seconds: Option<u64>,
    ocsp_cache_max_entries: Option<usize>,
    #[serde(default)]
    instances: BTreeMap<String, InstanceTrustFile>,
    #[serde(default, with = "crate::serde_base64::list")]
    timestamping_certificates: Vec<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceTrustFile {
    #[serde(default, with = "crate::serde_base64::list")]
    ca_certificates: Vec<Vec<u8>>,
    #[serde(default)]
    ocsp_responders: Vec<OcspResponderFile>,
}

#[derive(Debug, Deserialize)]
struct OcspResponderFile {
    #[serde(with = "crate::serde_base64")]
    ca: Vec<u8>,
    #[serde(with = "crate::serde_base64")]
    responder: Vec<u8>,
}

impl TrustConfigurationFile {
    fn into_builder(self) -> Result<TrustConfigurationBuilder, ConfigError> {
        let mut builder = TrustConfigurationBuilder::new();
        if let Some(v) = self.ocsp_freshness_seconds {
            builder = builder.with_ocsp_freshness_seconds(v);
        }
        if let Some(v) = self.verify_ocsp_next_update {
            builder = builder.with_verify_ocsp_next_update(v);
        }
        if let Some(v) = self.ocsp_cache_period_seconds {
            builder = builder.with_ocsp_cache_period_seconds(v);
        }
        if let Some(v) = self.ocsp_cache_max_entries {
            builder = builder.with_ocsp_cache_max_entries(v);
        }

        for (name, instance) in self.instances {
            for der in &instance.ca_certificates {
                builder = builder.with_ca_certificate(&name, Certificate::from_der(der)?);
            }
            for association in &instance.ocsp_responders {
                builder = builder.with_ocsp_responder(
                    &name,
                    Certificate::from_der(&association.ca)?,
                    Certificate::from_der(&association.responder)?,
                );
            }
        }

        for der in &self.timestamping_certificates {
            builder = builder.with_timestamping_certificate(Certificate::from_der(der)?);
        }

        Ok(builder)
    }
}

/// Publishes trust configuration snapshots to verifiers.
///
/// Readers take a cheap `Arc` clone of the current snapshot; writers replace it wholesale.
/// Each published snapshot gets the next generation number, which also partitions the OCSP
/// validation cache so results validated under an older trust set are never reused.
pub struct TrustConfigurationHandle {
    current: RwLock<Arc<TrustConfiguration>>,
    next_generation: AtomicU64,
}

impl TrustConfigurationHandle {
    pub fn new(mut initial: TrustConfiguration) -> Self {
        initial.generation = 1;
        Self {
            current: RwLock::new(Arc::new(initial)),
            next_generation: AtomicU64::new(2),
        }
    }

    pub fn snapshot(&self) -> Arc<TrustConfiguration> {
        self.current.read().clone()
    }

    /// Replaces the current snapshot and returns its generation.
    pub fn publish(&self, mut config: TrustConfiguration) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        config.generation = generation;
        *self.current.write() = Arc::new(config);
        tracing::debug!(generation, "published trust configuration snapshot");
        generation
    }
}
