// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Memoizing cache of successful OCSP response validations.
//!
//! Each key maps to a shared entry holding a `OnceCell`. The map lock is only held while
//! looking up or inserting the entry; the validation itself runs inside
//! `OnceCell::get_or_try_init`, so concurrent callers for the same key wait for the one
//! in-flight validation instead of repeating it. Failed validations are never cached: their
//! entry is removed from the map again. The size bound is enforced after a validation
//! succeeds, so failing responses cannot push out successful ones.

use crate::ocsp_response::OcspResponse;
use evidence_verification_core::{Certificate, VerifyResult};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OcspCacheKey {
    response: [u8; 32],
    subject: [u8; 32],
    issuer: [u8; 32],
    generation: u64,
}

impl OcspCacheKey {
    pub fn new(response: &OcspResponse, subject: &Certificate, issuer: &Certificate, generation: u64) -> Self {
        Self {
            response: response.identity_digest(),
            subject: subject.fingerprint_sha256(),
            issuer: issuer.fingerprint_sha256(),
            generation,
        }
    }
}

struct CacheEntry {
    inserted: Instant,
    validated_at: OnceCell<Instant>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            inserted: Instant::now(),
            validated_at: OnceCell::new(),
        }
    }

    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        match self.validated_at.get() {
            Some(at) => now.duration_since(*at) >= ttl,
            None => false,
        }
    }
}

pub struct OcspValidationCache {
    entries: Mutex<HashMap<OcspCacheKey, Arc<CacheEntry>>>,
    ttl: Duration,
    max_entries: usize,
}

impl OcspValidationCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Runs `validate` unless a live successful validation for `key` exists.
    pub fn get_or_validate<F>(&self, key: OcspCacheKey, validate: F) -> VerifyResult<()>
    where
        F: FnOnce() -> VerifyResult<()>,
    {
        let entry = self.entry(key.clone());
        let mut computed = false;
        let validated = entry
            .validated_at
            .get_or_try_init(|| {
                computed = true;
                validate().map(|_| Instant::now())
            })
            .map(|_| ());
        if let Err(e) = validated {
            self.discard(&key, &entry);
            return Err(e);
        }
        if computed {
            self.evict(&key);
        } else {
            tracing::trace!("ocsp validation cache hit");
        }
        Ok(())
    }

    fn entry(&self, key: OcspCacheKey) -> Arc<CacheEntry> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            if !existing.is_expired(self.ttl, now) {
                return existing.clone();
            }
        }
        let entry = Arc::new(CacheEntry::new());
        entries.insert(key, entry.clone());
        entry
    }

    /// Drops `entry` if it is still the unvalidated entry stored for `key`.
    fn discard(&self, key: &OcspCacheKey, entry: &Arc<CacheEntry>) {
        let mut entries = self.entries.lock();
        let stale = entries
            .get(key)
            .is_some_and(|e| Arc::ptr_eq(e, entry) && e.validated_at.get().is_none());
        if stale {
            entries.remove(key);
        }
    }

    /// Drops expired entries, then the oldest validated ones other than `keep` until the
    /// cache is within its bound. In-flight entries are left alone.
    fn evict(&self, keep: &OcspCacheKey) {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.entries.lock();
        entries.retain(|_, e| !e.is_expired(ttl, now));

        while entries.len() > self.max_entries {
            let oldest = entries
                .iter()
                .filter(|(k, e)| *k != keep && e.validated_at.get().is_some())
                .min_by_key(|(_, e)| e.inserted)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}
