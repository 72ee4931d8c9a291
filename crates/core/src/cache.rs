//! Bucket classification cache
//!
//! Persists the bucket → classification mapping as JSON, together with the
//! credential fingerprint it was computed under. The store is the only
//! writer of the cache file; writes go through a temp file and a rename.

use std::collections::BTreeMap;
use std::path::PathBuf;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;
use crate::error::{Error, Result};

/// Default age after which a cache record is refreshed
pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;

/// The persisted aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    #[serde(default)]
    pub buckets: BTreeMap<String, Bucket>,

    /// Credential fingerprint at save time
    #[serde(default)]
    pub fingerprint: Option<String>,

    pub saved_at: Timestamp,
}

impl CacheRecord {
    pub fn empty(fingerprint: Option<String>, now: Timestamp) -> Self {
        Self {
            buckets: BTreeMap::new(),
            fingerprint,
            saved_at: now,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Bucket> {
        self.buckets.get(name)
    }

    /// Buckets sorted case-insensitively by name
    pub fn sorted_buckets(&self) -> Vec<Bucket> {
        let mut buckets: Vec<Bucket> = self.buckets.values().cloned().collect();
        buckets.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        buckets
    }

    /// Judge whether the record can be used as-is
    pub fn freshness(
        &self,
        current_fingerprint: Option<&str>,
        now: Timestamp,
        max_age: SignedDuration,
    ) -> Freshness {
        if self.fingerprint.as_deref() != current_fingerprint {
            Freshness::FingerprintChanged
        } else if now.duration_since(self.saved_at) > max_age {
            Freshness::Aged
        } else {
            Freshness::Fresh
        }
    }

    fn fill_names(&mut self) {
        for (name, bucket) in self.buckets.iter_mut() {
            bucket.name = name.clone();
        }
    }
}

/// How far a loaded record can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Fingerprint matches and the record is within its age limit
    Fresh,
    /// Fingerprint matches but the record is older than the age limit
    Aged,
    /// Credential material changed since the record was saved
    FingerprintChanged,
    /// No usable record exists
    Missing,
}

impl Freshness {
    pub fn needs_refresh(self) -> bool {
        self != Freshness::Fresh
    }
}

/// File-backed store for the cache record
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the record, treating a missing or corrupt file as absent
    pub fn load(&self) -> Option<CacheRecord> {
        match self.read() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable bucket cache");
                None
            }
        }
    }

    /// Load the record, reporting corruption as `Error::CacheCorrupt`
    pub fn read(&self) -> Result<Option<CacheRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut record: CacheRecord =
            serde_json::from_slice(&bytes).map_err(|e| Error::CacheCorrupt(e.to_string()))?;
        record.fill_names();
        Ok(Some(record))
    }

    /// Combine a prior record with freshly classified buckets.
    ///
    /// Every bucket in `updates` replaces its prior classification, except
    /// that `last_verified_at` never moves backwards. Buckets absent from
    /// `updates` are carried over unchanged.
    pub fn merge(
        prior: Option<&CacheRecord>,
        updates: BTreeMap<String, Bucket>,
        fingerprint: Option<String>,
        now: Timestamp,
    ) -> CacheRecord {
        let mut buckets = prior.map(|r| r.buckets.clone()).unwrap_or_default();
        for (name, mut update) in updates {
            update.name = name.clone();
            if let Some(previous) = buckets.get(&name) {
                update.last_verified_at = match (previous.last_verified_at, update.last_verified_at)
                {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
            }
            buckets.insert(name, update);
        }
        CacheRecord {
            buckets,
            fingerprint,
            saved_at: now,
        }
    }

    /// Write the record atomically
    pub fn save(&self, record: &CacheRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_vec_pretty(record)?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;

        tracing::debug!(path = %self.path.display(), buckets = record.buckets.len(), "Saved bucket cache");
        Ok(())
    }
}
