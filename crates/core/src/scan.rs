//! Recursive prefix scanning
//!
//! Walks every key under a prefix page by page, keeping running totals, and
//! stops at a hard key cap. Scan results are a transient view and are never
//! written to the bucket cache.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::reauth::ReauthCoordinator;
use crate::traits::{ListPage, ListRequest, ObjectInfo, StorageApi};

/// Keys counted before a scan reports truncation
pub const DEFAULT_SCAN_MAX_KEYS: usize = 50_000;

/// Keys requested per listing page
const SCAN_PAGE_KEYS: i32 = 1000;

/// Totals for a scanned prefix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub bucket: String,
    pub prefix: String,

    /// Objects counted
    pub count: u64,

    /// Sum of the counted objects' sizes in bytes
    pub total_size: u64,

    /// Distinct directories below the prefix
    pub subdirs: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_modified: Option<Timestamp>,

    /// Keys examined against the cap
    pub scanned: u64,

    /// Whether keys remained beyond the cap
    pub truncated: bool,
}

impl ScanSummary {
    pub fn total_size_human(&self) -> String {
        humansize::format_size(self.total_size, humansize::BINARY)
    }
}

/// Runs recursive scans through the reauthentication gate
#[derive(Clone)]
pub struct Scanner {
    storage: Arc<dyn StorageApi>,
    reauth: ReauthCoordinator,
    timeout: Duration,
    max_keys: usize,
}

impl Scanner {
    pub fn new(
        storage: Arc<dyn StorageApi>,
        reauth: ReauthCoordinator,
        timeout: Duration,
        max_keys: usize,
    ) -> Self {
        Self {
            storage,
            reauth,
            timeout,
            max_keys,
        }
    }

    /// Override the key cap for one scanner
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// Start a paginated scan
    pub fn stream(&self, profile: &Profile, bucket: &str, prefix: &str) -> ScanStream {
        ScanStream {
            storage: Arc::clone(&self.storage),
            reauth: self.reauth.clone(),
            profile: profile.clone(),
            timeout: self.timeout,
            max_keys: self.max_keys,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
            next_token: None,
            done: false,
            count: 0,
            total_size: 0,
            subdirs: BTreeSet::new(),
            latest_modified: None,
            scanned: 0,
            truncated: false,
        }
    }

    /// Scan a prefix to completion or to the key cap.
    ///
    /// Returns `Error::Cancelled` as soon as `cancel` fires, between or
    /// during page requests.
    pub async fn scan_prefix(
        &self,
        profile: &Profile,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary> {
        let mut stream = self.stream(profile, bucket, prefix);
        loop {
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(bucket, prefix, scanned = stream.scanned, "Scan cancelled");
                    return Err(Error::Cancelled);
                }
                page = stream.next_page() => page?,
            };
            if page.is_none() {
                return Ok(stream.summary());
            }
        }
    }
}

/// Paginated scan yielding running totals after each page
pub struct ScanStream {
    storage: Arc<dyn StorageApi>,
    reauth: ReauthCoordinator,
    profile: Profile,
    timeout: Duration,
    max_keys: usize,
    bucket: String,
    prefix: String,
    next_token: Option<String>,
    done: bool,

    count: u64,
    total_size: u64,
    subdirs: BTreeSet<String>,
    latest_modified: Option<Timestamp>,
    scanned: u64,
    truncated: bool,
}

impl ScanStream {
    /// Fetch and account for the next page.
    ///
    /// Returns the running totals, or `None` once the scan is complete.
    pub async fn next_page(&mut self) -> Result<Option<ScanSummary>> {
        if self.done {
            return Ok(None);
        }

        let page = self.fetch().await?;
        let more_pages = page.next_page_token.is_some();
        let mut entries = page.entries.into_iter();
        for entry in entries.by_ref() {
            if self.scanned >= self.max_keys as u64 {
                break;
            }
            self.account(entry);
        }

        let capped = self.scanned >= self.max_keys as u64;
        if capped && (entries.next().is_some() || more_pages) {
            self.truncated = true;
        }
        self.next_token = page.next_page_token;
        self.done = capped || !more_pages;

        tracing::debug!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            scanned = self.scanned,
            truncated = self.truncated,
            "Scanned page"
        );
        Ok(Some(self.summary()))
    }

    /// Running totals so far
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            count: self.count,
            total_size: self.total_size,
            subdirs: self.subdirs.len(),
            latest_modified: self.latest_modified,
            scanned: self.scanned,
            truncated: self.truncated,
        }
    }

    async fn fetch(&self) -> Result<ListPage> {
        let request = ListRequest::new(&self.bucket, &self.prefix)
            .max_keys(SCAN_PAGE_KEYS)
            .page_token(self.next_token.clone());
        let storage = &self.storage;
        let profile = &self.profile;
        let timeout = self.timeout;
        self.reauth
            .with_reauth(profile, || {
                let request = request.clone();
                async move {
                    let bucket = request.bucket.clone();
                    tokio::time::timeout(timeout, storage.list(profile, request))
                        .await
                        .map_err(|_| {
                            Error::Timeout(format!("listing '{bucket}' with profile '{profile}'"))
                        })?
                }
            })
            .await
    }

    fn account(&mut self, entry: ObjectInfo) {
        self.scanned += 1;
        if entry.key.is_empty() || entry.is_dir_marker() || entry.key == self.prefix {
            return;
        }

        self.count += 1;
        self.total_size += entry.size_bytes;
        if let Some(modified) = entry.last_modified {
            self.latest_modified = Some(self.latest_modified.map_or(modified, |l| l.max(modified)));
        }

        let relative = entry.key.strip_prefix(&self.prefix).unwrap_or(&entry.key);
        if let Some((dirs, _)) = relative.rsplit_once('/') {
            let mut path = String::new();
            for part in dirs.split('/').filter(|p| !p.is_empty()) {
                path.push_str(part);
                path.push('/');
                if !self.subdirs.contains(&path) {
                    self.subdirs.insert(path.clone());
                }
            }
        }
    }
}

/// Make a non-empty prefix end in `/`
fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Grant, MemoryStorage, ScriptedAuth};

    fn scanner(storage: Arc<MemoryStorage>, auth: ScriptedAuth) -> Scanner {
        Scanner::new(
            storage,
            ReauthCoordinator::new(Arc::new(auth)),
            Duration::from_secs(5),
            DEFAULT_SCAN_MAX_KEYS,
        )
    }

    fn dev() -> Profile {
        Profile::new("dev")
    }

    #[tokio::test]
    async fn test_scan_stops_at_cap_with_partial_totals() {
        let storage = Arc::new(
            MemoryStorage::new()
                .objects("alpha", "data/", 60_000, 10)
                .grant("dev", "alpha", Grant::ListAndRead),
        );
        let summary = scanner(storage.clone(), ScriptedAuth::succeeding())
            .scan_prefix(&dev(), "alpha", "data/", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.count, 50_000);
        assert!(summary.truncated);
        assert_eq!(summary.total_size, 50_000 * 10);
        assert_eq!(summary.scanned, 50_000);
        // 50 pages of 1000, no page fetched past the cap
        assert_eq!(storage.list_calls(), 50);
    }

    #[tokio::test]
    async fn test_scan_exactly_at_cap_is_not_truncated() {
        let storage = Arc::new(
            MemoryStorage::new()
                .objects("alpha", "", 2_000, 1)
                .grant("dev", "alpha", Grant::ListOnly),
        );
        let summary = scanner(storage, ScriptedAuth::succeeding())
            .with_max_keys(2_000)
            .scan_prefix(&dev(), "alpha", "", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.count, 2_000);
        assert!(!summary.truncated);
    }

    #[tokio::test]
    async fn test_scan_counts_files_and_subdirs() {
        let newest = Timestamp::from_second(1_700_000_000).unwrap();
        let storage = Arc::new(
            MemoryStorage::new()
                .object("alpha", "logs/", 0)
                .object("alpha", "logs/a.txt", 5)
                .object("alpha", "logs/2024/", 0)
                .object("alpha", "logs/2024/jan/b.txt", 7)
                .entry(
                    "alpha",
                    ObjectInfo {
                        last_modified: Some(newest),
                        ..ObjectInfo::file("logs/2025/c.txt", 11)
                    },
                )
                .object("alpha", "logsarchive/d.txt", 100)
                .grant("dev", "alpha", Grant::ListOnly),
        );
        let summary = scanner(storage, ScriptedAuth::succeeding())
            .scan_prefix(&dev(), "alpha", "logs", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.prefix, "logs/");
        assert_eq!(summary.count, 3);
        assert_eq!(summary.total_size, 23);
        // 2024/, 2024/jan/, 2025/
        assert_eq!(summary.subdirs, 3);
        assert_eq!(summary.latest_modified, Some(newest));
        // markers are enumerated but not counted
        assert_eq!(summary.scanned, 5);
        assert!(!summary.truncated);
    }

    #[tokio::test]
    async fn test_scan_cancelled() {
        let storage = Arc::new(
            MemoryStorage::new()
                .objects("alpha", "", 10, 1)
                .grant("dev", "alpha", Grant::ListOnly)
                .with_delay(Duration::from_millis(50)),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = scanner(storage, ScriptedAuth::succeeding())
            .scan_prefix(&dev(), "alpha", "", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_scan_times_out() {
        let storage = Arc::new(
            MemoryStorage::new()
                .objects("alpha", "", 10, 1)
                .grant("dev", "alpha", Grant::ListOnly)
                .with_delay(Duration::from_millis(200)),
        );
        let scanner = Scanner::new(
            storage,
            ReauthCoordinator::new(Arc::new(ScriptedAuth::succeeding())),
            Duration::from_millis(20),
            DEFAULT_SCAN_MAX_KEYS,
        );
        let err = scanner
            .scan_prefix(&dev(), "alpha", "", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_scan_recovers_from_expired_session() {
        let storage = Arc::new(
            MemoryStorage::new()
                .objects("alpha", "", 3, 4)
                .grant("dev", "alpha", Grant::ListOnly),
        );
        storage.expire("dev");
        let auth = Arc::new(ScriptedAuth::succeeding().renewing(storage.clone()));
        let scanner = Scanner::new(
            storage,
            ReauthCoordinator::new(auth.clone()),
            Duration::from_secs(5),
            DEFAULT_SCAN_MAX_KEYS,
        );
        let summary = scanner
            .scan_prefix(&dev(), "alpha", "", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(auth.calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_yields_running_totals() {
        let storage = Arc::new(
            MemoryStorage::new()
                .objects("alpha", "", 2_500, 2)
                .grant("dev", "alpha", Grant::ListOnly),
        );
        let mut stream = scanner(storage, ScriptedAuth::succeeding()).stream(&dev(), "alpha", "");
        let mut counts = Vec::new();
        while let Some(totals) = stream.next_page().await.unwrap() {
            counts.push(totals.count);
        }
        assert_eq!(counts, vec![1_000, 2_000, 2_500]);
        assert!(stream.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_markers_count_toward_cap() {
        let storage = Arc::new(
            MemoryStorage::new()
                .markers("alpha", "d/", 3_000)
                .grant("dev", "alpha", Grant::ListOnly),
        );
        let summary = scanner(storage.clone(), ScriptedAuth::succeeding())
            .with_max_keys(1_000)
            .scan_prefix(&dev(), "alpha", "", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.count, 0);
        assert_eq!(summary.scanned, 1_000);
        assert!(summary.truncated);
        assert_eq!(storage.list_calls(), 1);
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("a"), "a/");
        assert_eq!(normalize_prefix("a/"), "a/");
    }
}
