//! Profile resolution engine
//!
//! [`Engine`] owns the bucket cache for a session and exposes the operations
//! the CLI builds on: the cached bucket list, refresh, best-profile
//! resolution, prefix scans, object reads, and forced reauthentication.
//!
//! A cache record whose credential fingerprint no longer matches is never
//! served. It is held back as a fallback so that buckets a refresh cannot
//! re-verify stay visible once that refresh has run.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use jiff::Timestamp;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::bucket::{Bucket, ProbeResult};
use crate::cache::{CacheRecord, CacheStore, Freshness};
use crate::classify::Classifier;
use crate::config::EngineSettings;
use crate::error::{Error, Result};
use crate::probe::Prober;
use crate::profile::{Profile, ProfileSet};
use crate::reauth::ReauthCoordinator;
use crate::scan::{ScanStream, ScanSummary, Scanner};
use crate::sso::SsoPreflight;
use crate::traits::{AuthApi, ListRequest, ObjectInfo, RangeRead, StorageApi};

/// Bytes requested per ranged read while downloading
const DOWNLOAD_CHUNK_BYTES: u64 = 8 * 1024 * 1024;

/// Keys requested per page for delimited listings
const LIST_PAGE_KEYS: i32 = 1000;

/// Progress of a refresh, reported after every probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeProgress {
    pub completed: usize,
    pub total: usize,
    pub bucket: String,
    pub profile: String,
}

/// Callback receiving refresh progress
pub type ProgressFn<'a> = dyn Fn(&ProbeProgress) + Send + Sync + 'a;

/// A failure tied to a profile and, for probes, a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshError {
    pub profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub message: String,
}

/// What a refresh did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// False when the cache was fresh and nothing was probed
    pub refreshed: bool,
    pub buckets: usize,
    pub probes: usize,
    pub discovery_errors: Vec<RefreshError>,
    pub probe_errors: Vec<RefreshError>,
    /// Buckets kept from the previous cache because no probe was conclusive
    pub unverified: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

impl RefreshReport {
    pub fn has_errors(&self) -> bool {
        !self.discovery_errors.is_empty() || !self.probe_errors.is_empty() || self.save_error.is_some()
    }
}

/// Bucket names visible to the configured profiles
#[derive(Debug, Default)]
pub struct BucketDiscovery {
    /// De-duplicated, in first-seen order
    pub buckets: Vec<String>,
    pub errors: Vec<(String, Error)>,
}

/// One delimited listing level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefixListing {
    pub bucket: String,
    pub prefix: String,
    pub profile: String,
    /// Sub-prefixes, each ending in `/`
    pub prefixes: Vec<String>,
    pub objects: Vec<ObjectInfo>,
}

/// Leading bytes of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub data: Vec<u8>,
    pub total_size: Option<u64>,
    /// Whether the object continues past the returned bytes
    pub truncated: bool,
}

/// Result of a completed download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub path: PathBuf,
    pub bytes: u64,
    pub profile: String,
}

#[derive(Debug)]
struct CacheState {
    /// Record safe to serve
    trusted: Option<CacheRecord>,
    /// Record from before a credential change, only used to carry entries over
    fallback: Option<CacheRecord>,
    freshness: Freshness,
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    profiles: ProfileSet,
    storage: Arc<dyn StorageApi>,
    auth: Arc<dyn AuthApi>,
    cache_path: Option<PathBuf>,
    fingerprint: Option<String>,
    settings: EngineSettings,
    pinned: Option<String>,
    sso: Option<SsoPreflight>,
}

impl EngineBuilder {
    /// Where the bucket cache lives
    pub fn cache_path(mut self, path: PathBuf) -> Self {
        self.cache_path = Some(path);
        self
    }

    /// Current credential fingerprint
    pub fn fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Profile the user explicitly chose for this session
    pub fn pinned(mut self, profile: Option<String>) -> Self {
        self.pinned = profile;
        self
    }

    /// SSO configuration used to pick login targets
    pub fn sso(mut self, sso: SsoPreflight) -> Self {
        self.sso = Some(sso);
        self
    }

    /// Load the cache and assemble the engine
    pub fn build(self) -> Result<Engine> {
        let cache_path = self
            .cache_path
            .ok_or_else(|| Error::Config("bucket cache path is not set".into()))?;
        if let Some(pinned) = &self.pinned {
            self.profiles.get(pinned)?;
        }

        let storage = self.storage;
        let reset = Arc::clone(&storage);
        let reauth = ReauthCoordinator::new(self.auth)
            .with_success_hook(move |profile| reset.reset_profile(profile));

        let store = CacheStore::new(cache_path);
        let state = initial_state(
            store.load(),
            self.fingerprint.as_deref(),
            Timestamp::now(),
            &self.settings,
        );
        tracing::debug!(
            path = %store.path().display(),
            freshness = ?state.freshness,
            "Loaded bucket cache"
        );

        Ok(Engine {
            prober: Prober::new(Arc::clone(&storage), self.settings.probe_timeout()),
            classifier: Classifier::new(self.profiles.clone(), self.pinned.clone()),
            scanner: Scanner::new(
                Arc::clone(&storage),
                reauth.clone(),
                self.settings.scan_timeout(),
                self.settings.scan_max_keys,
            ),
            profiles: self.profiles,
            storage,
            reauth,
            store,
            fingerprint: self.fingerprint,
            settings: self.settings,
            pinned: self.pinned,
            sso: self.sso,
            state: RwLock::new(state),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }
}

fn initial_state(
    record: Option<CacheRecord>,
    fingerprint: Option<&str>,
    now: Timestamp,
    settings: &EngineSettings,
) -> CacheState {
    match record {
        None => CacheState {
            trusted: None,
            fallback: None,
            freshness: Freshness::Missing,
        },
        Some(record) => match record.freshness(fingerprint, now, settings.cache_max_age()) {
            Freshness::FingerprintChanged => {
                tracing::info!("Credential files changed since the bucket cache was saved");
                CacheState {
                    trusted: None,
                    fallback: Some(record),
                    freshness: Freshness::FingerprintChanged,
                }
            }
            freshness => CacheState {
                trusted: Some(record),
                fallback: None,
                freshness,
            },
        },
    }
}

/// Session-scoped facade over probing, classification and the cache
pub struct Engine {
    profiles: ProfileSet,
    storage: Arc<dyn StorageApi>,
    reauth: ReauthCoordinator,
    prober: Prober,
    classifier: Classifier,
    scanner: Scanner,
    store: CacheStore,
    fingerprint: Option<String>,
    settings: EngineSettings,
    pinned: Option<String>,
    sso: Option<SsoPreflight>,
    state: RwLock<CacheState>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Engine {
    pub fn builder(
        profiles: ProfileSet,
        storage: Arc<dyn StorageApi>,
        auth: Arc<dyn AuthApi>,
    ) -> EngineBuilder {
        EngineBuilder {
            profiles,
            storage,
            auth,
            cache_path: None,
            fingerprint: None,
            settings: EngineSettings::default(),
            pinned: None,
            sso: None,
        }
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn cache_path(&self) -> &Path {
        self.store.path()
    }

    /// Cached buckets, sorted by name. Never touches the network.
    pub fn get_bucket_list(&self) -> Vec<Bucket> {
        self.read_state()
            .trusted
            .as_ref()
            .map(CacheRecord::sorted_buckets)
            .unwrap_or_default()
    }

    /// One cached bucket
    pub fn bucket(&self, name: &str) -> Option<Bucket> {
        self.read_state().trusted.as_ref()?.get(name).cloned()
    }

    pub fn freshness(&self) -> Freshness {
        self.read_state().freshness
    }

    /// When the served cache was saved
    pub fn saved_at(&self) -> Option<Timestamp> {
        self.read_state().trusted.as_ref().map(|r| r.saved_at)
    }

    /// The profile the cache resolved for a bucket
    pub fn resolve_best_profile(&self, bucket: &str) -> Option<Profile> {
        let name = self.bucket(bucket)?.resolved_profile?;
        self.profiles.find(&name).cloned()
    }

    /// Profile for runtime operations on a bucket: the resolved one, else the
    /// pinned profile, else the first configured profile
    pub fn profile_for(&self, bucket: &str) -> Profile {
        self.resolve_best_profile(bucket)
            .or_else(|| {
                self.pinned
                    .as_deref()
                    .and_then(|name| self.profiles.find(name))
                    .cloned()
            })
            .unwrap_or_else(|| self.profiles.first().clone())
    }

    /// List the buckets visible to each profile.
    ///
    /// Per-profile failures are collected and never abort discovery.
    pub async fn discover_buckets(&self) -> BucketDiscovery {
        let timeout = self.settings.probe_timeout();
        let lookups = self.profiles.iter().map(|profile| async move {
            let result = self
                .reauth
                .with_reauth(profile, || {
                    with_timeout(timeout, self.storage.list_buckets(profile), || {
                        format!("listing buckets with profile '{profile}'")
                    })
                })
                .await;
            (profile, result)
        });

        let mut discovery = BucketDiscovery::default();
        let mut seen = HashSet::new();
        for (profile, result) in futures::future::join_all(lookups).await {
            match result {
                Ok(names) => {
                    tracing::debug!(profile = %profile, buckets = names.len(), "Discovered buckets");
                    for name in names {
                        if seen.insert(name.clone()) {
                            discovery.buckets.push(name);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(profile = %profile, error = %e, "Bucket discovery failed");
                    discovery.errors.push((profile.name.clone(), e));
                }
            }
        }
        discovery
    }

    /// Re-probe and re-classify every bucket.
    ///
    /// Without `force`, a fresh cache is left alone. Failures on single
    /// probes or profiles are collected in the report; buckets the refresh
    /// could not re-verify keep their previous entry.
    pub async fn refresh(&self, force: bool, progress: Option<&ProgressFn<'_>>) -> Result<RefreshReport> {
        let _guard = self.refresh_lock.lock().await;

        let freshness = self.freshness();
        if !force && !freshness.needs_refresh() {
            tracing::debug!("Bucket cache is fresh, skipping refresh");
            return Ok(RefreshReport::default());
        }
        tracing::info!(force, freshness = ?freshness, "Refreshing bucket access");

        let prior = {
            let state = self.read_state();
            state.trusted.clone().or_else(|| state.fallback.clone())
        };

        let mut report = RefreshReport {
            refreshed: true,
            ..Default::default()
        };
        let failed_profiles: Mutex<HashSet<String>> = Mutex::new(HashSet::new());

        let discovery = self.discover_buckets().await;
        for (profile, error) in &discovery.errors {
            if matches!(error, Error::ReauthFailed { .. }) {
                lock(&failed_profiles).insert(profile.clone());
            }
            report.discovery_errors.push(RefreshError {
                profile: profile.clone(),
                bucket: None,
                message: error.to_string(),
            });
        }

        let mut names = discovery.buckets;
        if let Some(prior) = &prior {
            let known: HashSet<String> = names.iter().cloned().collect();
            names.extend(prior.buckets.keys().filter(|n| !known.contains(*n)).cloned());
        }

        let pairs: Vec<(&Profile, &str)> = names
            .iter()
            .flat_map(|bucket| self.profiles.iter().map(move |p| (p, bucket.as_str())))
            .collect();
        let total = pairs.len();
        report.probes = total;

        let failed = &failed_profiles;
        let mut probes = stream::iter(pairs)
            .map(|(profile, bucket)| async move {
                let outcome = self.probe_with_reauth(profile, bucket, failed).await;
                (profile, bucket, outcome)
            })
            .buffer_unordered(self.settings.concurrency());

        let mut grouped: BTreeMap<&str, Vec<ProbeResult>> = BTreeMap::new();
        let mut completed = 0;
        while let Some((profile, bucket, outcome)) = probes.next().await {
            completed += 1;
            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    report.probe_errors.push(RefreshError {
                        profile: profile.name.clone(),
                        bucket: Some(bucket.to_string()),
                        message: e.to_string(),
                    });
                    ProbeResult::failed(&profile.name, bucket, &e)
                }
            };
            grouped.entry(bucket).or_default().push(result);
            if let Some(progress) = progress {
                progress(&ProbeProgress {
                    completed,
                    total,
                    bucket: bucket.to_string(),
                    profile: profile.name.clone(),
                });
            }
        }
        drop(probes);

        let now = Timestamp::now();
        let mut updates = BTreeMap::new();
        for name in &names {
            let results = grouped.get(name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            if self.classifier.is_unverified(name, results) {
                if prior.as_ref().is_some_and(|p| p.get(name).is_some()) {
                    tracing::info!(bucket = %name, "Keeping cached entry for unverified bucket");
                    report.unverified.push(name.clone());
                } else {
                    updates.insert(name.clone(), Bucket::unknown(name.as_str()));
                }
                continue;
            }
            updates.insert(name.clone(), self.classifier.classify(name, results, now));
        }

        let record = CacheStore::merge(prior.as_ref(), updates, self.fingerprint.clone(), now);
        report.buckets = record.buckets.len();
        if let Err(e) = self.store.save(&record) {
            tracing::warn!(path = %self.store.path().display(), error = %e, "Failed to save bucket cache");
            report.save_error = Some(e.to_string());
        }

        let mut state = self.write_state();
        state.trusted = Some(record);
        state.fallback = None;
        state.freshness = Freshness::Fresh;

        tracing::info!(
            buckets = report.buckets,
            probes = report.probes,
            errors = report.probe_errors.len() + report.discovery_errors.len(),
            "Refresh finished"
        );
        Ok(report)
    }

    async fn probe_with_reauth(
        &self,
        profile: &Profile,
        bucket: &str,
        failed: &Mutex<HashSet<String>>,
    ) -> Result<ProbeResult> {
        if lock(failed).contains(&profile.name) {
            let skipped = Error::ReauthFailed {
                profile: profile.name.clone(),
                detail: "skipped after an earlier failed login".into(),
            };
            return Ok(ProbeResult::failed(&profile.name, bucket, &skipped));
        }

        let result = self
            .reauth
            .with_reauth(profile, || self.prober.probe(profile, bucket))
            .await;
        if let Err(Error::ReauthFailed { .. }) = &result {
            lock(failed).insert(profile.name.clone());
        }
        result
    }

    /// Recursively total a prefix with the bucket's resolved profile
    pub async fn scan_prefix(
        &self,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary> {
        let profile = self.profile_for(bucket);
        self.scan_prefix_with(&profile, bucket, prefix, cancel).await
    }

    /// Recursively total a prefix with an explicit profile
    pub async fn scan_prefix_with(
        &self,
        profile: &Profile,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary> {
        let scanner = self.scanner_for(None);
        scanner.scan_prefix(profile, bucket, prefix, cancel).await
    }

    /// Paginated scan for callers that want running totals
    pub fn scan_stream(&self, bucket: &str, prefix: &str, max_keys: Option<usize>) -> ScanStream {
        let profile = self.profile_for(bucket);
        self.scanner_for(max_keys).stream(&profile, bucket, prefix)
    }

    fn scanner_for(&self, max_keys: Option<usize>) -> Scanner {
        match max_keys {
            Some(max_keys) => self.scanner.clone().with_max_keys(max_keys),
            None => self.scanner.clone(),
        }
    }

    /// One level of sub-prefixes and objects under `prefix`
    pub async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<PrefixListing> {
        let profile = self.profile_for(bucket);
        let timeout = self.settings.scan_timeout();
        let mut listing = PrefixListing {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            profile: profile.name.clone(),
            ..Default::default()
        };

        let mut token: Option<String> = None;
        loop {
            let request = ListRequest::new(bucket, prefix)
                .delimited()
                .max_keys(LIST_PAGE_KEYS)
                .page_token(token.take());
            let page = self
                .reauth
                .with_reauth(&profile, || {
                    with_timeout(timeout, self.storage.list(&profile, request.clone()), || {
                        format!("listing '{bucket}/{prefix}' with profile '{profile}'")
                    })
                })
                .await?;

            listing
                .prefixes
                .extend(page.common_prefixes.into_iter().filter(|p| p != prefix));
            listing.objects.extend(
                page.entries
                    .into_iter()
                    .filter(|o| !o.is_dir_marker() && o.key != prefix),
            );

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            bucket,
            prefix,
            prefixes = listing.prefixes.len(),
            objects = listing.objects.len(),
            "Listed prefix"
        );
        Ok(listing)
    }

    /// Read up to `length` bytes of an object starting at `offset`
    pub async fn preview(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Preview> {
        if offset.checked_add(length).is_none() {
            return Err(Error::InvalidPath(format!(
                "offset {offset} plus {length} bytes is past the largest object size"
            )));
        }
        let profile = self.profile_for(bucket);
        let read = self.read_range(&profile, bucket, key, offset, length).await?;
        let end = offset.saturating_add(read.data.len() as u64);
        Ok(Preview {
            truncated: read.total_size.is_some_and(|total| end < total),
            total_size: read.total_size,
            data: read.data,
        })
    }

    /// Download an object to `destination`.
    ///
    /// A directory destination receives the object's file name. Data goes to
    /// a `.part` file that is renamed into place once complete.
    pub async fn download(&self, bucket: &str, key: &str, destination: &Path) -> Result<Download> {
        let profile = self.profile_for(bucket);
        let target = download_target(key, destination)?;
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut part_name = target.file_name().unwrap_or_default().to_os_string();
        part_name.push(".part");
        let part = target.with_file_name(part_name);

        let written = self.download_into(&profile, bucket, key, &part).await;
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&part, &target).await?;

        tracing::info!(bucket, key, path = %target.display(), bytes, "Downloaded object");
        Ok(Download {
            path: target,
            bytes,
            profile: profile.name,
        })
    }

    async fn download_into(&self, profile: &Profile, bucket: &str, key: &str, part: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(part).await?;
        let mut offset = 0u64;
        loop {
            let read = self
                .read_range(profile, bucket, key, offset, DOWNLOAD_CHUNK_BYTES)
                .await?;
            let len = read.data.len() as u64;
            file.write_all(&read.data).await?;
            offset += len;

            let done = match read.total_size {
                Some(total) => offset >= total,
                None => len < DOWNLOAD_CHUNK_BYTES,
            };
            if done || len == 0 {
                break;
            }
        }
        file.flush().await?;
        Ok(offset)
    }

    async fn read_range(
        &self,
        profile: &Profile,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> Result<RangeRead> {
        let timeout = self.settings.scan_timeout();
        self.reauth
            .with_reauth(profile, || {
                with_timeout(
                    timeout,
                    self.storage.read_range(profile, bucket, key, offset, length),
                    || format!("reading '{bucket}/{key}' with profile '{profile}'"),
                )
            })
            .await
    }

    /// Run the login flow for each named profile, one after another
    pub async fn force_reauth(&self, profiles: &[String]) -> Vec<(String, Result<()>)> {
        let mut outcomes = Vec::with_capacity(profiles.len());
        for name in profiles {
            let outcome = match self.profiles.get(name) {
                Ok(profile) => self.reauth.reauthenticate(profile).await,
                Err(e) => Err(e),
            };
            outcomes.push((name.clone(), outcome));
        }
        outcomes
    }

    /// Profiles whose session needs an interactive login.
    ///
    /// With SSO configuration, one profile per start URL whose token is
    /// missing or about to expire; otherwise every profile the auth API
    /// reports as invalid.
    pub async fn login_targets(&self) -> Vec<Profile> {
        if let Some(sso) = &self.sso {
            return sso.login_targets(&self.profiles, Timestamp::now());
        }
        let mut targets = Vec::new();
        for profile in &self.profiles {
            match self.reauth.auth().is_session_valid(profile).await {
                Ok(true) => {}
                Ok(false) => targets.push(profile.clone()),
                Err(e) => {
                    tracing::warn!(profile = %profile, error = %e, "Could not check session");
                }
            }
        }
        targets
    }

    /// Log in every profile that needs it before the first refresh
    pub async fn preflight(&self) -> Vec<(String, Result<()>)> {
        let targets: Vec<String> = self
            .login_targets()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        if !targets.is_empty() {
            tracing::info!(profiles = ?targets, "Sessions need login");
        }
        self.force_reauth(&targets).await
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
    describe: impl FnOnce() -> String,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Timeout(describe()))?
}

fn download_target(key: &str, destination: &Path) -> Result<PathBuf> {
    if key.is_empty() || key.ends_with('/') {
        return Err(Error::InvalidPath(format!("'{key}' does not name an object")));
    }
    let is_dir = destination.is_dir() || destination.as_os_str().to_string_lossy().ends_with('/');
    if !is_dir {
        return Ok(destination.to_path_buf());
    }
    let name = key
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::InvalidPath(format!("'{key}' does not name an object")))?;
    Ok(destination.join(name))
}
