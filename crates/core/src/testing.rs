//! In-memory storage and auth fakes for engine tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::traits::{AuthApi, ListPage, ListRequest, ObjectInfo, RangeRead, StorageApi};

/// What a profile may do against a bucket in the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    ListAndRead,
    ListOnly,
}

#[derive(Default)]
pub struct MemoryStorage {
    visible: HashMap<String, Vec<String>>,
    objects: BTreeMap<String, Vec<ObjectInfo>>,
    grants: HashMap<(String, String), Grant>,
    broken: HashSet<(String, String)>,
    delay: Option<Duration>,
    expired: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
    read_calls: AtomicUsize,
    probed: Mutex<Vec<(String, String)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buckets returned by `list_buckets` for a profile
    pub fn visible(mut self, profile: &str, buckets: &[&str]) -> Self {
        self.visible.insert(
            profile.to_string(),
            buckets.iter().map(|b| b.to_string()).collect(),
        );
        self
    }

    pub fn object(self, bucket: &str, key: &str, size: u64) -> Self {
        self.entry(bucket, ObjectInfo::file(key, size))
    }

    pub fn entry(mut self, bucket: &str, info: ObjectInfo) -> Self {
        let objects = self.objects.entry(bucket.to_string()).or_default();
        objects.push(info);
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }

    /// `count` objects named `prefix` + zero-padded index, each `size` bytes
    pub fn objects(mut self, bucket: &str, prefix: &str, count: usize, size: u64) -> Self {
        let objects = self.objects.entry(bucket.to_string()).or_default();
        objects.extend((0..count).map(|i| ObjectInfo::file(format!("{prefix}{i:08}"), size)));
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }

    /// `count` directory markers named `prefix` + zero-padded index + `/`
    pub fn markers(mut self, bucket: &str, prefix: &str, count: usize) -> Self {
        let objects = self.objects.entry(bucket.to_string()).or_default();
        objects.extend((0..count).map(|i| ObjectInfo::file(format!("{prefix}{i:06}/"), 0)));
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }

    pub fn empty_bucket(mut self, bucket: &str) -> Self {
        self.objects.entry(bucket.to_string()).or_default();
        self
    }

    pub fn grant(mut self, profile: &str, bucket: &str, grant: Grant) -> Self {
        self.grants
            .insert((profile.to_string(), bucket.to_string()), grant);
        self
    }

    /// Every call for this pair fails with a transport error
    pub fn broken(mut self, profile: &str, bucket: &str) -> Self {
        self.broken.insert((profile.to_string(), bucket.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn expire(&self, profile: &str) {
        self.expired.lock().unwrap().insert(profile.to_string());
    }

    pub fn renew(&self, profile: &str) {
        self.expired.lock().unwrap().remove(profile);
    }

    pub fn is_expired(&self, profile: &str) -> bool {
        self.expired.lock().unwrap().contains(profile)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// (profile, bucket) pairs that received a listing call
    pub fn probed(&self) -> Vec<(String, String)> {
        self.probed.lock().unwrap().clone()
    }

    async fn gate(&self, profile: &Profile, bucket: &str) -> Result<Option<Grant>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.is_expired(&profile.name) {
            return Err(Error::SessionExpired {
                profile: profile.name.clone(),
                detail: "The SSO session associated with this profile has expired".into(),
            });
        }
        let pair = (profile.name.clone(), bucket.to_string());
        if self.broken.contains(&pair) {
            return Err(Error::Transport(format!("connection reset ({bucket})")));
        }
        Ok(self.grants.get(&pair).copied())
    }

    fn denied(profile: &Profile, bucket: &str) -> Error {
        Error::AccessDenied {
            profile: profile.name.clone(),
            bucket: bucket.to_string(),
            detail: "AccessDenied".into(),
        }
    }
}

#[async_trait]
impl StorageApi for MemoryStorage {
    async fn list_buckets(&self, profile: &Profile) -> Result<Vec<String>> {
        if self.is_expired(&profile.name) {
            return Err(Error::SessionExpired {
                profile: profile.name.clone(),
                detail: "token has expired".into(),
            });
        }
        Ok(self.visible.get(&profile.name).cloned().unwrap_or_default())
    }

    async fn list(&self, profile: &Profile, request: ListRequest) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.probed
            .lock()
            .unwrap()
            .push((profile.name.clone(), request.bucket.clone()));
        if self.gate(profile, &request.bucket).await?.is_none() {
            return Err(Self::denied(profile, &request.bucket));
        }

        let matching: Vec<&ObjectInfo> = self
            .objects
            .get(&request.bucket)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|o| o.key.starts_with(&request.prefix))
                    .collect()
            })
            .unwrap_or_default();

        let start: usize = request
            .page_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let max = request.max_keys.unwrap_or(1000).max(1) as usize;
        let end = (start + max).min(matching.len());

        let mut page = ListPage::default();
        for object in matching.get(start..end).unwrap_or_default() {
            let rest = &object.key[request.prefix.len()..];
            match (&request.delimiter, rest.find('/')) {
                (Some(_), Some(pos)) => {
                    let common = format!("{}{}", request.prefix, &rest[..=pos]);
                    if !page.common_prefixes.contains(&common) {
                        page.common_prefixes.push(common);
                    }
                }
                _ => page.entries.push((*object).clone()),
            }
        }
        page.next_page_token = (end < matching.len()).then(|| end.to_string());
        Ok(page)
    }

    async fn read_range(
        &self,
        profile: &Profile,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> Result<RangeRead> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.gate(profile, bucket).await? != Some(Grant::ListAndRead) {
            return Err(Self::denied(profile, bucket));
        }
        let object = self
            .objects
            .get(bucket)
            .and_then(|objects| objects.iter().find(|o| o.key == key))
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;

        let total = object.size_bytes;
        let start = offset.min(total);
        let end = offset.saturating_add(length).min(total);
        // Content is the key's bytes repeated to the object size
        let data = (start..end)
            .map(|i| key.as_bytes()[(i as usize) % key.len().max(1)])
            .collect();
        Ok(RangeRead {
            data,
            total_size: Some(total),
        })
    }
}

/// Auth fake that records logins and optionally renews a `MemoryStorage`
pub struct ScriptedAuth {
    failure: Option<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    storage: Option<Arc<MemoryStorage>>,
}

impl ScriptedAuth {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            storage: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::succeeding()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Successful logins renew the profile in `storage`
    pub fn renewing(mut self, storage: Arc<MemoryStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, profile: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == profile)
            .count()
    }
}

#[async_trait]
impl AuthApi for ScriptedAuth {
    async fn is_session_valid(&self, profile: &Profile) -> Result<bool> {
        Ok(self
            .storage
            .as_ref()
            .is_none_or(|storage| !storage.is_expired(&profile.name)))
    }

    async fn reauthenticate(&self, profile: &Profile) -> Result<()> {
        self.calls.lock().unwrap().push(profile.name.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(Error::General(message.clone()));
        }
        if let Some(storage) = &self.storage {
            storage.renew(&profile.name);
        }
        Ok(())
    }
}
