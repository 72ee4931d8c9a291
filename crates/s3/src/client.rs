//! S3 storage implementation
//!
//! Wraps aws-sdk-s3 and implements the StorageApi trait from awss-core. One
//! SDK client is built lazily per (profile, region) and reused; buckets that
//! answer from another region are remembered and retried there once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_smithy_types::DateTime;

use awss_core::{Error, ListPage, ListRequest, ObjectInfo, Profile, RangeRead, Result, StorageApi};

use crate::error::SdkFailure;

/// Region used when neither the profile nor the environment names one
const FALLBACK_REGION: &str = "us-east-1";

type ClientKey = (String, Option<String>);

/// StorageApi backed by the AWS SDK
#[derive(Default)]
pub struct S3Storage {
    clients: Mutex<HashMap<ClientKey, Client>>,
    /// Region each bucket was found in, learnt from redirects
    bucket_regions: Mutex<HashMap<String, String>>,
}

impl S3Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or build the client for a profile, optionally pinned to a region
    async fn client(&self, profile: &Profile, region: Option<String>) -> Client {
        let region = region.or_else(|| profile.region.clone());
        let key = (profile.name.clone(), region.clone());
        if let Some(client) = lock(&self.clients).get(&key) {
            return client.clone();
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).profile_name(&profile.name);
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if sdk_config.region().is_none() {
            builder = builder.region(Region::new(FALLBACK_REGION));
        }
        let client = Client::from_conf(builder.build());
        tracing::debug!(profile = %profile, region = ?key.1, "Built S3 client");

        lock(&self.clients).insert(key, client.clone());
        client
    }

    fn bucket_region(&self, bucket: &str) -> Option<String> {
        lock(&self.bucket_regions).get(bucket).cloned()
    }

    /// Run `call` against the bucket's region, following one region redirect
    async fn regional<T, F, Fut>(&self, profile: &Profile, bucket: &str, mut call: F) -> Result<T>
    where
        F: FnMut(Client) -> Fut,
        Fut: Future<Output = std::result::Result<T, SdkFailure>>,
    {
        let known = self.bucket_region(bucket);
        let client = self.client(profile, known.clone()).await;
        match call(client).await {
            Ok(value) => Ok(value),
            Err(SdkFailure {
                region: Some(region),
                ..
            }) if known.as_deref() != Some(region.as_str()) => {
                tracing::debug!(bucket, region = %region, "Bucket lives in another region");
                lock(&self.bucket_regions).insert(bucket.to_string(), region.clone());
                let client = self.client(profile, Some(region)).await;
                call(client).await.map_err(|f| f.error)
            }
            Err(failure) => Err(failure.error),
        }
    }
}

#[async_trait]
impl StorageApi for S3Storage {
    async fn list_buckets(&self, profile: &Profile) -> Result<Vec<String>> {
        let client = self.client(profile, None).await;
        let response = client
            .list_buckets()
            .send()
            .await
            .map_err(|e| SdkFailure::new(e, profile, "*").error)?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn list(&self, profile: &Profile, request: ListRequest) -> Result<ListPage> {
        let bucket = request.bucket.clone();
        self.regional(profile, &bucket, |client| {
            let request = request.clone();
            async move {
                let mut call = client.list_objects_v2().bucket(&request.bucket);
                if !request.prefix.is_empty() {
                    call = call.prefix(&request.prefix);
                }
                if let Some(delimiter) = &request.delimiter {
                    call = call.delimiter(delimiter);
                }
                if let Some(max) = request.max_keys {
                    call = call.max_keys(max);
                }
                if let Some(token) = &request.page_token {
                    call = call.continuation_token(token);
                }

                let response = call
                    .send()
                    .await
                    .map_err(|e| SdkFailure::new(e, profile, &request.bucket))?;

                let entries = response
                    .contents()
                    .iter()
                    .map(|object| ObjectInfo {
                        key: object.key().unwrap_or_default().to_string(),
                        size_bytes: object.size().unwrap_or(0).max(0) as u64,
                        last_modified: object.last_modified().and_then(to_timestamp),
                        storage_class: object.storage_class().map(|sc| sc.as_str().to_string()),
                    })
                    .collect();
                let common_prefixes = response
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_string))
                    .collect();
                let next_page_token = if response.is_truncated().unwrap_or(false) {
                    response.next_continuation_token().map(str::to_string)
                } else {
                    None
                };

                Ok(ListPage {
                    entries,
                    common_prefixes,
                    next_page_token,
                })
            }
        })
        .await
    }

    async fn read_range(
        &self,
        profile: &Profile,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> Result<RangeRead> {
        if length == 0 {
            return Ok(RangeRead::default());
        }
        let range = range_header(offset, length)?;

        self.regional(profile, bucket, |client| {
            let range = range.clone();
            async move {
                let response = client
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .range(range)
                    .send()
                    .await;

                let response = match response {
                    Ok(response) => response,
                    Err(e) => {
                        let failure = SdkFailure::new(e, profile, bucket);
                        // Ranges past the end of an object are refused only after
                        // authorization, so the object is readable.
                        if is_invalid_range(&failure.error) {
                            return Ok(RangeRead {
                                data: Vec::new(),
                                total_size: Some(0),
                            });
                        }
                        return Err(failure);
                    }
                };

                let total_size = response
                    .content_range()
                    .and_then(total_from_content_range)
                    .or_else(|| response.content_length().map(|l| l.max(0) as u64));
                let data = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| SdkFailure {
                        error: Error::Transport(e.to_string()),
                        region: None,
                    })?
                    .into_bytes()
                    .to_vec();

                Ok(RangeRead { data, total_size })
            }
        })
        .await
    }

    fn reset_profile(&self, profile: &str) {
        lock(&self.clients).retain(|(name, _), _| name != profile);
        tracing::debug!(profile, "Dropped cached S3 clients");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

fn to_timestamp(time: &DateTime) -> Option<jiff::Timestamp> {
    jiff::Timestamp::new(time.secs(), time.subsec_nanos() as i32).ok()
}

/// Inclusive `Range` header for a non-empty read
fn range_header(offset: u64, length: u64) -> Result<String> {
    let last = length
        .checked_sub(1)
        .and_then(|span| offset.checked_add(span))
        .ok_or_else(|| Error::InvalidPath(format!("no byte range of {length} at offset {offset}")))?;
    Ok(format!("bytes={offset}-{last}"))
}

/// Total object size from a `Content-Range: bytes 0-0/1234` value
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn is_invalid_range(error: &Error) -> bool {
    matches!(error, Error::General(message) if message.contains("InvalidRange"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        assert_eq!(range_header(0, 1).unwrap(), "bytes=0-0");
        assert_eq!(range_header(100, 50).unwrap(), "bytes=100-149");
        assert_eq!(range_header(u64::MAX, 1).unwrap(), format!("bytes={0}-{0}", u64::MAX));
        assert!(matches!(range_header(u64::MAX, 2), Err(Error::InvalidPath(_))));
        assert!(range_header(0, 0).is_err());
    }

    #[test]
    fn test_total_from_content_range() {
        assert_eq!(total_from_content_range("bytes 0-0/1234"), Some(1234));
        assert_eq!(total_from_content_range("bytes 0-0/*"), None);
        assert_eq!(total_from_content_range("garbage"), None);
    }

    #[test]
    fn test_invalid_range_detection() {
        assert!(is_invalid_range(&Error::General(
            "service error: InvalidRange: The requested range is not satisfiable".into()
        )));
        assert!(!is_invalid_range(&Error::Transport("InvalidRange".into())));
    }

    #[test]
    fn test_to_timestamp() {
        let time = DateTime::from_secs(1_700_000_000);
        assert_eq!(to_timestamp(&time).unwrap().as_second(), 1_700_000_000);
    }

    #[test]
    fn test_reset_profile_drops_only_that_profile() {
        let storage = S3Storage::new();
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        let client = Client::from_conf(config);
        {
            let mut clients = lock(&storage.clients);
            clients.insert(("dev".into(), None), client.clone());
            clients.insert(("dev".into(), Some("eu-west-1".into())), client.clone());
            clients.insert(("prod".into(), None), client);
        }

        storage.reset_profile("dev");
        let clients = lock(&storage.clients);
        assert_eq!(clients.len(), 1);
        assert!(clients.contains_key(&("prod".to_string(), None)));
    }
}
