//! Access probing
//!
//! A probe issues a bounded listing against a bucket with one profile and, if
//! that succeeds, a 1-byte read of one of the listed keys.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::bucket::{ProbeFailure, ProbeResult};
use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::traits::{ListRequest, StorageApi};

/// Keys requested by the listing probe
pub const PROBE_LIST_KEYS: i32 = 10;

/// Keys tried by the read probe before giving up
pub const PROBE_READ_ATTEMPTS: usize = 5;

/// Bytes fetched by the read probe
const PROBE_READ_BYTES: u64 = 1;

/// Probes a single (profile, bucket) pair
#[derive(Clone)]
pub struct Prober {
    storage: Arc<dyn StorageApi>,
    timeout: Duration,
}

impl Prober {
    pub fn new(storage: Arc<dyn StorageApi>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Probe one bucket with one profile.
    ///
    /// Permission failures and timeouts are encoded in the result. Expired
    /// sessions, transport failures on the listing, and malformed bucket
    /// names are returned as errors.
    pub async fn probe(&self, profile: &Profile, bucket: &str) -> Result<ProbeResult> {
        validate_bucket_name(bucket)?;

        let mut result = ProbeResult {
            profile: profile.name.clone(),
            bucket: bucket.to_string(),
            list_ok: false,
            read_ok: false,
            listed_keys: None,
            error: None,
        };

        let request = ListRequest::new(bucket, "").max_keys(PROBE_LIST_KEYS);
        let page = match self
            .timed("list", profile, bucket, self.storage.list(profile, request))
            .await
        {
            Ok(page) => page,
            Err(e) if e.is_access_denied() || matches!(e, Error::Timeout(_)) => {
                tracing::debug!(profile = %profile, bucket, error = %e, "List probe refused");
                result.error = Some(ProbeFailure::from(&e));
                return Ok(result);
            }
            Err(e) => return Err(e),
        };

        result.list_ok = true;
        result.listed_keys = Some(page.entries.len());

        let candidates = page
            .entries
            .iter()
            .filter(|entry| !entry.key.is_empty())
            .take(PROBE_READ_ATTEMPTS);

        for entry in candidates {
            let read = self.storage.read_range(profile, bucket, &entry.key, 0, PROBE_READ_BYTES);
            match self.timed("read", profile, bucket, read).await {
                Ok(_) => {
                    result.read_ok = true;
                    result.error = None;
                    break;
                }
                Err(e) if e.is_session_expired() => return Err(e),
                Err(e) => {
                    tracing::debug!(profile = %profile, bucket, key = %entry.key, error = %e, "Read probe failed");
                    result.error = Some(ProbeFailure::from(&e));
                }
            }
        }

        tracing::debug!(
            profile = %profile,
            bucket,
            list_ok = result.list_ok,
            read_ok = result.read_ok,
            "Probe finished"
        );
        Ok(result)
    }

    async fn timed<T>(
        &self,
        operation: &str,
        profile: &Profile,
        bucket: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{operation} probe on '{bucket}' with profile '{profile}'"
                ))
            })?
    }
}

/// Reject names no storage service would accept
pub fn validate_bucket_name(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.len() > 255 {
        return Err(Error::InvalidBucket(format!("'{bucket}' has an invalid length")));
    }
    if bucket.contains('/') || bucket.chars().any(char::is_whitespace) {
        return Err(Error::InvalidBucket(format!(
            "'{bucket}' contains '/' or whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::FailureKind;
    use crate::traits::{ListPage, MockStorageApi, ObjectInfo, RangeRead};

    fn page(keys: &[&str]) -> ListPage {
        ListPage {
            entries: keys.iter().map(|k| ObjectInfo::file(*k, 10)).collect(),
            ..Default::default()
        }
    }

    fn denied(bucket: &str) -> Error {
        Error::AccessDenied {
            profile: "dev".into(),
            bucket: bucket.into(),
            detail: "AccessDenied".into(),
        }
    }

    fn prober(mock: MockStorageApi) -> Prober {
        Prober::new(Arc::new(mock), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_probe_good() {
        let mut mock = MockStorageApi::new();
        mock.expect_list()
            .withf(|_, req| req.bucket == "alpha" && req.max_keys == Some(PROBE_LIST_KEYS))
            .times(1)
            .returning(|_, _| Ok(page(&["a.txt", "b.txt"])));
        mock.expect_read_range()
            .withf(|_, bucket, key, offset, length| {
                bucket == "alpha" && key == "a.txt" && *offset == 0 && *length == 1
            })
            .times(1)
            .returning(|_, _, _, _, _| {
                Ok(RangeRead {
                    data: vec![b'x'],
                    total_size: Some(10),
                })
            });

        let result = prober(mock).probe(&Profile::new("dev"), "alpha").await.unwrap();
        assert!(result.list_ok);
        assert!(result.read_ok);
        assert_eq!(result.listed_keys, Some(2));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_list_denied_is_not_an_error() {
        let mut mock = MockStorageApi::new();
        mock.expect_list()
            .returning(|_, req| Err(denied(&req.bucket)));
        mock.expect_read_range().never();

        let result = prober(mock).probe(&Profile::new("dev"), "alpha").await.unwrap();
        assert!(!result.list_ok);
        assert!(!result.read_ok);
        assert_eq!(result.error.unwrap().kind, FailureKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_probe_read_denied_tries_at_most_five_keys() {
        let mut mock = MockStorageApi::new();
        mock.expect_list()
            .returning(|_, _| Ok(page(&["1", "2", "3", "4", "5", "6", "7"])));
        mock.expect_read_range()
            .times(PROBE_READ_ATTEMPTS)
            .returning(|_, bucket, _, _, _| Err(denied(bucket)));

        let result = prober(mock).probe(&Profile::new("dev"), "alpha").await.unwrap();
        assert!(result.list_ok);
        assert!(!result.read_ok);
    }

    #[tokio::test]
    async fn test_probe_empty_bucket() {
        let mut mock = MockStorageApi::new();
        mock.expect_list().returning(|_, _| Ok(ListPage::default()));
        mock.expect_read_range().never();

        let result = prober(mock).probe(&Profile::new("dev"), "alpha").await.unwrap();
        assert!(result.list_ok);
        assert!(!result.read_ok);
        assert_eq!(result.listed_keys, Some(0));
    }

    #[tokio::test]
    async fn test_probe_session_expired_propagates() {
        let mut mock = MockStorageApi::new();
        mock.expect_list().returning(|p, _| {
            Err(Error::SessionExpired {
                profile: p.name.clone(),
                detail: "token has expired".into(),
            })
        });

        let err = prober(mock)
            .probe(&Profile::new("dev"), "alpha")
            .await
            .unwrap_err();
        assert!(err.is_session_expired());
    }

    #[tokio::test]
    async fn test_probe_transport_failure_propagates() {
        let mut mock = MockStorageApi::new();
        mock.expect_list()
            .returning(|_, _| Err(Error::Transport("dns failure".into())));

        let err = prober(mock)
            .probe(&Profile::new("dev"), "alpha")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_probe_rejects_malformed_bucket() {
        let mock = MockStorageApi::new();
        let err = prober(mock)
            .probe(&Profile::new("dev"), "bad/name")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBucket(_)));
    }

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("my-bucket.logs").is_ok());
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name("has space").is_err());
    }
}
