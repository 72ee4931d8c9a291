//! Storage and authentication trait definitions
//!
//! These traits define the external collaborators of the engine. They allow
//! the engine to be decoupled from the AWS SDK and to be tested with fakes.

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::profile::Profile;

/// Metadata for a listed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,

    /// Size in bytes
    pub size_bytes: u64,

    /// Last modified timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// Storage class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

impl ObjectInfo {
    /// Create a new ObjectInfo for a file
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size_bytes: size,
            last_modified: None,
            storage_class: None,
        }
    }

    /// Whether the key is a zero-byte directory marker
    pub fn is_dir_marker(&self) -> bool {
        self.key.ends_with('/')
    }

    pub fn size_human(&self) -> String {
        humansize::format_size(self.size_bytes, humansize::BINARY)
    }
}

/// A single listing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Bucket to list
    pub bucket: String,

    /// Prefix to filter by
    pub prefix: String,

    /// Delimiter for grouping (usually "/"); `None` lists recursively
    pub delimiter: Option<String>,

    /// Maximum number of keys to return per request
    pub max_keys: Option<i32>,

    /// Continuation token for pagination
    pub page_token: Option<String>,
}

impl ListRequest {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn delimited(mut self) -> Self {
        self.delimiter = Some("/".to_string());
        self
    }

    pub fn max_keys(mut self, max_keys: i32) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    pub fn page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page
    pub entries: Vec<ObjectInfo>,

    /// Common prefixes (sub-directories) when a delimiter was given
    pub common_prefixes: Vec<String>,

    /// Continuation token for the next page
    pub next_page_token: Option<String>,
}

/// Bytes returned by a ranged read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRead {
    pub data: Vec<u8>,

    /// Total object size, when the service reported it
    pub total_size: Option<u64>,
}

/// Storage API consumed by the engine
///
/// Implementations map permission failures to `Error::AccessDenied`, expired
/// sessions to `Error::SessionExpired`, and network failures to
/// `Error::Transport`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// List the bucket names visible to a profile
    async fn list_buckets(&self, profile: &Profile) -> Result<Vec<String>>;

    /// List one page of objects
    async fn list(&self, profile: &Profile, request: ListRequest) -> Result<ListPage>;

    /// Read `length` bytes starting at `offset`
    async fn read_range(
        &self,
        profile: &Profile,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> Result<RangeRead>;

    /// Drop any cached client state for a profile, e.g. after reauthentication
    fn reset_profile(&self, _profile: &str) {}
}

/// Authentication API consumed by the engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Whether the profile's session is currently usable
    async fn is_session_valid(&self, profile: &Profile) -> Result<bool>;

    /// Run the external interactive login flow for a profile
    async fn reauthenticate(&self, profile: &Profile) -> Result<()>;
}
