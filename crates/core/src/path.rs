//! S3 path parsing
//!
//! Handles parsing of remote paths in the format `s3://bucket[/key]`. The
//! scheme is optional and leading slashes are ignored.

use crate::error::{Error, Result};

const SCHEME: &str = "s3://";

/// A parsed path pointing to an S3 location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Path {
    /// Bucket name
    pub bucket: String,
    /// Object key or prefix (empty for bucket root)
    pub key: String,
}

impl S3Path {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Whether the path has directory semantics
    pub fn is_dir(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// Last key component, without any trailing slash
    pub fn file_name(&self) -> Option<&str> {
        self.key
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Get the parent path (one level up)
    pub fn parent(&self) -> Option<Self> {
        if self.key.is_empty() {
            return None;
        }
        let key = self.key.trim_end_matches('/');
        let parent = match key.rfind('/') {
            Some(pos) => format!("{}/", &key[..pos]),
            None => String::new(),
        };
        Some(Self::new(self.bucket.clone(), parent))
    }

    /// Join a child path component
    pub fn join(&self, child: &str) -> Self {
        let base = self.key.trim_end_matches('/');
        let key = if base.is_empty() {
            child.to_string()
        } else {
            format!("{base}/{child}")
        };
        Self::new(self.bucket.clone(), key)
    }
}

impl std::fmt::Display for S3Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
    }
}

/// Split `[s3://]bucket[/rest]` into bucket and raw remainder
fn split(value: &str) -> Result<(&str, &str)> {
    let path = value.trim();
    let path = path.strip_prefix(SCHEME).unwrap_or(path).trim_start_matches('/');
    if path.is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{value}' has no bucket. Use format: s3://bucket[/key]"
        )));
    }
    Ok(path.split_once('/').unwrap_or((path, "")))
}

/// Parse a path into a bucket and the directory prefix it points into.
///
/// A key without a trailing slash is reduced to its parent directory:
/// `s3://bucket/a/b.txt` yields prefix `a/`.
pub fn parse_s3_path(value: &str) -> Result<S3Path> {
    let (bucket, rest) = split(value)?;
    let rest = rest.trim_start_matches('/');
    let prefix = if rest.is_empty() || rest.ends_with('/') {
        rest.to_string()
    } else {
        match rest.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/"),
            None => String::new(),
        }
    };
    Ok(S3Path::new(bucket, prefix))
}

/// Parse a path into a bucket and the full key, verbatim
pub fn parse_object_path(value: &str) -> Result<S3Path> {
    let (bucket, key) = split(value)?;
    Ok(S3Path::new(bucket, key))
}
