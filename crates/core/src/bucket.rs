//! Bucket classification types

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// What the resolved profile can do against a bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Listing and reading objects both work
    Good,
    /// Listing works, reading does not
    NoDownload,
    /// Listing does not work for any profile
    NoView,
    /// Not classified yet
    #[default]
    #[serde(other)]
    Unknown,
}

impl AccessLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Good => "good",
            AccessLevel::NoDownload => "no_download",
            AccessLevel::NoView => "no_view",
            AccessLevel::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one bucket in the aggregated view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Bucket name, unique across the aggregated view
    #[serde(skip)]
    pub name: String,

    #[serde(default)]
    pub access_level: AccessLevel,

    /// Profile chosen for this bucket; `None` until a profile can list it
    #[serde(default)]
    pub resolved_profile: Option<String>,

    /// Known only after a successful listing
    #[serde(default)]
    pub is_empty: Option<bool>,

    #[serde(default)]
    pub last_verified_at: Option<Timestamp>,
}

impl Bucket {
    /// An unclassified bucket
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access_level: AccessLevel::Unknown,
            resolved_profile: None,
            is_empty: None,
            last_verified_at: None,
        }
    }
}

/// Why a probe step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AccessDenied,
    Timeout,
    Transport,
    ReauthFailed,
    Other,
}

/// Failure detail carried by a probe result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ProbeFailure {
    /// Whether the failure says nothing about the profile's permissions
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self.kind, FailureKind::AccessDenied)
    }
}

impl From<&Error> for ProbeFailure {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::AccessDenied { .. } => FailureKind::AccessDenied,
            Error::Timeout(_) => FailureKind::Timeout,
            Error::Transport(_) => FailureKind::Transport,
            Error::ReauthFailed { .. } | Error::SessionExpired { .. } => FailureKind::ReauthFailed,
            _ => FailureKind::Other,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Outcome of probing one (profile, bucket) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub profile: String,
    pub bucket: String,
    pub list_ok: bool,
    pub read_ok: bool,

    /// Number of keys the bounded listing returned, when it succeeded
    pub listed_keys: Option<usize>,

    pub error: Option<ProbeFailure>,
}

impl ProbeResult {
    /// A probe that could not complete for this profile
    pub fn failed(profile: impl Into<String>, bucket: impl Into<String>, err: &Error) -> Self {
        Self {
            profile: profile.into(),
            bucket: bucket.into(),
            list_ok: false,
            read_ok: false,
            listed_keys: None,
            error: Some(ProbeFailure::from(err)),
        }
    }

    /// Whether the failure left the profile's access undetermined
    pub fn is_inconclusive(&self) -> bool {
        !self.list_ok
            && self
                .error
                .as_ref()
                .is_some_and(ProbeFailure::is_infrastructure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_level_serde() {
        let json = serde_json::to_string(&AccessLevel::NoDownload).unwrap();
        assert_eq!(json, "\"no_download\"");
        let level: AccessLevel = serde_json::from_str("\"good\"").unwrap();
        assert_eq!(level, AccessLevel::Good);
        let level: AccessLevel = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(level, AccessLevel::Unknown);
    }

    #[test]
    fn test_probe_failure_kind() {
        let denied = Error::AccessDenied {
            profile: "dev".into(),
            bucket: "b".into(),
            detail: "nope".into(),
        };
        assert!(!ProbeFailure::from(&denied).is_infrastructure());
        assert!(ProbeFailure::from(&Error::Timeout("list".into())).is_infrastructure());
    }

    #[test]
    fn test_inconclusive() {
        let result = ProbeResult::failed("dev", "b", &Error::Transport("reset".into()));
        assert!(result.is_inconclusive());

        let denied = Error::AccessDenied {
            profile: "dev".into(),
            bucket: "b".into(),
            detail: "nope".into(),
        };
        assert!(!ProbeResult::failed("dev", "b", &denied).is_inconclusive());
    }
}
