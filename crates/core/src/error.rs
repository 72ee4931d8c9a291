//! Error types for awss-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes
//! and classified by the engine (access denied, session expiry, transport).

use thiserror::Error;

/// Result type alias for awss-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Substrings that identify an expired SSO session or token in SDK error text.
const SESSION_EXPIRED_MARKERS: &[&str] = &[
    "unauthorizedssotokenerror",
    "sso session",
    "sso token",
    "token has expired",
    "token is expired",
    "expiredtoken",
    "the sso session associated with this profile has expired",
    "error loading sso token",
    "aws sso login",
];

/// Substrings that identify a permission failure in SDK error text.
const ACCESS_DENIED_MARKERS: &[&str] = &[
    "accessdenied",
    "access denied",
    "allaccessdisabled",
    "forbidden",
    "invalidaccesskeyid",
    "signaturedoesnotmatch",
];

/// Error types for awss-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The profile is not permitted to perform the operation on the bucket
    #[error("Access denied for profile '{profile}' on bucket '{bucket}': {detail}")]
    AccessDenied {
        profile: String,
        bucket: String,
        detail: String,
    },

    /// The credential session for the profile has expired
    #[error("Session expired for profile '{profile}': {detail}")]
    SessionExpired { profile: String, detail: String },

    /// Reauthentication was attempted and did not succeed
    #[error("Reauthentication failed for profile '{profile}': {detail}")]
    ReauthFailed { profile: String, detail: String },

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Transport(String),

    /// A remote call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The cache document could not be decoded
    #[error("Cache corrupt: {0}")]
    CacheCorrupt(String),

    /// Bucket name is not acceptable to the storage API
    #[error("Invalid bucket name: {0}")]
    InvalidBucket(String),

    /// Invalid path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Profile not configured
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::InvalidBucket(_) => 2, // UsageError
            Error::Config(_) => 2,                                // UsageError
            Error::Transport(_) | Error::Timeout(_) => 3,         // NetworkError
            Error::AccessDenied { .. }
            | Error::SessionExpired { .. }
            | Error::ReauthFailed { .. } => 4, // AuthError
            Error::NotFound(_) | Error::ProfileNotFound(_) => 5,  // NotFound
            Error::Cancelled => 130,                              // Interrupted
            _ => 1,                                               // GeneralError
        }
    }

    /// Whether this error means the profile's session must be renewed
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired { .. })
    }

    /// Whether this error is an ordinary permission failure
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied { .. })
    }

    /// Actionable hint for the user, if there is one
    pub fn guidance(&self) -> Option<String> {
        match self {
            Error::SessionExpired { profile, .. } | Error::ReauthFailed { profile, .. } => Some(
                format!("Run `aws sso login --profile {profile}` and try again."),
            ),
            Error::AccessDenied { bucket, .. } => Some(format!(
                "No configured profile can read '{bucket}'. Run `awss resolve {bucket}` to see which profile was tried."
            )),
            _ => None,
        }
    }
}

/// Check whether an SDK error message describes an expired SSO session
pub fn is_session_expired_message(message: &str) -> bool {
    let text = message.to_lowercase();
    SESSION_EXPIRED_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}

/// Check whether an SDK error message describes a permission failure
pub fn is_access_denied_message(message: &str) -> bool {
    let text = message.to_lowercase();
    ACCESS_DENIED_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}
