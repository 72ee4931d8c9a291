//! awss-core: Core library for the awss multi-profile S3 browser
//!
//! This crate provides the profile resolution and access classification
//! engine, including:
//! - Profile discovery and the credential fingerprint
//! - Access probing and classification
//! - The bucket cache
//! - Single-flight reauthentication on expired sessions
//! - Recursive prefix scanning
//! - Configuration and preferences
//!
//! This crate is designed to be independent of any specific S3 SDK; storage
//! and authentication are reached through the traits in [`traits`].

pub mod bucket;
pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod path;
pub mod probe;
pub mod profile;
pub mod reauth;
pub mod scan;
pub mod sso;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use bucket::{AccessLevel, Bucket, ProbeResult};
pub use cache::{CacheRecord, CacheStore, Freshness};
pub use classify::Classifier;
pub use config::{BucketFilters, Config, ConfigManager, EngineSettings};
pub use engine::{
    Download, Engine, EngineBuilder, PrefixListing, Preview, ProbeProgress, ProgressFn,
    RefreshReport,
};
pub use error::{Error, Result};
pub use fingerprint::CredentialFingerprint;
pub use path::{S3Path, parse_object_path, parse_s3_path};
pub use probe::Prober;
pub use profile::{AwsPaths, Profile, ProfileSet};
pub use reauth::ReauthCoordinator;
pub use scan::{ScanStream, ScanSummary, Scanner};
pub use sso::SsoPreflight;
pub use traits::{AuthApi, ListPage, ListRequest, ObjectInfo, RangeRead, StorageApi};
