//! awss-s3: AWS SDK adapter for awss
//!
//! Implements the StorageApi and AuthApi traits from awss-core using
//! aws-sdk-s3 and the AWS CLI SSO login flow. It is the only crate that
//! directly depends on the AWS SDK.

pub mod auth;
pub mod client;
mod error;

pub use auth::SsoAuth;
pub use client::S3Storage;
