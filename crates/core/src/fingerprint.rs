//! Credential fingerprint
//!
//! A SHA-256 digest over the local AWS config and credentials files. Cached
//! classifications are only trusted while the fingerprint is unchanged.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::profile::AwsPaths;

/// Computes the fingerprint of the local credential material
#[derive(Debug, Clone)]
pub struct CredentialFingerprint {
    sources: Vec<(&'static str, PathBuf)>,
}

impl CredentialFingerprint {
    pub fn new(paths: &AwsPaths) -> Self {
        Self {
            sources: vec![
                ("config", paths.config.clone()),
                ("credentials", paths.credentials.clone()),
            ],
        }
    }

    /// Hex digest of every readable source, or `None` when none exist.
    ///
    /// Each source is framed by its label and NUL separators so that moving
    /// bytes between files changes the digest.
    pub fn compute(&self) -> Option<String> {
        let mut hasher = Sha256::new();
        let mut found = false;
        for (label, path) in &self.sources {
            let Ok(data) = std::fs::read(path) else {
                continue;
            };
            hasher.update(label.as_bytes());
            hasher.update([0u8]);
            hasher.update(&data);
            hasher.update([0u8]);
            found = true;
        }
        found.then(|| hex::encode(hasher.finalize()))
    }
}
