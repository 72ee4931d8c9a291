//! Profile management
//!
//! Profiles are named credential contexts from the local AWS configuration.
//! The profile set is fixed for a session once it has been loaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the implicit profile
pub const DEFAULT_PROFILE: &str = "default";

/// Locations of the local AWS configuration material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsPaths {
    /// Shared config file (`~/.aws/config`)
    pub config: PathBuf,
    /// Shared credentials file (`~/.aws/credentials`)
    pub credentials: PathBuf,
    /// SSO token cache directory (`~/.aws/sso/cache`)
    pub sso_cache: PathBuf,
}

impl AwsPaths {
    /// Resolve paths from the environment, honoring `AWS_CONFIG_FILE` and
    /// `AWS_SHARED_CREDENTIALS_FILE`
    pub fn from_env() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
        let mut paths = Self::under(home.join(".aws"));
        if let Some(config) = std::env::var_os("AWS_CONFIG_FILE") {
            paths.config = PathBuf::from(config);
        }
        if let Some(credentials) = std::env::var_os("AWS_SHARED_CREDENTIALS_FILE") {
            paths.credentials = PathBuf::from(credentials);
        }
        Ok(paths)
    }

    /// Paths rooted at a single directory laid out like `~/.aws`
    pub fn under(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            config: dir.join("config"),
            credentials: dir.join("credentials"),
            sso_cache: dir.join("sso").join("cache"),
        }
    }
}

/// A named credential context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name as it appears in the AWS configuration
    pub name: String,

    /// Region pinned for this session, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Profile {
    /// Create a profile with no pinned region
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: None,
        }
    }

    /// Pin a region for this profile
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_PROFILE
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered, de-duplicated set of profiles for a session
///
/// Order is significant: it is the tie-break order used when several
/// profiles qualify equally for a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSet {
    profiles: Vec<Profile>,
}

impl ProfileSet {
    /// Build a set from names, trimming, dropping empties and duplicates.
    ///
    /// An empty input yields the single default profile.
    pub fn from_names<I, S>(names: I, region: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut profiles: Vec<Profile> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || profiles.iter().any(|p| p.name == name) {
                continue;
            }
            profiles.push(Profile::new(name).with_region(region.clone()));
        }
        if profiles.is_empty() {
            profiles.push(Profile::new(DEFAULT_PROFILE).with_region(region));
        }
        Self { profiles }
    }

    /// Discover every profile defined in the AWS config and credentials files
    pub fn discover(paths: &AwsPaths, region: Option<String>) -> Self {
        Self::from_names(discover_profile_names(paths), region)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Profile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// First profile in configured order
    pub fn first(&self) -> &Profile {
        // from_names guarantees at least one entry
        &self.profiles[0]
    }

    /// Get a profile by name
    pub fn get(&self, name: &str) -> Result<&Profile> {
        self.find(name)
            .ok_or_else(|| Error::ProfileNotFound(name.to_string()))
    }

    pub fn find(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Position in configured order
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.profiles.iter().position(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a ProfileSet {
    type Item = &'a Profile;
    type IntoIter = std::slice::Iter<'a, Profile>;

    fn into_iter(self) -> Self::IntoIter {
        self.profiles.iter()
    }
}

/// A parsed section of an AWS INI-style file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    pub values: BTreeMap<String, String>,
}

/// Parse the subset of INI used by the AWS shared config files.
///
/// Comments (`#`, `;`), blank lines and indented continuation lines are
/// ignored; keys are lower-cased.
pub fn parse_ini(text: &str) -> Vec<IniSection> {
    let mut sections: Vec<IniSection> = Vec::new();
    for raw in text.lines() {
        if raw.starts_with([' ', '\t']) {
            continue;
        }
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.push(IniSection {
                name: header.trim().to_string(),
                values: BTreeMap::new(),
            });
            continue;
        }
        if let (Some(section), Some((key, value))) = (sections.last_mut(), line.split_once('=')) {
            section
                .values
                .insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    sections
}

/// Read an INI file, treating a missing or unreadable file as empty
pub fn read_ini(path: &Path) -> Vec<IniSection> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_ini(&text),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "AWS file not readable");
            Vec::new()
        }
    }
}

/// Profile name for a section of the shared config file, if it names one
pub fn config_section_profile(section: &str) -> Option<&str> {
    if section == DEFAULT_PROFILE {
        return Some(DEFAULT_PROFILE);
    }
    section
        .strip_prefix("profile ")
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn discover_profile_names(paths: &AwsPaths) -> Vec<String> {
    let mut names = Vec::new();
    for section in read_ini(&paths.config) {
        if let Some(name) = config_section_profile(&section.name) {
            names.push(name.to_string());
        }
    }
    for section in read_ini(&paths.credentials) {
        names.push(section.name);
    }
    names
}
