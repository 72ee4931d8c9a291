//! SSO session preflight
//!
//! Works out which profiles need an interactive `aws sso login` by matching
//! each profile's SSO start URL against the token expirations in the local
//! SSO token cache.

use std::collections::{HashMap, HashSet};

use jiff::{SignedDuration, Timestamp};
use serde::Deserialize;

use crate::profile::{config_section_profile, read_ini, AwsPaths, Profile, ProfileSet};

/// Tokens expiring sooner than this are treated as expired
pub const EXPIRY_BUFFER: SignedDuration = SignedDuration::from_mins(5);

const SSO_SESSION_PREFIX: &str = "sso-session ";

#[derive(Debug, Deserialize)]
struct CachedToken {
    #[serde(rename = "startUrl", alias = "start_url")]
    start_url: Option<String>,
    #[serde(rename = "expiresAt", alias = "expires_at")]
    expires_at: Option<String>,
}

/// Reads SSO configuration and the token cache
#[derive(Debug, Clone)]
pub struct SsoPreflight {
    paths: AwsPaths,
}

impl SsoPreflight {
    pub fn new(paths: AwsPaths) -> Self {
        Self { paths }
    }

    /// SSO start URL per profile, resolved through `sso_session` when needed
    pub fn start_urls(&self) -> HashMap<String, String> {
        let sections = read_ini(&self.paths.config);

        let sessions: HashMap<&str, &str> = sections
            .iter()
            .filter_map(|s| {
                let name = s.name.strip_prefix(SSO_SESSION_PREFIX)?.trim();
                let url = s.values.get("sso_start_url")?;
                Some((name, url.as_str()))
            })
            .collect();

        sections
            .iter()
            .filter_map(|s| {
                let profile = config_section_profile(&s.name)?;
                let url = s.values.get("sso_start_url").map(String::as_str).or_else(|| {
                    s.values
                        .get("sso_session")
                        .and_then(|session| sessions.get(session.as_str()).copied())
                })?;
                Some((profile.to_string(), url.to_string()))
            })
            .collect()
    }

    /// Latest token expiration per start URL
    pub fn token_expirations(&self) -> HashMap<String, Timestamp> {
        let mut expirations: HashMap<String, Timestamp> = HashMap::new();
        let entries = match std::fs::read_dir(&self.paths.sso_cache) {
            Ok(entries) => entries,
            Err(_) => return expirations,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            let Ok(token) = serde_json::from_slice::<CachedToken>(&bytes) else {
                tracing::debug!(path = %path.display(), "Skipping unreadable SSO cache entry");
                continue;
            };
            let (Some(url), Some(raw)) = (token.start_url, token.expires_at) else {
                continue;
            };
            let Some(expires_at) = parse_expires_at(&raw) else {
                continue;
            };
            expirations
                .entry(url)
                .and_modify(|current| *current = (*current).max(expires_at))
                .or_insert(expires_at);
        }
        expirations
    }

    /// Whether a profile is SSO-backed and lacks a token valid past the buffer
    pub fn needs_login(&self, profile: &str, now: Timestamp) -> bool {
        match self.start_urls().get(profile) {
            Some(url) => !token_valid(self.token_expirations().get(url), now),
            None => false,
        }
    }

    /// Profiles to log in with, one per distinct start URL needing login
    pub fn login_targets(&self, profiles: &ProfileSet, now: Timestamp) -> Vec<Profile> {
        let start_urls = self.start_urls();
        if start_urls.is_empty() {
            return Vec::new();
        }
        let expirations = self.token_expirations();

        let mut seen = HashSet::new();
        profiles
            .iter()
            .filter(|profile| {
                let Some(url) = start_urls.get(&profile.name) else {
                    return false;
                };
                !token_valid(expirations.get(url), now) && seen.insert(url.clone())
            })
            .cloned()
            .collect()
    }
}

fn token_valid(expires_at: Option<&Timestamp>, now: Timestamp) -> bool {
    expires_at.is_some_and(|t| now.saturating_add(EXPIRY_BUFFER).is_ok_and(|limit| *t > limit))
}

/// Parse an SSO cache `expiresAt`, accepting `Z`, `UTC` or no suffix
pub fn parse_expires_at(value: &str) -> Option<Timestamp> {
    let text = value.trim();
    let text = match text.strip_suffix("UTC") {
        Some(stripped) => format!("{}Z", stripped.trim_end()),
        None => text.to_string(),
    };
    if let Ok(ts) = text.parse::<Timestamp>() {
        return Some(ts);
    }
    let civil: jiff::civil::DateTime = text.parse().ok()?;
    civil
        .to_zoned(jiff::tz::TimeZone::UTC)
        .ok()
        .map(|zoned| zoned.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[default]
region = us-east-1

[profile dev]
sso_session = corp
sso_account_id = 111

[profile prod]
sso_session = corp
sso_account_id = 222

[profile legacy]
sso_start_url = https://legacy.awsapps.com/start

[profile keys]
region = eu-west-1

[sso-session corp]
sso_start_url = https://corp.awsapps.com/start
"#;

    fn now() -> Timestamp {
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    fn fixture() -> (SsoPreflight, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = AwsPaths::under(temp_dir.path());
        std::fs::write(&paths.config, CONFIG).unwrap();
        std::fs::create_dir_all(&paths.sso_cache).unwrap();
        (SsoPreflight::new(paths), temp_dir)
    }

    fn write_token(preflight: &SsoPreflight, file: &str, url: &str, expires_at: &str) {
        let body = serde_json::json!({ "startUrl": url, "expiresAt": expires_at });
        std::fs::write(preflight.paths.sso_cache.join(file), body.to_string()).unwrap();
    }

    fn profiles() -> ProfileSet {
        ProfileSet::from_names(["default", "dev", "prod", "legacy", "keys"], None)
    }

    #[test]
    fn test_start_urls_resolve_sessions() {
        let (preflight, _temp_dir) = fixture();
        let urls = preflight.start_urls();
        assert_eq!(urls["dev"], "https://corp.awsapps.com/start");
        assert_eq!(urls["prod"], "https://corp.awsapps.com/start");
        assert_eq!(urls["legacy"], "https://legacy.awsapps.com/start");
        assert!(!urls.contains_key("keys"));
        assert!(!urls.contains_key("default"));
    }

    #[test]
    fn test_login_targets_one_per_start_url() {
        let (preflight, _temp_dir) = fixture();
        let targets: Vec<String> = preflight
            .login_targets(&profiles(), now())
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(targets, vec!["dev", "legacy"]);
    }

    #[test]
    fn test_valid_token_skips_login() {
        let (preflight, _temp_dir) = fixture();
        write_token(&preflight, "a.json", "https://corp.awsapps.com/start", "2024-06-01T20:00:00Z");
        // expiring inside the buffer counts as expired
        write_token(&preflight, "b.json", "https://legacy.awsapps.com/start", "2024-06-01T12:03:00UTC");

        let targets: Vec<String> = preflight
            .login_targets(&profiles(), now())
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(targets, vec!["legacy"]);
        assert!(!preflight.needs_login("dev", now()));
        assert!(preflight.needs_login("legacy", now()));
        assert!(!preflight.needs_login("keys", now()));
    }

    #[test]
    fn test_latest_token_per_url_wins() {
        let (preflight, _temp_dir) = fixture();
        write_token(&preflight, "old.json", "https://corp.awsapps.com/start", "2024-05-01T00:00:00Z");
        write_token(&preflight, "new.json", "https://corp.awsapps.com/start", "2024-07-01T00:00:00Z");
        std::fs::write(preflight.paths.sso_cache.join("junk.json"), "{not json").unwrap();

        let expirations = preflight.token_expirations();
        assert_eq!(
            expirations["https://corp.awsapps.com/start"],
            "2024-07-01T00:00:00Z".parse::<Timestamp>().unwrap()
        );
    }

    #[test]
    fn test_parse_expires_at_formats() {
        let expected: Timestamp = "2024-06-01T12:00:00Z".parse().unwrap();
        assert_eq!(parse_expires_at("2024-06-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_expires_at("2024-06-01T12:00:00UTC"), Some(expected));
        assert_eq!(parse_expires_at("2024-06-01T12:00:00+00:00"), Some(expected));
        assert_eq!(parse_expires_at("2024-06-01T12:00:00"), Some(expected));
        assert_eq!(parse_expires_at("soon"), None);
    }

    #[test]
    fn test_missing_files_mean_no_targets() {
        let temp_dir = TempDir::new().unwrap();
        let preflight = SsoPreflight::new(AwsPaths::under(temp_dir.path()));
        assert!(preflight.login_targets(&profiles(), now()).is_empty());
        assert!(preflight.token_expirations().is_empty());
    }
}
