//! Access classification
//!
//! Folds the probe results for one bucket into a single verdict and picks
//! the profile to use for it.

use jiff::Timestamp;

use crate::bucket::{AccessLevel, Bucket, ProbeResult};
use crate::profile::ProfileSet;

/// Aggregates probe outcomes into bucket verdicts
#[derive(Debug, Clone)]
pub struct Classifier {
    profiles: ProfileSet,
    pinned: Option<String>,
}

impl Classifier {
    /// `pinned` is the profile the user explicitly chose for this session
    pub fn new(profiles: ProfileSet, pinned: Option<String>) -> Self {
        Self { profiles, pinned }
    }

    /// Classify a bucket from the complete set of its probe results.
    ///
    /// The verdict depends only on the contents of `results`, never on their
    /// order: candidates are ranked by pinned profile first, then by
    /// configured profile order, then by name.
    pub fn classify(&self, bucket: &str, results: &[ProbeResult], now: Timestamp) -> Bucket {
        let mut listed: Vec<&ProbeResult> = results
            .iter()
            .filter(|r| r.bucket == bucket && r.list_ok)
            .collect();
        listed.sort_by(|a, b| {
            self.sort_key(&a.profile)
                .cmp(&self.sort_key(&b.profile))
                .then_with(|| a.profile.cmp(&b.profile))
        });

        let is_empty = listed
            .iter()
            .any(|r| r.listed_keys == Some(0))
            .then_some(true);

        let (access_level, chosen) = if let Some(best) = listed.iter().find(|r| r.read_ok) {
            (AccessLevel::Good, Some(best.profile.clone()))
        } else if let Some(best) = listed.first() {
            (AccessLevel::NoDownload, Some(best.profile.clone()))
        } else {
            (AccessLevel::NoView, None)
        };

        Bucket {
            name: bucket.to_string(),
            access_level,
            resolved_profile: chosen,
            is_empty,
            last_verified_at: Some(now),
        }
    }

    /// Whether no probe for the bucket produced a conclusive answer
    pub fn is_unverified(&self, bucket: &str, results: &[ProbeResult]) -> bool {
        let mut relevant = results.iter().filter(|r| r.bucket == bucket).peekable();
        relevant.peek().is_some() && relevant.all(ProbeResult::is_inconclusive)
    }

    fn sort_key(&self, profile: &str) -> (u8, usize) {
        let pinned = if self.pinned.as_deref() == Some(profile) {
            0
        } else {
            1
        };
        let rank = self.profiles.rank(profile).unwrap_or(usize::MAX);
        (pinned, rank)
    }
}
