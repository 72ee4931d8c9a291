//! buckets command - List buckets with their resolved profile and access
//!
//! Serves the bucket cache without touching the network while it is fresh.
//! A missing, aged or credential-mismatched cache is rebuilt first. If that
//! rebuild fails, an aged cache is still served with a warning.

use std::collections::BTreeSet;

use awss_core::{AccessLevel, Bucket, Freshness, ProbeProgress, RefreshReport, Result};
use clap::Args;
use jiff::Timestamp;
use serde::Serialize;

use super::{Session, SessionArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// List buckets
#[derive(Args, Debug)]
pub struct BucketsArgs {
    /// Re-probe buckets if the cache is stale
    #[arg(long)]
    pub refresh: bool,

    /// Re-probe every bucket even if the cache is fresh
    #[arg(long)]
    pub force: bool,

    /// Ignore the configured filters
    #[arg(long)]
    pub all: bool,
}

/// One bucket row (JSON format)
#[derive(Debug, Serialize)]
struct BucketRow {
    name: String,
    access_level: AccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_empty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_verified_at: Option<Timestamp>,
    favorite: bool,
}

/// Output structure for the buckets command (JSON format)
#[derive(Debug, Serialize)]
struct BucketsOutput {
    freshness: Freshness,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_at: Option<Timestamp>,
    buckets: Vec<BucketRow>,
    hidden: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh: Option<RefreshReport>,
}

/// Execute the buckets command
pub async fn execute(args: BucketsArgs, session_args: &SessionArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let session = match Session::open(session_args) {
        Ok(session) => session,
        Err(e) => return formatter.fail(&e),
    };
    let engine = &session.engine;

    let freshness = engine.freshness();
    let mut report = None;
    if wants_refresh(&args, freshness) {
        match refresh(&session, args.force, &formatter).await {
            Ok(done) => report = Some(done),
            Err(e) if serves_after_failed_refresh(freshness) => {
                tracing::warn!(error = %e, "Refresh failed, serving aged cache");
                formatter.warning(&format!(
                    "Could not refresh the bucket cache ({e}); showing entries older than the age limit"
                ));
            }
            Err(e) => return formatter.fail(&e),
        }
    }

    let all = engine.get_bucket_list();
    let total = all.len();
    let favorites = &session.config.favorites;
    let shown = if args.all {
        all
    } else {
        session.config.filters.apply(all, favorites)
    };
    let hidden = total - shown.len();

    if formatter.is_json() {
        formatter.json(&BucketsOutput {
            freshness: engine.freshness(),
            saved_at: engine.saved_at(),
            buckets: shown.iter().map(|b| row(b, favorites)).collect(),
            hidden,
            refresh: report.clone(),
        });
    } else {
        print_table(&formatter, &shown, favorites);
        if hidden > 0 {
            formatter.println(&format!("{hidden} bucket(s) hidden by filters; use --all to show them"));
        }
        if shown.is_empty() && total == 0 {
            formatter.println("No buckets found");
        }
    }

    match report {
        Some(report) if report.has_errors() => {
            print_report_errors(&formatter, &report);
            ExitCode::GeneralError
        }
        _ => ExitCode::Success,
    }
}

/// Log in where needed, then re-probe with a progress bar
pub(super) async fn refresh(session: &Session, force: bool, formatter: &Formatter) -> Result<RefreshReport> {
    let engine = &session.engine;

    for (profile, outcome) in engine.preflight().await {
        match outcome {
            Ok(()) => formatter.success(&format!("Logged in with profile '{profile}'")),
            Err(e) => formatter.warning(&format!("Login for profile '{profile}' failed: {e}")),
        }
    }

    let bar = ProgressBar::new(formatter.config(), 0);
    bar.set_message("discovering buckets");
    let on_probe = |progress: &ProbeProgress| {
        bar.set_length(progress.total as u64);
        bar.set_position(progress.completed as u64);
        bar.set_message(&format!("{} ({})", progress.bucket, progress.profile));
    };
    let report = engine.refresh(force, Some(&on_probe)).await;
    bar.finish_and_clear();
    report
}

fn wants_refresh(args: &BucketsArgs, freshness: Freshness) -> bool {
    args.force || args.refresh || freshness.needs_refresh()
}

/// Only an aged cache may stand in for a refresh that failed
fn serves_after_failed_refresh(freshness: Freshness) -> bool {
    freshness == Freshness::Aged
}

fn row(bucket: &Bucket, favorites: &BTreeSet<String>) -> BucketRow {
    BucketRow {
        name: bucket.name.clone(),
        access_level: bucket.access_level,
        resolved_profile: bucket.resolved_profile.clone(),
        is_empty: bucket.is_empty,
        last_verified_at: bucket.last_verified_at,
        favorite: favorites.contains(&bucket.name),
    }
}

fn print_table(formatter: &Formatter, buckets: &[Bucket], favorites: &BTreeSet<String>) {
    if buckets.is_empty() {
        return;
    }
    let mut table = formatter.table(["", "BUCKET", "ACCESS", "PROFILE", "VERIFIED"]);
    for bucket in buckets {
        table.add_row([
            if favorites.contains(&bucket.name) { "★" } else { "" }.to_string(),
            bucket.name.clone(),
            formatter.access_label(bucket),
            bucket.resolved_profile.clone().unwrap_or_else(|| "-".into()),
            bucket
                .last_verified_at
                .map(|t| t.strftime("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".into()),
        ]);
    }
    formatter.print_table(&table);
}

fn print_report_errors(formatter: &Formatter, report: &RefreshReport) {
    for err in &report.discovery_errors {
        formatter.error(&format!("Listing buckets with '{}' failed: {}", err.profile, err.message));
    }
    let probe_failures = report.probe_errors.len();
    if probe_failures > 0 {
        formatter.error(&format!("{probe_failures} probe(s) failed; run with --debug for details"));
        for err in &report.probe_errors {
            tracing::debug!(profile = %err.profile, bucket = ?err.bucket, "{}", err.message);
        }
    }
    if !report.unverified.is_empty() {
        formatter.warning(&format!(
            "Kept cached results for {} bucket(s) that could not be re-checked",
            report.unverified.len()
        ));
    }
    if let Some(err) = &report.save_error {
        formatter.error(&format!("Could not save the bucket cache: {err}"));
    }
}
