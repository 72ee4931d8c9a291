//! resolve command - Show the profile chosen for a bucket

use awss_core::{AccessLevel, Error, Freshness};
use clap::Args;
use serde::Serialize;

use super::{Session, SessionArgs, buckets};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Show which profile is used for a bucket
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Bucket name (s3:// prefix accepted)
    pub bucket: String,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    bucket: String,
    access_level: AccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_profile: Option<String>,
    /// Profile runtime commands will use
    profile: String,
}

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, session_args: &SessionArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let name = bucket_name(&args.bucket);
    if name.is_empty() {
        return formatter.fail(&Error::InvalidBucket(args.bucket));
    }

    let session = match Session::open(session_args) {
        Ok(session) => session,
        Err(e) => return formatter.fail(&e),
    };
    let engine = &session.engine;

    if engine.bucket(name).is_none() && engine.freshness() != Freshness::Fresh {
        if let Err(e) = buckets::refresh(&session, false, &formatter).await {
            return formatter.fail(&e);
        }
    }

    let Some(bucket) = engine.bucket(name) else {
        return formatter.fail(&Error::NotFound(format!(
            "bucket '{name}' is not visible to any configured profile"
        )));
    };
    let profile = engine.profile_for(name);

    if formatter.is_json() {
        formatter.json(&ResolveOutput {
            bucket: bucket.name.clone(),
            access_level: bucket.access_level,
            resolved_profile: bucket.resolved_profile.clone(),
            profile: profile.name,
        });
    } else {
        match &bucket.resolved_profile {
            Some(resolved) => formatter.println(&format!(
                "{}: {} ({})",
                bucket.name,
                resolved,
                formatter.access_label(&bucket)
            )),
            None => formatter.println(&format!(
                "{}: {} (no profile can list it; would try '{}')",
                bucket.name,
                formatter.access_label(&bucket),
                profile.name
            )),
        }
    }

    ExitCode::Success
}

fn bucket_name(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix("s3://")
        .unwrap_or(value)
        .split('/')
        .next()
        .unwrap_or_default()
}
