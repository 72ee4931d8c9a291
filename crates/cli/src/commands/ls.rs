//! ls command - List sub-prefixes and objects
//!
//! Lists one level under a prefix using the bucket's resolved profile.

use awss_core::{ObjectInfo, PrefixListing, parse_s3_path};
use clap::Args;
use serde::Serialize;

use super::{Session, SessionArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// List one prefix level
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Path (s3://bucket[/prefix/])
    pub path: String,

    /// Summarize output (show totals only)
    #[arg(long)]
    pub summarize: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    total_prefixes: usize,
    total_objects: usize,
    total_size_bytes: u64,
    total_size_human: String,
}

/// Output structure for ls command (JSON format)
#[derive(Debug, Serialize)]
struct LsOutput {
    #[serde(flatten)]
    listing: PrefixListing,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
}

/// Execute the ls command
pub async fn execute(args: LsArgs, session_args: &SessionArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let path = match parse_s3_path(&args.path) {
        Ok(path) => path,
        Err(e) => return formatter.fail(&e),
    };

    let session = match Session::open(session_args) {
        Ok(session) => session,
        Err(e) => return formatter.fail(&e),
    };

    let listing = match session.engine.list_prefix(&path.bucket, &path.key).await {
        Ok(listing) => listing,
        Err(e) => return formatter.fail(&e),
    };

    let summary = args.summarize.then(|| summarize(&listing));
    if formatter.is_json() {
        formatter.json(&LsOutput { listing, summary });
        return ExitCode::Success;
    }

    if !args.summarize {
        for prefix in &listing.prefixes {
            formatter.println(&format!("{:>19} {:>10} {}", "", "PRE", relative(prefix, &listing.prefix)));
        }
        for object in &listing.objects {
            formatter.println(&object_line(object, &listing.prefix));
        }
    }
    if let Some(summary) = summary {
        formatter.println(&format!(
            "Total: {} prefixes, {} objects, {}",
            summary.total_prefixes, summary.total_objects, summary.total_size_human
        ));
    }

    ExitCode::Success
}

fn summarize(listing: &PrefixListing) -> Summary {
    let total_size_bytes = listing.objects.iter().map(|o| o.size_bytes).sum();
    Summary {
        total_prefixes: listing.prefixes.len(),
        total_objects: listing.objects.len(),
        total_size_bytes,
        total_size_human: humansize::format_size(total_size_bytes, humansize::BINARY),
    }
}

fn object_line(object: &ObjectInfo, prefix: &str) -> String {
    let date = object
        .last_modified
        .map(|d| d.strftime("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    format!("{date:>19} {:>10} {}", object.size_human(), relative(&object.key, prefix))
}

/// Key shown relative to the listed prefix
fn relative<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix).filter(|rest| !rest.is_empty()).unwrap_or(key)
}
