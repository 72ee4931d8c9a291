//! scan command - Recursive totals for a prefix
//!
//! Walks every key under the prefix page by page, showing running totals.
//! Ctrl+C stops the walk.

use awss_core::{Error, ScanSummary, parse_object_path};
use clap::Args;
use tokio_util::sync::CancellationToken;

use super::{Session, SessionArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// Count objects and bytes under a prefix
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Path (s3://bucket[/prefix])
    pub path: String,

    /// Stop counting after this many keys
    #[arg(long)]
    pub max_keys: Option<usize>,
}

/// Execute the scan command
pub async fn execute(args: ScanArgs, session_args: &SessionArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let path = match parse_object_path(&args.path) {
        Ok(path) => path,
        Err(e) => return formatter.fail(&e),
    };
    if args.max_keys == Some(0) {
        formatter.error("--max-keys must be at least 1");
        return ExitCode::UsageError;
    }

    let session = match Session::open(session_args) {
        Ok(session) => session,
        Err(e) => return formatter.fail(&e),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt, stopping scan");
            on_interrupt.cancel();
        }
    });

    let spinner = ProgressBar::spinner(formatter.config(), &format!("Scanning {path}"));
    let mut stream = session.engine.scan_stream(&path.bucket, &path.key, args.max_keys);
    let outcome = loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Err(Error::Cancelled),
            page = stream.next_page() => page,
        };
        match page {
            Ok(Some(running)) => spinner.set_message(&running_message(&running)),
            Ok(None) => break Ok(stream.summary()),
            Err(e) => break Err(e),
        }
    };
    spinner.finish_and_clear();

    let summary = match outcome {
        Ok(summary) => summary,
        Err(Error::Cancelled) => {
            let partial = stream.summary();
            formatter.warning(&format!(
                "Scan interrupted after {} objects ({})",
                partial.count,
                partial.total_size_human()
            ));
            return ExitCode::Interrupted;
        }
        Err(e) => return formatter.fail(&e),
    };

    if formatter.is_json() {
        formatter.json(&summary);
    } else {
        print_summary(&formatter, &summary);
    }
    ExitCode::Success
}

fn running_message(running: &ScanSummary) -> String {
    format!("{} objects, {}", running.count, running.total_size_human())
}

fn print_summary(formatter: &Formatter, summary: &ScanSummary) {
    let latest = summary
        .latest_modified
        .map(|t| t.strftime("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into());
    formatter.println(&format!("s3://{}/{}", summary.bucket, summary.prefix));
    formatter.println(&format!("  Objects:       {}", summary.count));
    formatter.println(&format!("  Total size:    {}", summary.total_size_human()));
    formatter.println(&format!("  Directories:   {}", summary.subdirs));
    formatter.println(&format!("  Last modified: {latest}"));
    if summary.truncated {
        formatter.warning(&format!(
            "Stopped after {} keys; totals are partial (raise --max-keys)",
            summary.scanned
        ));
    }
}
