//! cat command - Display the leading bytes of an object
//!
//! Writes raw bytes to stdout. Only the requested range is fetched.

use std::io::{self, Write};

use awss_core::parse_object_path;
use clap::Args;
use serde::Serialize;

use super::{Session, SessionArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Bytes shown when `--bytes` is not given
const DEFAULT_PREVIEW_BYTES: u64 = 64 * 1024;

/// Display object contents
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Object path (s3://bucket/key)
    pub path: String,

    /// Number of bytes to read
    #[arg(long, default_value_t = DEFAULT_PREVIEW_BYTES)]
    pub bytes: u64,

    /// Byte offset to start from
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

#[derive(Debug, Serialize)]
struct CatOutput {
    bucket: String,
    key: String,
    offset: u64,
    length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_size: Option<u64>,
    truncated: bool,
    /// Lossy UTF-8 rendering of the bytes
    text: String,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, session_args: &SessionArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let path = match parse_object_path(&args.path) {
        Ok(path) if !path.key.is_empty() && !path.is_dir() => path,
        Ok(_) => {
            formatter.error(&format!("'{}' is not an object path. Expected: s3://bucket/key", args.path));
            return ExitCode::UsageError;
        }
        Err(e) => return formatter.fail(&e),
    };

    let session = match Session::open(session_args) {
        Ok(session) => session,
        Err(e) => return formatter.fail(&e),
    };

    let preview = match session
        .engine
        .preview(&path.bucket, &path.key, args.offset, args.bytes)
        .await
    {
        Ok(preview) => preview,
        Err(e) => return formatter.fail(&e),
    };

    if formatter.is_json() {
        formatter.json(&CatOutput {
            bucket: path.bucket,
            key: path.key,
            offset: args.offset,
            length: preview.data.len(),
            total_size: preview.total_size,
            truncated: preview.truncated,
            text: String::from_utf8_lossy(&preview.data).into_owned(),
        });
        return ExitCode::Success;
    }

    // Write directly to stdout (not through formatter to preserve binary data)
    let mut stdout = io::stdout().lock();
    if let Err(e) = stdout.write_all(&preview.data).and_then(|()| stdout.flush()) {
        formatter.error(&format!("Failed to write to stdout: {e}"));
        return ExitCode::GeneralError;
    }

    if preview.truncated {
        let next = args.offset.saturating_add(preview.data.len() as u64);
        formatter.warning(&format!(
            "Showing {} of {} bytes; continue with --offset {next}",
            preview.data.len(),
            preview.total_size.unwrap_or_default()
        ));
    }
    ExitCode::Success
}
