//! get command - Download an object

use std::path::PathBuf;

use awss_core::parse_object_path;
use clap::Args;

use super::{Session, SessionArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// Download an object
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Object path (s3://bucket/key)
    pub path: String,

    /// Destination file or directory
    #[arg(default_value = ".")]
    pub dest: PathBuf,
}

/// Execute the get command
pub async fn execute(args: GetArgs, session_args: &SessionArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let path = match parse_object_path(&args.path) {
        Ok(path) if path.file_name().is_some() && !path.is_dir() => path,
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

    let spinner = ProgressBar::spinner(formatter.config(), &format!("Downloading {path}"));
    let result = session.engine.download(&path.bucket, &path.key, &args.dest).await;
    spinner.finish_and_clear();

    match result {
        Ok(download) => {
            if formatter.is_json() {
                formatter.json(&download);
            } else {
                formatter.success(&format!(
                    "{path} -> {} ({}, profile '{}')",
                    download.path.display(),
                    humansize::format_size(download.bytes, humansize::BINARY),
                    download.profile
                ));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}
