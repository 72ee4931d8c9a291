//! Favorite bucket commands
//!
//! Favorites are stored in the awss configuration file and can be used to
//! narrow the bucket list with `awss filter --favorites-only`.

use awss_core::ConfigManager;
use clap::Subcommand;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Favorite subcommands
#[derive(Subcommand, Debug)]
pub enum FavoriteCommands {
    /// Mark a bucket as favorite
    Add(BucketArg),

    /// Unmark a favorite bucket
    Remove(BucketArg),

    /// Flip a bucket's favorite mark
    Toggle(BucketArg),

    /// List favorite buckets
    List,
}

/// A bucket name argument
#[derive(clap::Args, Debug)]
pub struct BucketArg {
    /// Bucket name
    pub bucket: String,
}

#[derive(Debug, Serialize)]
struct FavoriteOutput {
    bucket: String,
    favorite: bool,
}

/// Execute a favorite subcommand
pub fn execute(cmd: FavoriteCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let manager = match ConfigManager::new() {
        Ok(manager) => manager,
        Err(e) => return formatter.fail(&e),
    };
    run(cmd, &manager, &formatter)
}

fn run(cmd: FavoriteCommands, manager: &ConfigManager, formatter: &Formatter) -> ExitCode {
    let (bucket, result) = match cmd {
        FavoriteCommands::List => return list(manager, formatter),
        FavoriteCommands::Add(arg) => {
            let result = manager.set_favorite(&arg.bucket, true).map(|_| true);
            (arg.bucket, result)
        }
        FavoriteCommands::Remove(arg) => {
            let result = manager.set_favorite(&arg.bucket, false).map(|_| false);
            (arg.bucket, result)
        }
        FavoriteCommands::Toggle(arg) => {
            let result = manager.toggle_favorite(&arg.bucket);
            (arg.bucket, result)
        }
    };

    match result {
        Ok(favorite) => {
            let bucket = bucket.trim().to_string();
            if formatter.is_json() {
                formatter.json(&FavoriteOutput { bucket, favorite });
            } else if favorite {
                formatter.success(&format!("'{bucket}' is a favorite"));
            } else {
                formatter.success(&format!("'{bucket}' is no longer a favorite"));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}

fn list(manager: &ConfigManager, formatter: &Formatter) -> ExitCode {
    match manager.favorites() {
        Ok(favorites) => {
            if formatter.is_json() {
                formatter.json(&favorites);
            } else if favorites.is_empty() {
                formatter.println("No favorites");
            } else {
                for bucket in &favorites {
                    formatter.println(bucket);
                }
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}
