//! CLI command definitions and execution
//!
//! Each command lives in its own module with an `Args` struct and an
//! `execute` function returning an [`ExitCode`].

use clap::{Parser, Subcommand};

use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

mod buckets;
mod cat;
mod completions;
mod favorite;
mod filter;
mod get;
mod login;
mod ls;
mod resolve;
mod scan;
mod session;

pub use session::{Session, SessionArgs};

/// awss - multi-profile S3 browser
///
/// Finds which of your AWS profiles can list and read each bucket, caches the
/// answer, and uses the right profile for every command.
#[derive(Parser, Debug)]
#[command(name = "awss")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Comma-separated profiles to use instead of discovering them
    #[arg(long, global = true, value_delimiter = ',', env = "AWSS_PROFILES")]
    pub profiles: Vec<String>,

    /// Use a profile (repeatable); the first one is preferred on ties
    #[arg(short = 'p', long = "profile", global = true)]
    pub profile: Vec<String>,

    /// Region applied to every profile
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List buckets with the best profile and access level for each
    Buckets(buckets::BucketsArgs),

    /// Show which profile is used for a bucket
    Resolve(resolve::ResolveArgs),

    /// List sub-prefixes and objects under a prefix
    Ls(ls::LsArgs),

    /// Print the leading bytes of an object
    Cat(cat::CatArgs),

    /// Download an object
    Get(get::GetArgs),

    /// Count objects and total size under a prefix
    Scan(scan::ScanArgs),

    /// Run the SSO login flow for profiles that need it
    Login(login::LoginArgs),

    /// Manage favorite buckets
    #[command(subcommand)]
    Favorite(favorite::FavoriteCommands),

    /// Show or change the bucket list filters
    Filter(filter::FilterArgs),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

impl Cli {
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            no_progress: self.no_progress,
            quiet: self.quiet,
        }
    }

    pub fn session_args(&self) -> SessionArgs {
        SessionArgs {
            profiles: self.profiles.clone(),
            profile: self.profile.clone(),
            region: self.region.clone(),
        }
    }
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = cli.output_config();
    let session_args = cli.session_args();

    match cli.command {
        Commands::Buckets(args) => buckets::execute(args, &session_args, output_config).await,
        Commands::Resolve(args) => resolve::execute(args, &session_args, output_config).await,
        Commands::Ls(args) => ls::execute(args, &session_args, output_config).await,
        Commands::Cat(args) => cat::execute(args, &session_args, output_config).await,
        Commands::Get(args) => get::execute(args, &session_args, output_config).await,
        Commands::Scan(args) => scan::execute(args, &session_args, output_config).await,
        Commands::Login(args) => login::execute(args, &session_args, output_config).await,
        Commands::Favorite(cmd) => favorite::execute(cmd, output_config),
        Commands::Filter(args) => filter::execute(args, output_config),
        Commands::Completions(args) => completions::execute(args),
    }
}
