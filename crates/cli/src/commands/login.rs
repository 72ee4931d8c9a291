//! login command - Run the SSO login flow

use clap::Args;
use serde::Serialize;

use super::{Session, SessionArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Log in with `aws sso login`
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Profiles to log in with; defaults to every SSO session that needs it
    pub profiles: Vec<String>,
}

#[derive(Debug, Serialize)]
struct LoginResult {
    profile: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the login command
pub async fn execute(args: LoginArgs, session_args: &SessionArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let session = match Session::open(session_args) {
        Ok(session) => session,
        Err(e) => return formatter.fail(&e),
    };
    let engine = &session.engine;

    let targets: Vec<String> = if args.profiles.is_empty() {
        engine.login_targets().await.into_iter().map(|p| p.name).collect()
    } else {
        args.profiles
    };
    if targets.is_empty() {
        if formatter.is_json() {
            formatter.json(&Vec::<LoginResult>::new());
        } else {
            formatter.success("All sessions are valid");
        }
        return ExitCode::Success;
    }

    let mut exit_code = ExitCode::Success;
    let mut results = Vec::with_capacity(targets.len());
    for (profile, outcome) in engine.force_reauth(&targets).await {
        match outcome {
            Ok(()) => {
                formatter.success(&format!("Logged in with profile '{profile}'"));
                results.push(LoginResult {
                    profile,
                    ok: true,
                    error: None,
                });
            }
            Err(e) => {
                if !formatter.is_json() {
                    exit_code = formatter.fail(&e);
                } else {
                    exit_code = ExitCode::from(&e);
                }
                results.push(LoginResult {
                    profile,
                    ok: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    if formatter.is_json() {
        formatter.json(&results);
    }
    exit_code
}
