//! Session-expiry recovery
//!
//! Operations run through [`ReauthCoordinator::with_reauth`]. When one fails
//! with an expired session, the coordinator runs the external login flow for
//! that profile and retries the operation exactly once. Concurrent callers for
//! the same profile share a single in-flight login through a per-profile
//! ticket.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::traits::AuthApi;

/// Final state of one reauthentication flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReauthOutcome {
    Succeeded,
    Failed(String),
}

impl ReauthOutcome {
    fn into_result(self, profile: &str) -> Result<()> {
        match self {
            ReauthOutcome::Succeeded => Ok(()),
            ReauthOutcome::Failed(detail) => Err(Error::ReauthFailed {
                profile: profile.to_string(),
                detail,
            }),
        }
    }
}

/// Completion signal shared by every caller waiting on one profile's login
struct ReauthTicket {
    done: watch::Receiver<Option<ReauthOutcome>>,
}

impl ReauthTicket {
    async fn wait(mut self) -> ReauthOutcome {
        let outcome = match self.done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| ReauthOutcome::Failed("reauthentication flow was aborted".into()))
    }
}

#[derive(Default)]
struct Tickets {
    /// Outstanding ticket per profile
    pending: HashMap<String, watch::Receiver<Option<ReauthOutcome>>>,
    /// Successful reauthentications per profile
    epochs: HashMap<String, u64>,
}

type ResetHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Single-flight gate around the external login flow
#[derive(Clone)]
pub struct ReauthCoordinator {
    auth: Arc<dyn AuthApi>,
    tickets: Arc<Mutex<Tickets>>,
    on_success: Option<ResetHook>,
}

impl ReauthCoordinator {
    pub fn new(auth: Arc<dyn AuthApi>) -> Self {
        Self {
            auth,
            tickets: Arc::new(Mutex::new(Tickets::default())),
            on_success: None,
        }
    }

    /// Run `hook(profile)` after each successful login, before any retry
    pub fn with_success_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn auth(&self) -> &Arc<dyn AuthApi> {
        &self.auth
    }

    /// Run `operation`, recovering once from an expired session.
    ///
    /// Errors other than session expiry are returned immediately. After a
    /// successful login the operation is retried exactly once and its result
    /// returned as-is; a failed login returns `Error::ReauthFailed`.
    pub async fn with_reauth<T, F, Fut>(&self, profile: &Profile, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started_epoch = self.epoch(&profile.name);
        match operation().await {
            Err(e) if e.is_session_expired() => {
                tracing::info!(profile = %profile, error = %e, "Session expired");
                // Another caller may already have renewed the session while
                // this operation was in flight.
                if self.epoch(&profile.name) == started_epoch {
                    self.reauthenticate(profile).await?;
                }
                operation().await
            }
            other => other,
        }
    }

    /// Run the login flow for a profile, joining one already in flight
    pub async fn reauthenticate(&self, profile: &Profile) -> Result<()> {
        self.ticket(profile)
            .wait()
            .await
            .into_result(&profile.name)
    }

    /// Number of successful logins for a profile so far
    pub fn epoch(&self, profile: &str) -> u64 {
        self.lock().epochs.get(profile).copied().unwrap_or(0)
    }

    fn ticket(&self, profile: &Profile) -> ReauthTicket {
        let mut tickets = self.lock();
        if let Some(done) = tickets.pending.get(&profile.name) {
            return ReauthTicket { done: done.clone() };
        }

        let (tx, rx) = watch::channel(None);
        tickets.pending.insert(profile.name.clone(), rx.clone());
        drop(tickets);

        // The flow runs detached so that a cancelled caller cannot strand
        // the others waiting on the same ticket.
        let auth = Arc::clone(&self.auth);
        let shared = Arc::clone(&self.tickets);
        let hook = self.on_success.clone();
        let profile = profile.clone();
        tokio::spawn(async move {
            tracing::info!(profile = %profile, "Starting reauthentication");
            let outcome = match auth.reauthenticate(&profile).await {
                Ok(()) => {
                    if let Some(hook) = &hook {
                        hook(profile.name.as_str());
                    }
                    ReauthOutcome::Succeeded
                }
                Err(e) => ReauthOutcome::Failed(e.to_string()),
            };

            {
                let mut tickets = shared.lock().unwrap_or_else(|p| p.into_inner());
                tickets.pending.remove(&profile.name);
                if outcome == ReauthOutcome::Succeeded {
                    *tickets.epochs.entry(profile.name.clone()).or_default() += 1;
                }
            }

            match &outcome {
                ReauthOutcome::Succeeded => tracing::info!(profile = %profile, "Reauthenticated"),
                ReauthOutcome::Failed(detail) => {
                    tracing::warn!(profile = %profile, detail, "Reauthentication failed")
                }
            }
            let _ = tx.send(Some(outcome));
        });

        ReauthTicket { done: rx }
    }

    fn lock(&self) -> MutexGuard<'_, Tickets> {
        self.tickets.lock().unwrap_or_else(|p| p.into_inner())
    }
}
