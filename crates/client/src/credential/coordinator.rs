// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight session refresh.
//!
//! Arbitrarily many requests can fail with an authorization error in the same
//! window; the coordinator guarantees exactly one refresh call to the identity
//! gateway per expiry episode. The first failing request becomes the episode
//! owner and performs the call; every later one subscribes to the episode's
//! outcome channel and suspends until the owner settles. On success all
//! waiters resume with the new access token; on failure the whole session is
//! torn down as a unit: store cleared, waiters failed, invalidation event
//! fired exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};

use crate::credential::gateway::IdentityGateway;
use crate::credential::store::CredentialStore;
use crate::credential::{Credential, SessionEvent};
use crate::error::ApiError;

/// Outcome of one refresh episode, broadcast to every queued waiter.
type RefreshOutcome = Result<String, ApiError>;

/// Refresh state. Transitions only `Idle -> Refreshing -> Idle`; while
/// `Refreshing` no second gateway call is issued.
enum RefreshState {
    Idle,
    Refreshing { outcome_tx: broadcast::Sender<RefreshOutcome> },
}

/// Coordinates credential refresh across concurrently failing requests.
///
/// One instance per application session. The coordinator is the exclusive
/// writer of the cached credential and the refresh state; the request
/// pipeline only reads tokens through it.
pub struct RefreshCoordinator {
    gateway: Arc<dyn IdentityGateway>,
    store: Arc<dyn CredentialStore>,
    credential: RwLock<Option<Credential>>,
    /// Guarded by a sync mutex, held only for state inspection/swap and
    /// never across an await, so the episode guard can settle from `Drop`.
    state: Mutex<RefreshState>,
    /// Set on irrecoverable refresh failure; no further automatic refresh is
    /// attempted until a new credential is installed via login.
    invalidated: AtomicBool,
    session_tx: broadcast::Sender<SessionEvent>,
    refresh_timeout: Duration,
}

/// Settles the episode even if the owner's future is dropped mid-refresh
/// (callers racing `send()` against `select!`/`timeout` cancel the owner,
/// not just the waiters). Dropping an armed guard restores `Idle` and fails
/// the queued waiters instead of leaving them suspended on a state that
/// nothing will ever leave.
struct EpisodeGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator
                .settle(&Err(ApiError::RefreshFailed("refresh abandoned".into())));
        }
    }
}

impl RefreshCoordinator {
    /// Create a coordinator, seeding the cached credential from the store.
    pub fn new(
        gateway: Arc<dyn IdentityGateway>,
        store: Arc<dyn CredentialStore>,
        refresh_timeout: Duration,
    ) -> Self {
        let initial = match store.load() {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(err = %e, "failed to load persisted credential, starting signed out");
                None
            }
        };
        let (session_tx, _) = broadcast::channel(8);
        Self {
            gateway,
            store,
            credential: RwLock::new(initial),
            state: Mutex::new(RefreshState::Idle),
            invalidated: AtomicBool::new(false),
            session_tx,
            refresh_timeout,
        }
    }

    /// Current access token, if signed in.
    pub async fn access_token(&self) -> Option<String> {
        self.credential.read().await.as_ref().map(|c| c.access_token.clone())
    }

    /// Email of the signed-in identity, if any.
    pub async fn identity_email(&self) -> Option<String> {
        self.credential.read().await.as_ref().map(|c| c.identity_email.clone())
    }

    /// Install a freshly issued credential (login), persist it, and re-arm
    /// the coordinator after a previous invalidation.
    pub async fn install(&self, credential: Credential) -> Result<(), ApiError> {
        if let Err(e) = self.store.save(&credential) {
            return Err(ApiError::Network(format!("failed to persist credential: {e}")));
        }
        *self.credential.write().await = Some(credential);
        self.invalidated.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Drop the session without firing an invalidation event (sign-out).
    pub async fn clear_session(&self) {
        *self.credential.write().await = None;
        if let Err(e) = self.store.clear() {
            tracing::warn!(err = %e, "failed to clear credential store");
        }
    }

    /// Subscribe to session-level events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }

    /// Obtain a fresh access token after an authorization failure.
    ///
    /// The caller that finds the state `Idle` owns the episode and performs
    /// the gateway call; callers arriving while a refresh is in flight
    /// perform no network call of their own and suspend until the episode
    /// settles. Never blocks a thread.
    pub async fn fresh_access_token(&self) -> Result<String, ApiError> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(ApiError::RefreshFailed("session invalidated".into()));
        }

        let waiter = {
            let mut state = lock_state(&self.state);
            match &*state {
                RefreshState::Refreshing { outcome_tx } => Some(outcome_tx.subscribe()),
                RefreshState::Idle => {
                    let (outcome_tx, _) = broadcast::channel(1);
                    *state = RefreshState::Refreshing { outcome_tx };
                    None
                }
            }
        };

        if let Some(mut rx) = waiter {
            tracing::debug!("refresh already in flight, queueing");
            return match rx.recv().await {
                Ok(outcome) => outcome,
                // The episode guard settles before the channel can close, so
                // this is unreachable in practice; fail closed regardless.
                Err(_) => Err(ApiError::RefreshFailed("refresh abandoned".into())),
            };
        }

        let mut guard = EpisodeGuard { coordinator: self, armed: true };
        let outcome = self.run_refresh().await;
        guard.armed = false;
        drop(guard);

        self.settle(&outcome);
        outcome
    }

    /// Settle the current episode: back to `Idle` first, then wake the queue
    /// so a late waiter can never subscribe to a channel that already fired.
    fn settle(&self, outcome: &RefreshOutcome) {
        let previous = {
            let mut state = lock_state(&self.state);
            std::mem::replace(&mut *state, RefreshState::Idle)
        };
        if let RefreshState::Refreshing { outcome_tx } = previous {
            let waiting = outcome_tx.receiver_count();
            if waiting > 0 {
                tracing::debug!(waiting, "waking requests queued behind refresh");
            }
            let _ = outcome_tx.send(outcome.clone());
        }
    }

    /// Perform the single gateway refresh call for this episode.
    async fn run_refresh(&self) -> RefreshOutcome {
        let refresh_token =
            self.credential.read().await.as_ref().map(|c| c.refresh_token.clone());
        // A missing refresh token is terminal, same as a failed refresh.
        let Some(refresh_token) = refresh_token else {
            return self.invalidate("no refresh token available").await;
        };

        let result =
            tokio::time::timeout(self.refresh_timeout, self.gateway.refresh(&refresh_token))
                .await;
        match result {
            Ok(Ok(pair)) => {
                let mut slot = self.credential.write().await;
                if let Some(credential) = slot.as_mut() {
                    credential.access_token = pair.access_token.clone();
                    credential.id_token = pair.id_token;
                    if let Err(e) = self.store.save(credential) {
                        tracing::warn!(err = %e, "failed to persist refreshed credential");
                    }
                }
                tracing::info!("session refreshed");
                Ok(pair.access_token)
            }
            Ok(Err(e)) => self.invalidate(&e.to_string()).await,
            Err(_) => self.invalidate("refresh call timed out").await,
        }
    }

    /// Terminal path: clear the session as a unit and fail the episode.
    async fn invalidate(&self, reason: &str) -> RefreshOutcome {
        *self.credential.write().await = None;
        if let Err(e) = self.store.clear() {
            tracing::warn!(err = %e, "failed to clear credential store");
        }
        // The latch guarantees the event fires once per invalidation, even if
        // stray requests keep failing afterwards.
        if !self.invalidated.swap(true, Ordering::SeqCst) {
            let _ = self.session_tx.send(SessionEvent::Invalidated { reason: reason.to_owned() });
        }
        tracing::warn!(reason, "session invalidated, sign-in required");
        Err(ApiError::RefreshFailed(reason.to_owned()))
    }
}

/// Recover the guard even if a holder panicked; the state itself stays
/// coherent because every transition is a whole-value swap.
fn lock_state<'a>(state: &'a Mutex<RefreshState>) -> MutexGuard<'a, RefreshState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
