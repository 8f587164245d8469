// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential model, persistence, identity gateway, and the refresh
//! coordinator.
//!
//! A [`Credential`] is all-or-nothing: it is persisted and loaded only as a
//! complete record, never field by field. The [`coordinator`] owns the only
//! mutable copy at runtime.

pub mod coordinator;
pub mod gateway;
pub mod store;


use serde::{Deserialize, Serialize};

/// A complete signed-in session credential.
///
/// The access and id tokens are short-lived opaque bearer strings; the
/// refresh token is longer-lived and used only by the refresh coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identity_email: String,
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
}

/// Access/id token pair returned by a refresh call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub id_token: String,
}

/// Outcome of an authenticate call against the identity service.
#[derive(Debug, Clone)]
pub enum AuthenticateOutcome {
    Authenticated(Credential),
    /// The identity service wants an interactive step (e.g. a forced
    /// password change) before it will issue tokens.
    ChallengeRequired { message: String },
}

/// Session-level events broadcast by the refresh coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session cannot be recovered; the user must sign in again.
    /// Fired exactly once per irrecoverable refresh failure.
    Invalidated { reason: String },
}
