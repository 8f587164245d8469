// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated API client for the NotifAI document backend.
//!
//! Every outbound call goes through a request pipeline that attaches the
//! current bearer credential and, on authorization expiry, hands the request
//! to a single-flight refresh coordinator: one identity-gateway refresh per
//! expiry episode no matter how many requests fail concurrently, transparent
//! replay on success, and a clean session teardown with an invalidation
//! signal when refresh itself fails.

pub mod api;
pub mod config;
pub mod credential;
pub mod error;
pub mod transport;

pub use api::{Client, ConvertOutcome, HistoryEntry, LoginOutcome};
pub use config::ClientConfig;
pub use credential::{Credential, SessionEvent};
pub use error::ApiError;
pub use transport::{ApiRequest, HttpResponse};
