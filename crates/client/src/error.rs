// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Error codes surfaced by the API client.
///
/// Cloneable because refresh outcomes are broadcast to every request that
/// queued behind the same refresh episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport-level failure. Never retried by the pipeline.
    Network(String),
    /// The presented credential was rejected and no further retry is allowed
    /// for this request.
    AuthExpired,
    /// Credential refresh failed; the session is gone and the caller must
    /// sign in again.
    RefreshFailed(String),
    /// Any other non-success HTTP response.
    Http { status: u16, message: String },
}

impl ApiError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK_ERROR",
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::RefreshFailed(_) => "REFRESH_FAILED",
            Self::Http { .. } => "HTTP_ERROR",
        }
    }

    /// True for errors that end the session rather than a single request.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::RefreshFailed(_))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::AuthExpired => f.write_str("authorization expired"),
            Self::RefreshFailed(msg) => {
                write!(f, "session refresh failed, please sign in again: {msg}")
            }
            Self::Http { status, message } => write!(f, "request failed ({status}): {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ApiError::Network("x".into()).as_str(), "NETWORK_ERROR");
        assert_eq!(ApiError::AuthExpired.as_str(), "AUTH_EXPIRED");
        assert_eq!(ApiError::RefreshFailed("x".into()).as_str(), "REFRESH_FAILED");
        assert_eq!(ApiError::Http { status: 500, message: "x".into() }.as_str(), "HTTP_ERROR");
    }

    #[test]
    fn only_refresh_failure_is_session_fatal() {
        assert!(ApiError::RefreshFailed("gone".into()).is_session_fatal());
        assert!(!ApiError::AuthExpired.is_session_fatal());
        assert!(!ApiError::Network("down".into()).is_session_fatal());
    }

    #[test]
    fn refresh_failure_message_tells_user_to_sign_in() {
        let msg = ApiError::RefreshFailed("token revoked".into()).to_string();
        assert!(msg.contains("sign in again"), "unexpected message: {msg}");
    }
}
