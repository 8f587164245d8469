// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request pipeline: attach the current access token, detect authorization
//! expiry, and replay through the refresh coordinator.

use std::sync::Arc;

use crate::credential::coordinator::RefreshCoordinator;
use crate::error::ApiError;
use crate::transport::{ApiRequest, HttpResponse, HttpTransport};

const UNAUTHORIZED: u16 = 401;

/// Wraps every outbound call with credential attachment and the
/// refresh-and-replay path.
pub struct RequestPipeline {
    transport: Arc<dyn HttpTransport>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestPipeline {
    pub fn new(transport: Arc<dyn HttpTransport>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { transport, coordinator }
    }

    /// Send a request with the current credential attached.
    ///
    /// A 401 on a request that has not been retried yet enters the refresh
    /// path: the coordinator yields a fresh access token (waiting on an
    /// in-flight refresh if one is already running) and the request is
    /// replayed once with that token. A 401 on the replay is terminal for
    /// this request. Every other outcome passes through unchanged.
    pub async fn send(&self, mut request: ApiRequest) -> Result<HttpResponse, ApiError> {
        let bearer = self.coordinator.access_token().await;
        let response = self.transport.execute(&request, bearer.as_deref()).await?;

        if response.status == UNAUTHORIZED && !request.retried {
            tracing::debug!(
                request_id = %request.request_id,
                path = %request.path,
                "authorization expired, requesting refresh"
            );
            // One-shot marker: at most one refresh-triggered retry per call.
            request.retried = true;
            let token = self.coordinator.fresh_access_token().await?;

            let replay = self.transport.execute(&request, Some(&token)).await?;
            if replay.status == UNAUTHORIZED {
                // Refreshed credential still rejected; surface as a normal
                // authorization error rather than looping.
                tracing::warn!(
                    request_id = %request.request_id,
                    path = %request.path,
                    "replay rejected after successful refresh"
                );
                return Err(ApiError::AuthExpired);
            }
            return into_result(replay);
        }

        if response.status == UNAUTHORIZED {
            return Err(ApiError::AuthExpired);
        }
        into_result(response)
    }
}

/// Map a non-auth response to the caller-facing result.
fn into_result(response: HttpResponse) -> Result<HttpResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }
    let message = response
        .body
        .get("detail")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| response.body.to_string());
    Err(ApiError::Http { status: response.status, message })
}
