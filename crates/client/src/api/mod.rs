// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level client and the thin per-backend facade.
//!
//! The facade methods are purely mechanical wrappers over the request
//! pipeline; all authorization handling lives in the pipeline and the
//! refresh coordinator.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::credential::coordinator::RefreshCoordinator;
use crate::credential::gateway::{HttpIdentityGateway, IdentityGateway};
use crate::credential::store::{CredentialStore, FileStore};
use crate::credential::{AuthenticateOutcome, SessionEvent};
use crate::error::ApiError;
use crate::transport::pipeline::RequestPipeline;
use crate::transport::{ApiRequest, HttpResponse, HttpTransport, ReqwestTransport};

/// Result of a document conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertOutcome {
    pub file_type: String,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub extracted_text: String,
}

/// One uploaded file in the history listing.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub name: String,
    #[serde(default)]
    pub last_modified: String,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    download_url: String,
}

/// Outcome of a login attempt.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    SignedIn { email: String },
    /// The identity service needs an interactive step before issuing tokens.
    ChallengeRequired { message: String },
}

/// Authenticated API client for the document backend.
///
/// Construct once per application session; cheap to share behind an `Arc`.
pub struct Client {
    gateway: Arc<dyn IdentityGateway>,
    coordinator: Arc<RefreshCoordinator>,
    pipeline: RequestPipeline,
}

impl Client {
    /// Build a client with the real HTTP transport, identity gateway, and
    /// file-backed credential store.
    pub fn new(config: &ClientConfig) -> Self {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
            config.api_base_url.clone(),
            config.request_timeout(),
        ));
        let gateway: Arc<dyn IdentityGateway> = Arc::new(HttpIdentityGateway::new(
            config.identity_base_url.clone(),
            config.request_timeout(),
        ));
        let store: Arc<dyn CredentialStore> =
            Arc::new(FileStore::new(&config.resolved_state_dir()));
        Self::from_parts(transport, gateway, store, config.refresh_timeout())
    }

    /// Build a client from injected seams. Used by tests and by embedders
    /// that bring their own storage or transport.
    pub fn from_parts(
        transport: Arc<dyn HttpTransport>,
        gateway: Arc<dyn IdentityGateway>,
        store: Arc<dyn CredentialStore>,
        refresh_timeout: Duration,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&gateway),
            store,
            refresh_timeout,
        ));
        let pipeline = RequestPipeline::new(transport, Arc::clone(&coordinator));
        Self { gateway, coordinator, pipeline }
    }

    /// Sign in and persist the issued credential.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        match self.gateway.authenticate(username, password).await? {
            AuthenticateOutcome::Authenticated(credential) => {
                let email = credential.identity_email.clone();
                self.coordinator.install(credential).await?;
                tracing::info!(email = %email, "signed in");
                Ok(LoginOutcome::SignedIn { email })
            }
            AuthenticateOutcome::ChallengeRequired { message } => {
                Ok(LoginOutcome::ChallengeRequired { message })
            }
        }
    }

    /// Sign out: best-effort token revocation, then clear the stored session.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if let Some(token) = self.coordinator.access_token().await {
            if let Err(e) = self.gateway.sign_out(&token).await {
                tracing::warn!(err = %e, "sign-out revocation failed, clearing session anyway");
            }
        }
        self.coordinator.clear_session().await;
        Ok(())
    }

    /// Email of the signed-in identity, if any.
    pub async fn signed_in_email(&self) -> Option<String> {
        self.coordinator.identity_email().await
    }

    /// Send an arbitrary request through the authenticated pipeline.
    pub async fn authorized_send(&self, request: ApiRequest) -> Result<HttpResponse, ApiError> {
        self.pipeline.send(request).await
    }

    /// Fires once per irrecoverable refresh failure; the application should
    /// route the user back to sign-in.
    pub fn on_session_invalidated(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    /// Convert an uploaded document.
    pub async fn convert(&self, file_name: &str, content: &str) -> Result<ConvertOutcome, ApiError> {
        let request = ApiRequest::post(
            "/convert",
            serde_json::json!({ "file_name": file_name, "content": content }),
        );
        let response = self.pipeline.send(request).await?;
        decode(response)
    }

    /// Request an AI assessment of extracted document text.
    pub async fn assess(&self, input_text: &str) -> Result<serde_json::Value, ApiError> {
        let request = ApiRequest::post("/assess", serde_json::json!({ "input_text": input_text }));
        let response = self.pipeline.send(request).await?;
        Ok(response.body)
    }

    /// List previously uploaded files, newest batch first.
    pub async fn history(
        &self,
        batch: u32,
        start_after: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, ApiError> {
        let mut request = ApiRequest::get("/s3/history").with_query("batch", batch);
        if let Some(after) = start_after {
            request = request.with_query("start_after", after);
        }
        let response = self.pipeline.send(request).await?;
        decode(response)
    }

    /// Presigned download URL for one uploaded file.
    pub async fn download_url(&self, file_name: &str) -> Result<String, ApiError> {
        let request = ApiRequest::get(format!("/s3/download/{file_name}"));
        let response = self.pipeline.send(request).await?;
        let body: DownloadResponse = decode(response)?;
        Ok(body.download_url)
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    let HttpResponse { status, body } = response;
    serde_json::from_value(body).map_err(|e| ApiError::Http {
        status,
        message: format!("unexpected response shape: {e}"),
    })
}
