// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity service client: authenticate, refresh, sign out.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::credential::{AuthenticateOutcome, Credential, TokenPair};
use crate::error::ApiError;

/// The credential-issuing identity service.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticateOutcome, ApiError>;

    /// Exchange a refresh token for a new access/id token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;

    /// Revoke an access token. Best effort on sign-out.
    async fn sign_out(&self, access_token: &str) -> Result<(), ApiError>;
}

/// Wire shape of a successful `/authorize` response.
#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Present when the identity service requires an interactive step
    /// (e.g. NEW_PASSWORD_REQUIRED) instead of issuing tokens.
    #[serde(default)]
    challenge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    id_token: String,
}

/// HTTP implementation talking to the identity service endpoints.
pub struct HttpIdentityGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIdentityGateway {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl IdentityGateway for HttpIdentityGateway {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticateOutcome, ApiError> {
        let resp = self
            .client
            .post(self.url("/authorize"))
            .basic_auth(username, Some(password))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: "incorrect username or password".into(),
            });
        }

        let body: AuthorizeResponse = resp.json().await?;
        if let Some(challenge) = body.challenge {
            return Ok(AuthenticateOutcome::ChallengeRequired { message: challenge });
        }
        match (body.access_token, body.id_token, body.refresh_token) {
            (Some(access_token), Some(id_token), Some(refresh_token)) => {
                Ok(AuthenticateOutcome::Authenticated(Credential {
                    identity_email: body.email.unwrap_or_else(|| username.to_owned()),
                    access_token,
                    id_token,
                    refresh_token,
                }))
            }
            _ => Err(ApiError::Http {
                status: status.as_u16(),
                message: "identity service returned an incomplete credential".into(),
            }),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let resp = self
            .client
            .post(self.url("/refresh"))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http { status: status.as_u16(), message: text });
        }

        let body: RefreshResponse = resp.json().await?;
        Ok(TokenPair { access_token: body.access_token, id_token: body.id_token })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ApiError> {
        let resp =
            self.client.post(self.url("/signout")).bearer_auth(access_token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: "sign-out rejected".into(),
            });
        }
        Ok(())
    }
}
