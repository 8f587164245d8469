// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound HTTP: the replayable request descriptor, the transport seam,
//! and the credential-attaching pipeline.

pub mod pipeline;


use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use crate::error::ApiError;

/// A fully-formed, replayable request descriptor.
///
/// Captures everything needed to resend the call. `retried` is a one-shot
/// marker: once set, a further authorization failure is terminal for this
/// request rather than triggering another refresh, which prevents a retry
/// loop when the backend keeps rejecting refreshed credentials.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Correlation id for log lines across send/refresh/replay.
    pub request_id: String,
    pub retried: bool,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path, Some(body))
    }

    fn new(method: Method, path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
            request_id: uuid::Uuid::new_v4().to_string(),
            retried: false,
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }
}

/// Raw HTTP response: status plus parsed JSON body (Null when empty).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam: executes one request descriptor with an optional bearer
/// credential. Returns `Err` only for transport-level failures; HTTP error
/// statuses come back as responses.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ApiError>;
}

/// Real transport over reqwest.
pub struct ReqwestTransport {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let mut builder = self.client.request(request.method.clone(), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = ApiRequest::get("/s3/history");
        let b = ApiRequest::get("/s3/history");
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn new_requests_start_unretried() {
        let req = ApiRequest::post("/convert", serde_json::json!({ "content": "x" }));
        assert!(!req.retried);
        assert_eq!(req.method, Method::POST);
    }

    #[test]
    fn success_statuses() {
        assert!(HttpResponse { status: 200, body: serde_json::Value::Null }.is_success());
        assert!(HttpResponse { status: 204, body: serde_json::Value::Null }.is_success());
        assert!(!HttpResponse { status: 401, body: serde_json::Value::Null }.is_success());
        assert!(!HttpResponse { status: 500, body: serde_json::Value::Null }.is_success());
    }
}
