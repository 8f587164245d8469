// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end session refresh behavior through the public client API.
//!
//! Uses a scripted transport (accepts exactly one bearer token) and a
//! scripted identity gateway, so every 401/refresh/replay interleaving is
//! deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;

use notifai_client::credential::gateway::IdentityGateway;
use notifai_client::credential::store::{CredentialStore, MemoryStore};
use notifai_client::credential::{AuthenticateOutcome, Credential, TokenPair};
use notifai_client::transport::{ApiRequest, HttpResponse, HttpTransport};
use notifai_client::{ApiError, Client, LoginOutcome, SessionEvent};

/// One observed backend call.
#[derive(Debug, Clone)]
struct Call {
    path: String,
    bearer: Option<String>,
}

/// Backend stand-in that authorizes exactly one bearer token.
///
/// Any other token gets a 401, which is how expiry looks from the client.
/// With `reject_all` set, even the accepted token gets a 401 (a backend that
/// keeps rejecting refreshed credentials).
struct TokenGateTransport {
    accepted_token: String,
    reject_all: bool,
    calls: Mutex<Vec<Call>>,
}

impl TokenGateTransport {
    fn accepting(token: &str) -> Arc<Self> {
        Arc::new(Self {
            accepted_token: token.to_owned(),
            reject_all: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn rejecting_everything() -> Arc<Self> {
        Arc::new(Self {
            accepted_token: String::new(),
            reject_all: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn body_for(path: &str) -> serde_json::Value {
        if path == "/convert" {
            serde_json::json!({
                "file_type": "pdf",
                "pages": 3,
                "extracted_text": "Dear patient,"
            })
        } else if path == "/s3/history" {
            serde_json::json!([
                { "name": "letter-1.pdf", "last_modified": "2026-08-01T10:00:00Z" },
                { "name": "letter-2.docx", "last_modified": "2026-08-02T11:30:00Z" }
            ])
        } else if path.starts_with("/s3/download/") {
            serde_json::json!({ "download_url": format!("https://files.example{path}") })
        } else {
            serde_json::json!({ "ok": true })
        }
    }
}

#[async_trait]
impl HttpTransport for TokenGateTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call { path: request.path.clone(), bearer: bearer.map(str::to_owned) });
        }
        let authorized = !self.reject_all && bearer == Some(self.accepted_token.as_str());
        if !authorized {
            return Ok(HttpResponse {
                status: 401,
                body: serde_json::json!({ "detail": "token expired" }),
            });
        }
        Ok(HttpResponse { status: 200, body: Self::body_for(&request.path) })
    }
}

/// Identity gateway scripted to issue `T1` on login and `T2` on refresh.
struct ScriptedGateway {
    refresh_calls: AtomicUsize,
    refresh_ok: bool,
}

impl ScriptedGateway {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self { refresh_calls: AtomicUsize::new(0), refresh_ok: true })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self { refresh_calls: AtomicUsize::new(0), refresh_ok: false })
    }

    fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityGateway for ScriptedGateway {
    async fn authenticate(
        &self,
        username: &str,
        _password: &str,
    ) -> Result<AuthenticateOutcome, ApiError> {
        Ok(AuthenticateOutcome::Authenticated(Credential {
            identity_email: username.to_owned(),
            access_token: "T1".into(),
            id_token: "id-T1".into(),
            refresh_token: "R1".into(),
        }))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        // Widen the window so concurrent 401s pile up behind one episode.
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.refresh_ok {
            Ok(TokenPair { access_token: "T2".into(), id_token: "id-T2".into() })
        } else {
            Err(ApiError::Network("identity gateway unreachable".into()))
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

fn store_with_stale_session() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let seeded = store.save(&Credential {
        identity_email: "user@example.com".into(),
        access_token: "T1".into(),
        id_token: "id-T1".into(),
        refresh_token: "R1".into(),
    });
    assert!(seeded.is_ok());
    store
}

fn client(
    transport: Arc<TokenGateTransport>,
    gateway: Arc<ScriptedGateway>,
    store: Arc<MemoryStore>,
) -> Arc<Client> {
    Arc::new(Client::from_parts(transport, gateway, store, Duration::from_secs(5)))
}

/// Three requests fail 401 in the same window and refresh succeeds with T2:
/// one refresh call, all three reissued with `Bearer T2`.
#[tokio::test]
async fn concurrent_expiries_share_one_refresh_and_replay_with_new_token() -> anyhow::Result<()> {
    let transport = TokenGateTransport::accepting("T2");
    let gateway = ScriptedGateway::succeeding();
    let client = client(Arc::clone(&transport), Arc::clone(&gateway), store_with_stale_session());

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let c = Arc::clone(&client);
            tokio::spawn(async move { c.history(10, None).await })
        })
        .collect();
    for outcome in join_all(tasks).await {
        let entries = outcome??;
        assert_eq!(entries.len(), 2);
    }

    assert_eq!(gateway.refresh_count(), 1, "expected a single refresh for the episode");

    let calls = transport.calls();
    let initial: Vec<_> =
        calls.iter().filter(|c| c.bearer.as_deref() == Some("T1")).collect();
    let replays: Vec<_> =
        calls.iter().filter(|c| c.bearer.as_deref() == Some("T2")).collect();
    assert_eq!(initial.len(), 3);
    assert_eq!(replays.len(), 3, "every queued request replays with the new token");
    assert_eq!(calls.len(), 6);
    Ok(())
}

/// When refresh itself fails, every queued request rejects with
/// `RefreshFailed`, the store is emptied, and the invalidation signal fires
/// exactly once.
#[tokio::test]
async fn refresh_failure_tears_down_the_whole_session() -> anyhow::Result<()> {
    let transport = TokenGateTransport::accepting("T2");
    let gateway = ScriptedGateway::failing();
    let store = store_with_stale_session();
    let client = client(transport, Arc::clone(&gateway), Arc::clone(&store));
    let mut invalidations = client.on_session_invalidated();

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let c = Arc::clone(&client);
            tokio::spawn(async move { c.history(10, None).await })
        })
        .collect();
    for outcome in join_all(tasks).await {
        assert!(matches!(outcome?, Err(ApiError::RefreshFailed(_))));
    }

    assert_eq!(gateway.refresh_count(), 1);
    assert!(store.load()?.is_none(), "credential store must be fully cleared");

    let SessionEvent::Invalidated { reason } = invalidations.try_recv()?;
    assert!(!reason.is_empty());
    assert!(invalidations.try_recv().is_err(), "signal must fire exactly once");
    Ok(())
}

/// 401, successful refresh, then the replay 401s again: the caller gets an
/// authorization error, never a silent retry loop.
#[tokio::test]
async fn second_rejection_after_refresh_surfaces_to_caller() -> anyhow::Result<()> {
    let transport = TokenGateTransport::rejecting_everything();
    let gateway = ScriptedGateway::succeeding();
    let client = client(Arc::clone(&transport), Arc::clone(&gateway), store_with_stale_session());

    let outcome = client.history(10, None).await;
    assert!(matches!(outcome, Err(ApiError::AuthExpired)));

    // Initial attempt plus exactly one replay; never a third.
    assert_eq!(transport.calls().len(), 2);
    assert_eq!(gateway.refresh_count(), 1);
    Ok(())
}

#[tokio::test]
async fn login_installs_credential_used_by_later_requests() -> anyhow::Result<()> {
    let transport = TokenGateTransport::accepting("T1");
    let gateway = ScriptedGateway::succeeding();
    let store = Arc::new(MemoryStore::new());
    let client = client(Arc::clone(&transport), gateway, Arc::clone(&store));

    let outcome = client.login("user@example.com", "hunter2").await?;
    assert!(matches!(outcome, LoginOutcome::SignedIn { ref email } if email == "user@example.com"));
    assert!(store.load()?.is_some());

    let entries = client.history(10, None).await?;
    assert_eq!(entries[0].name, "letter-1.pdf");

    let calls = transport.calls();
    assert_eq!(calls.last().and_then(|c| c.bearer.clone()).as_deref(), Some("T1"));
    Ok(())
}

#[tokio::test]
async fn logout_clears_the_stored_session() -> anyhow::Result<()> {
    let transport = TokenGateTransport::accepting("T1");
    let gateway = ScriptedGateway::succeeding();
    let store = store_with_stale_session();
    let client = client(transport, gateway, Arc::clone(&store));

    assert!(client.signed_in_email().await.is_some());
    client.logout().await?;
    assert!(store.load()?.is_none());
    assert!(client.signed_in_email().await.is_none());
    Ok(())
}

#[tokio::test]
async fn facade_decodes_backend_shapes() -> anyhow::Result<()> {
    let transport = TokenGateTransport::accepting("T1");
    let gateway = ScriptedGateway::succeeding();
    let client = client(Arc::clone(&transport), gateway, store_with_stale_session());

    let converted = client.convert("letter.pdf", "raw bytes as text").await?;
    assert_eq!(converted.file_type, "pdf");
    assert_eq!(converted.pages, Some(3));
    assert_eq!(converted.extracted_text, "Dear patient,");

    let url = client.download_url("letter-1.pdf").await?;
    assert_eq!(url, "https://files.example/s3/download/letter-1.pdf");

    let feedback = client.assess("Dear patient,").await?;
    assert_eq!(feedback["ok"], true);

    // History batching parameters ride along as query params.
    let entries = client.history(10, Some("letter-1.pdf")).await?;
    assert_eq!(entries.len(), 2);
    Ok(())
}
