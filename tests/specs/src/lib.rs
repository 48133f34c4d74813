// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end client flows.
//!
//! Runs a small in-process LyncUp server (REST + WebSocket, axum) that
//! issues real-shaped JWTs, honors only the tokens it issued, matches the
//! first queued user into room 1, and relays chat frames with a full-roster
//! snapshot on join.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use base64::Engine as _;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build an unsigned JWT with the given payload claims.
pub fn make_jwt(claims: serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(serde_json::json!({"alg": "HS256", "typ": "JWT"}).to_string());
    let payload = engine.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

pub struct ServerState {
    next_user: AtomicU64,
    next_jti: AtomicU64,
    /// Access tokens this server has issued and still honors.
    valid_access: Mutex<HashSet<String>>,
    pub refresh_calls: AtomicU64,
    chat: tokio::sync::broadcast::Sender<String>,
}

impl ServerState {
    fn issue_access(&self, user_id: u64) -> String {
        let token = make_jwt(serde_json::json!({
            "user_id": user_id,
            "exp": epoch_secs() + 300,
            "jti": self.next_jti.fetch_add(1, Ordering::Relaxed),
        }));
        if let Ok(mut valid) = self.valid_access.lock() {
            valid.insert(token.clone());
        }
        token
    }

    fn bearer_ok(&self, headers: &HeaderMap) -> bool {
        let Some(token) = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        else {
            return false;
        };
        self.valid_access.lock().map(|v| v.contains(token)).unwrap_or(false)
    }

    /// Stop honoring every access token issued so far, forcing clients
    /// through the refresh path.
    pub fn invalidate_access_tokens(&self) {
        if let Ok(mut valid) = self.valid_access.lock() {
            valid.clear();
        }
    }
}

fn token_rejection() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid",
        })),
    )
}

async fn login(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    if body.get("password").and_then(|v| v.as_str()) != Some("pw") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"detail": "No active account found with the given credentials"})),
        );
    }
    let user_id = state.next_user.fetch_add(1, Ordering::Relaxed);
    let access = state.issue_access(user_id);
    let refresh = make_jwt(serde_json::json!({"user_id": user_id, "exp": epoch_secs() + 86400}));
    (StatusCode::OK, Json(serde_json::json!({"access": access, "refresh": refresh})))
}

async fn refresh(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.refresh_calls.fetch_add(1, Ordering::Relaxed);
    let Some(refresh) = body.get("refresh").and_then(|v| v.as_str()) else {
        return token_rejection();
    };
    // A refresh token is honored while its exp claim is in the future.
    let claims = decode_payload(refresh);
    let (Some(exp), Some(user_id)) = (
        claims.get("exp").and_then(|v| v.as_u64()),
        claims.get("user_id").and_then(|v| v.as_u64()),
    ) else {
        return token_rejection();
    };
    if exp <= epoch_secs() {
        return token_rejection();
    }
    let access = state.issue_access(user_id);
    (StatusCode::OK, Json(serde_json::json!({"access": access})))
}

fn decode_payload(token: &str) -> serde_json::Value {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    token
        .split('.')
        .nth(1)
        .and_then(|seg| engine.decode(seg.trim_end_matches('=')).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or(serde_json::Value::Null)
}

async fn probe(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    if !state.bearer_ok(&headers) {
        return token_rejection();
    }
    (StatusCode::OK, Json(serde_json::json!({"profile_complete": true})))
}

async fn like(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    if !state.bearer_ok(&headers) {
        return token_rejection();
    }
    if body.get("user_to").and_then(|v| v.as_u64()).is_none() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"detail": "user_to required"})));
    }
    (StatusCode::OK, Json(serde_json::json!({})))
}

/// Queue socket: the credential rides in the query string, and the first
/// queued user is matched into room 1 shortly after connecting.
async fn queue_ws(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<std::collections::HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let authorized = query
        .get("token")
        .map(|token| {
            state.valid_access.lock().map(|v| v.contains(token)).unwrap_or(false)
        })
        .unwrap_or(false);
    ws.on_upgrade(move |mut socket| async move {
        if !authorized {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = socket.send(Message::Text(serde_json::json!({"room_id": 1}).to_string().into())).await;
        while socket.recv().await.is_some() {}
    })
}

async fn chat_ws(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_chat(socket, state))
}

async fn serve_chat(mut socket: WebSocket, state: Arc<ServerState>) {
    let roster = serde_json::json!({"members": [[1, "Remote", "Worker"], [2, "Distant", "Colleague"]]});
    if socket.send(Message::Text(roster.to_string().into())).await.is_err() {
        return;
    }
    let mut relay = state.chat.subscribe();
    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let frame: serde_json::Value =
                            serde_json::from_str(text.as_str()).unwrap_or(serde_json::Value::Null);
                        if let Some(body) = frame.get("text").and_then(|v| v.as_str()) {
                            let _ = state
                                .chat
                                .send(serde_json::json!({"text": body}).to_string());
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
            outbound = relay.recv() => {
                let Ok(frame) = outbound else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Start the mock LyncUp server, returning its address and shared state.
pub async fn start_server() -> anyhow::Result<(SocketAddr, Arc<ServerState>)> {
    let (chat, _) = tokio::sync::broadcast::channel(64);
    let state = Arc::new(ServerState {
        next_user: AtomicU64::new(1),
        next_jti: AtomicU64::new(0),
        valid_access: Mutex::new(HashSet::new()),
        refresh_calls: AtomicU64::new(0),
        chat,
    });

    let app = Router::new()
        .route("/api/token/", post(login))
        .route("/api/token/refresh/", post(refresh))
        .route("/api/users/checkprofilecomplete/", get(probe))
        .route("/api/users/like/", post(like))
        .route("/api/users/unlike/", post(like))
        .route("/ws/queue/", any(queue_ws))
        .route("/ws/chat/{room_id}/", any(chat_ws))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, state))
}

/// Client config pointed at a running mock server, with isolated state.
pub fn client_config(addr: SocketAddr, dir: &tempfile::TempDir) -> lyncup_client::config::ClientConfig {
    lyncup_client::config::ClientConfig {
        api_url: format!("http://{addr}/api/"),
        ws_url: format!("ws://{addr}/ws"),
        state_dir: Some(dir.path().to_path_buf()),
    }
}
