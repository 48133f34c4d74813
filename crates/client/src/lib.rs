// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LyncUp client core: credential lifecycle, auth session, REST plumbing and
//! the realtime connection state machine shared by the queue and chatroom
//! channels.

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod queue;
pub mod realtime;
pub mod room;
pub mod session;
pub mod shell;
pub mod token;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::http::HttpClient;
use crate::session::{AuthSession, AuthState};
use crate::shell::{Shell, ShellEvent};
use crate::token::refresher::TokenRefresher;
use crate::token::store::TokenStore;

/// A fully wired client runtime.
///
/// Construction order matters: the store feeds the refresher, the refresher
/// feeds the HTTP client, and the session sits on top of all three.
pub struct Client {
    pub config: ClientConfig,
    pub shell: Shell,
    pub store: Arc<TokenStore>,
    pub refresher: Arc<TokenRefresher>,
    pub http: Arc<HttpClient>,
    pub session: Arc<AuthSession>,
}

/// Wire up a client from config. The returned receiver carries navigation
/// and alert events for the hosting shell to render.
/// Install the ring crypto provider so reqwest clients can be built under
/// test; the binary does this once at startup in `main`.
#[cfg(test)]
pub(crate) fn install_test_crypto() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub fn build(config: ClientConfig) -> (Client, mpsc::UnboundedReceiver<ShellEvent>) {
    let (shell, shell_rx) = Shell::new();
    let store = Arc::new(TokenStore::open(config.credentials_path()));
    let state = AuthState::new(store.access_token().is_some());
    let refresher = Arc::new(TokenRefresher::new(
        Arc::clone(&store),
        state.clone(),
        shell.clone(),
        config.refresh_url(),
    ));
    let http = Arc::new(HttpClient::new(
        &config.api_url,
        Arc::clone(&store),
        Arc::clone(&refresher),
        shell.clone(),
    ));
    let session = Arc::new(AuthSession::new(
        state,
        Arc::clone(&store),
        Arc::clone(&http),
        shell.clone(),
    ));

    let client = Client { config, shell, store, refresher, http, session };
    (client, shell_rx)
}
