// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication session state and route gating.
//!
//! [`AuthState`] is a watch channel over one bool: is the user believed
//! authenticated. [`AuthSession`] keeps it honest by revalidating against
//! the server at startup and whenever another client instance rewrites the
//! shared credential file.

use std::sync::Arc;
use std::time::Duration;

use notify::Watcher as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::PROBE_PATH;
use crate::error::HttpError;
use crate::http::HttpClient;
use crate::shell::{Nav, Shell};
use crate::token::store::TokenStore;

/// A credential file event this close after our own write is the watcher
/// echoing us back, not another instance.
const OWN_WRITE_WINDOW: Duration = Duration::from_secs(2);

/// Shared believed-authenticated flag.
#[derive(Clone)]
pub struct AuthState {
    tx: Arc<watch::Sender<bool>>,
}

impl AuthState {
    pub fn new(initial: bool) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, authenticated: bool) {
        // send_if_modified keeps watchers quiet on no-op transitions.
        self.tx.send_if_modified(|current| {
            if *current == authenticated {
                false
            } else {
                *current = authenticated;
                true
            }
        });
    }

    pub fn get(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to transitions; screens use this to tear down when the
    /// session dies under them.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Route-gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Allow,
    Redirect(Nav),
}

pub struct AuthSession {
    auth: AuthState,
    store: Arc<TokenStore>,
    http: Arc<HttpClient>,
    shell: Shell,
}

impl AuthSession {
    pub fn new(auth: AuthState, store: Arc<TokenStore>, http: Arc<HttpClient>, shell: Shell) -> Self {
        Self { auth, store, http, shell }
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    /// Startup check: stored tokens are a hint, not proof. With no stored
    /// credential the session is logged out without a network call.
    pub async fn init(&self) {
        if self.store.access_token().is_none() && self.store.refresh_token().is_none() {
            self.auth.set(false);
            return;
        }
        self.revalidate().await;
    }

    /// Ask the server whether the current credential is still honored.
    ///
    /// Unreachable-network leaves the believed state untouched; an offline
    /// blip must not log anyone out.
    pub async fn revalidate(&self) {
        match self.http.get(PROBE_PATH).await {
            Ok(_) => {
                debug!("credential probe accepted");
                self.auth.set(true);
            }
            Err(HttpError::TokenInvalid) => {
                // The refresher already cleared the store and navigated.
                info!("credential probe rejected, session is logged out");
                self.auth.set(false);
            }
            Err(HttpError::NetworkUnreachable) => {
                debug!("credential probe unreachable, keeping current state");
            }
            Err(e) => {
                // The server answered the bearer without rejecting it.
                debug!(err = %e, "credential probe errored but token was honored");
                self.auth.set(true);
            }
        }
    }

    /// Exchange email + password for a token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), HttpError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let resp = self.http.post_public("token/", body).await?;
        let access = resp.get("access").and_then(|v| v.as_str());
        let refresh = resp.get("refresh").and_then(|v| v.as_str());
        let (Some(access), Some(refresh)) = (access, refresh) else {
            warn!("login response missing token pair");
            return Err(HttpError::Decode);
        };
        self.store.set_credential(access, refresh);
        self.auth.set(true);
        self.shell.navigate(Nav::Queue);
        Ok(())
    }

    /// Drop the credential and return to the entry view.
    pub fn logout(&self) {
        info!("logging out");
        self.store.clear();
        self.auth.set(false);
        self.shell.navigate(Nav::Entry);
    }

    /// Gate for views requiring authentication.
    pub fn private_gate(&self) -> Gate {
        if self.auth.get() {
            Gate::Allow
        } else {
            Gate::Redirect(Nav::Entry)
        }
    }

    /// Gate for entry/registration views: an authenticated user is bounced
    /// straight to the queue.
    pub fn public_gate(&self) -> Gate {
        if self.auth.get() {
            Gate::Redirect(Nav::Queue)
        } else {
            Gate::Allow
        }
    }
}

/// Watch the credential file for writes by other client instances.
///
/// A foreign write reloads the store and revalidates, so logging out in one
/// instance logs out the others within a watcher tick. Our own writes are
/// filtered by comparing against the store's last-write instant.
pub fn spawn_storage_watcher(session: Arc<AuthSession>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let path = session.store.path().to_path_buf();
        let Some(dir) = path.parent().map(std::path::Path::to_path_buf) else {
            return;
        };
        if !dir.exists() {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                warn!(dir = %dir.display(), err = %e, "cannot create state dir for watcher");
                return;
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let file_name = path.file_name().map(std::ffi::OsStr::to_os_string);
        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(std::ffi::OsStr::to_os_string) == file_name);
                if ours {
                    let _ = tx.send(());
                }
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                warn!(err = %e, "credential watcher unavailable");
                return;
            }
        };
        if let Err(e) = watcher.watch(&dir, notify::RecursiveMode::NonRecursive) {
            warn!(dir = %dir.display(), err = %e, "cannot watch state dir");
            return;
        }

        while rx.recv().await.is_some() {
            // Drain the burst a single atomic save produces.
            while rx.try_recv().is_ok() {}
            let own_write = session
                .store
                .last_write()
                .is_some_and(|at| at.elapsed() < OWN_WRITE_WINDOW);
            if own_write {
                continue;
            }
            info!("credential file changed externally, reloading");
            session.store.reload();
            if session.store.access_token().is_none() && session.store.refresh_token().is_none() {
                session.auth.set(false);
                session.shell.navigate(Nav::Entry);
            } else {
                session.revalidate().await;
            }
        }
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
