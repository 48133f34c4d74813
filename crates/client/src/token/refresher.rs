// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access-token renewal with single-flight coalescing.
//!
//! Every bearer-authenticated request funnels through
//! [`TokenRefresher::get_valid_access_token`] first. Concurrent callers
//! share one network refresh; a caller that queued while a refresh was in
//! flight adopts that refresh's outcome instead of starting another.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::TokenError;
use crate::session::AuthState;
use crate::shell::{Nav, Shell};
use crate::token::store::TokenStore;
use crate::token::{decode_claims, epoch_secs};

/// How long a locally written access token is trusted without revalidation.
/// Only in-process writes count, so a fresh process always revalidates.
const ACCESS_FRESH_SECS: u64 = 60;

/// Outcome of a completed refresh, kept briefly so queued callers can adopt
/// it instead of refreshing again.
struct Flight {
    finished_at: Instant,
    outcome: Result<String, TokenError>,
}

/// Body of a refresh response. The server may rotate either token or
/// neither; absent fields leave the stored value untouched.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
}

pub struct TokenRefresher {
    store: Arc<TokenStore>,
    auth: AuthState,
    shell: Shell,
    refresh_url: String,
    /// Refresh calls never carry an Authorization header, so this client is
    /// separate from the bearer-injecting one.
    client: reqwest::Client,
    flight: Mutex<Option<Flight>>,
}

impl TokenRefresher {
    pub fn new(store: Arc<TokenStore>, auth: AuthState, shell: Shell, refresh_url: String) -> Self {
        Self {
            store,
            auth,
            shell,
            refresh_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            flight: Mutex::new(None),
        }
    }

    /// Produce an access token believed valid, renewing if needed.
    ///
    /// `None` means re-authentication is required; by then the store has
    /// been cleared, auth state flipped, and the user sent to the entry
    /// view. Callers never need to distinguish failure modes.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        match self.attempt().await {
            Ok(token) => Some(token),
            Err(e) => {
                info!(reason = %e, "credential unusable, forcing re-login");
                self.store.clear();
                self.auth.set(false);
                self.shell.navigate(Nav::Entry);
                None
            }
        }
    }

    async fn attempt(&self) -> Result<String, TokenError> {
        // Fast path: a token we wrote moments ago is served without a lock
        // or a network call.
        if let Some(token) = self.locally_fresh() {
            return Ok(token);
        }

        let wait_start = Instant::now();
        let mut flight = self.flight.lock().await;

        // A refresh that finished while we were queued settles us too,
        // success or failure alike.
        if let Some(prev) = flight.as_ref() {
            if prev.finished_at >= wait_start {
                return prev.outcome.clone();
            }
        }
        if let Some(token) = self.locally_fresh() {
            return Ok(token);
        }

        let outcome = self.refresh_once().await;
        *flight = Some(Flight {
            finished_at: Instant::now(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// An access token written by this process within the freshness window.
    fn locally_fresh(&self) -> Option<String> {
        let written = self.store.last_write()?;
        if written.elapsed() >= Duration::from_secs(ACCESS_FRESH_SECS) {
            return None;
        }
        self.store.access_token()
    }

    /// One refresh round-trip. Checks refresh-token expiry locally first so
    /// a known-dead token never generates a doomed network call.
    async fn refresh_once(&self) -> Result<String, TokenError> {
        let refresh = self.store.refresh_token().ok_or(TokenError::NoCredential)?;
        let claims = decode_claims(&refresh).ok_or(TokenError::MalformedToken)?;
        let exp = claims.exp.ok_or(TokenError::MalformedToken)?;
        if exp <= epoch_secs() {
            return Err(TokenError::RefreshExpired);
        }

        debug!(url = %self.refresh_url, "refreshing access token");
        let resp = self
            .client
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refresh": refresh }))
            .send()
            .await
            .map_err(|e| {
                warn!(err = %e, "refresh request failed to reach server");
                TokenError::RefreshFailed
            })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = %status, "refresh rejected by server");
            return Err(TokenError::RefreshFailed);
        }

        let body: RefreshResponse = resp.json().await.map_err(|e| {
            warn!(err = %e, "refresh response body undecodable");
            TokenError::RefreshFailed
        })?;
        let access = body.access.clone().ok_or(TokenError::RefreshFailed)?;
        self.store
            .store_refreshed(body.access.as_deref(), body.refresh.as_deref());
        debug!(rotated_refresh = body.refresh.is_some(), "access token refreshed");
        Ok(access)
    }
}

#[cfg(test)]
#[path = "refresher_tests.rs"]
mod tests;
