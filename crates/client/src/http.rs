// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-authenticated HTTP client with one-shot 401 recovery.
//!
//! Every authenticated request obtains a believed-valid access token first,
//! then may replay exactly once after a `token_not_valid` 401 forces an
//! out-of-band refresh. A second 401 propagates; no request loops.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::normalize_base;
use crate::error::HttpError;
use crate::shell::Shell;
use crate::token::refresher::TokenRefresher;
use crate::token::store::TokenStore;

/// Marker the server puts in 401 bodies that mean "stale access token"
/// rather than "forbidden".
const TOKEN_NOT_VALID: &str = "token_not_valid";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy)]
enum Method {
    Get,
    Post,
    Put,
}

pub struct HttpClient {
    base: String,
    store: Arc<TokenStore>,
    refresher: Arc<TokenRefresher>,
    shell: Shell,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(
        api_url: &str,
        store: Arc<TokenStore>,
        refresher: Arc<TokenRefresher>,
        shell: Shell,
    ) -> Self {
        Self {
            base: normalize_base(api_url),
            store,
            refresher,
            shell,
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Join a relative path onto the API base.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<Value, HttpError> {
        self.send(Method::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, HttpError> {
        self.send(Method::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, HttpError> {
        self.send(Method::Put, path, Some(body)).await
    }

    /// Unauthenticated POST (login, registration, password reset). No bearer
    /// header, no 401 recovery.
    pub async fn post_public(&self, path: &str, body: Value) -> Result<Value, HttpError> {
        let url = self.url(path);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, err = %e, "request failed to reach server");
                self.shell.alert("Could not reach the server. Please try again.");
                HttpError::NetworkUnreachable
            })?;
        decode_response(resp).await
    }

    /// Authenticated request with the exactly-once 401 replay.
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, HttpError> {
        let token = self
            .refresher
            .get_valid_access_token()
            .await
            .ok_or(HttpError::TokenInvalid)?;

        let (status, value) = self.issue(method, path, body.as_ref(), &token).await?;
        if status != 401 || !is_token_rejection(&value) {
            return finish(status, value);
        }

        // The token we sent was rejected mid-lifetime. Force one refresh and
        // replay once; the single-flight cell dedupes concurrent victims.
        info!(path, "access token rejected, refreshing and replaying once");
        self.store.mark_access_stale();
        let token = self
            .refresher
            .get_valid_access_token()
            .await
            .ok_or(HttpError::TokenInvalid)?;
        let (status, value) = self.issue(method, path, body.as_ref(), &token).await?;
        if status == 401 && is_token_rejection(&value) {
            warn!(path, "replayed request rejected again");
            return Err(HttpError::TokenInvalid);
        }
        finish(status, value)
    }

    /// One wire round-trip with the bearer header attached.
    async fn issue(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<(u16, Value), HttpError> {
        let url = self.url(path);
        let mut req = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
        }
        .bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| {
            warn!(url = %url, err = %e, "request failed to reach server");
            self.shell.alert("Could not reach the server. Please try again.");
            HttpError::NetworkUnreachable
        })?;
        let status = resp.status().as_u16();
        let value = resp.json::<Value>().await.unwrap_or(Value::Null);
        debug!(url = %url, status, "response received");
        Ok((status, value))
    }
}

/// 401 bodies carrying the `token_not_valid` code are recoverable by
/// refresh; any other 401 is a plain authorization failure.
fn is_token_rejection(body: &Value) -> bool {
    body.get("code").and_then(|c| c.as_str()) == Some(TOKEN_NOT_VALID)
}

async fn decode_response(resp: reqwest::Response) -> Result<Value, HttpError> {
    let status = resp.status().as_u16();
    let value = resp.json::<Value>().await.unwrap_or(Value::Null);
    finish(status, value)
}

fn finish(status: u16, value: Value) -> Result<Value, HttpError> {
    if (200..300).contains(&status) {
        Ok(value)
    } else {
        Err(HttpError::Status { status, body: value })
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
