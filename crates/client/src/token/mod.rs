// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential handling: JWT payload decoding, persistence, and renewal.
//!
//! Tokens are opaque to the client except for two payload fields: `exp` on
//! refresh tokens (expiry checks) and `user_id` on access tokens (read once,
//! at login). Access tokens are otherwise forwarded untouched as bearer
//! credentials — their validity is judged purely by server response.

pub mod refresher;
pub mod store;

use base64::Engine as _;
use serde::Deserialize;

/// The payload fields the client ever looks at.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtClaims {
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub user_id: Option<u64>,
}

/// Decode the payload segment of a JWT without verifying the signature.
///
/// Returns `None` unless the token is exactly three dot-separated segments
/// with a base64url JSON payload. Signature verification is the server's
/// job.
pub fn decode_claims(token: &str) -> Option<JwtClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }
    // Tokens are base64url, sometimes with padding; strip it before decoding.
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&payload).ok()
}

/// Current Unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
