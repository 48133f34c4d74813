// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the token, HTTP, and realtime layers.

use std::fmt;

/// Token-layer failures. These are resolved to `None` by the refresher and
/// logged; they are never surfaced to UI code as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Access or refresh token missing from the store.
    NoCredential,
    /// Refresh token is not a decodable three-segment JWT.
    MalformedToken,
    /// Refresh token expiry is not in the future; re-login required.
    RefreshExpired,
    /// The refresh network call failed or was rejected.
    RefreshFailed,
}

impl TokenError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCredential => "NO_CREDENTIAL",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::RefreshExpired => "REFRESH_EXPIRED",
            Self::RefreshFailed => "REFRESH_FAILED",
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP-layer failures surfaced to callers of [`crate::http::HttpClient`].
///
/// Everything other than the two internally handled 401 cases propagates to
/// the calling screen for local display.
#[derive(Debug, Clone)]
pub enum HttpError {
    /// No response at all (connect failure, DNS, client-side timeout).
    NetworkUnreachable,
    /// The access token was rejected and could not be renewed.
    TokenInvalid,
    /// The response body did not match the expected shape.
    Decode,
    /// Any other non-success response, passed through with its body.
    Status { status: u16, body: serde_json::Value },
}

impl HttpError {
    /// Best-effort human-readable message from a DRF-style error body.
    ///
    /// Looks for `detail` first, then field-level error lists.
    pub fn detail(&self) -> Option<String> {
        let Self::Status { body, .. } = self else {
            return None;
        };
        if let Some(detail) = body.get("detail").and_then(|d| d.as_str()) {
            return Some(detail.to_owned());
        }
        for field in ["password", "new_password", "old_password"] {
            if let Some(list) = body.get(field).and_then(|v| v.as_array()) {
                let joined: Vec<&str> = list.iter().filter_map(|v| v.as_str()).collect();
                if !joined.is_empty() {
                    return Some(joined.join("\n"));
                }
            }
        }
        None
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkUnreachable => f.write_str("no response from server"),
            Self::TokenInvalid => f.write_str("access token invalid and not renewable"),
            Self::Decode => f.write_str("unexpected response shape"),
            Self::Status { status, .. } => write!(f, "request failed with status {status}"),
        }
    }
}

impl std::error::Error for HttpError {}

/// Realtime-layer failures. Logged and fed into the connection state
/// machine; never a blocking UI error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeError {
    /// Token was unobtainable or the WebSocket handshake failed.
    HandshakeFailed,
    /// The transport closed underneath an open connection.
    TransportClosed,
}

impl RealtimeError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HandshakeFailed => "HANDSHAKE_FAILED",
            Self::TransportClosed => "TRANSPORT_CLOSED",
        }
    }
}

impl fmt::Display for RealtimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
