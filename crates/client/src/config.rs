// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

/// Configuration for the LyncUp client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    #[arg(long, default_value = "http://localhost:8080/api/", env = "LYNCUP_API_URL")]
    pub api_url: String,

    /// Base URL of the realtime WebSocket endpoints.
    #[arg(long, default_value = "ws://localhost:8080/ws", env = "LYNCUP_WS_URL")]
    pub ws_url: String,

    /// Override the state directory used for credential persistence.
    #[arg(long, env = "LYNCUP_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api/".to_owned(),
            ws_url: "ws://localhost:8080/ws".to_owned(),
            state_dir: None,
        }
    }
}

impl ClientConfig {
    /// Resolve the state directory for client data.
    ///
    /// Checks the explicit override, then `$XDG_STATE_HOME/lyncup`,
    /// then `$HOME/.local/state/lyncup`.
    pub fn resolve_state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("lyncup");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/lyncup");
        }
        PathBuf::from(".lyncup")
    }

    /// Path to the persisted credential file.
    pub fn credentials_path(&self) -> PathBuf {
        self.resolve_state_dir().join("credentials.json")
    }

    /// Full URL of the token refresh endpoint.
    pub fn refresh_url(&self) -> String {
        format!("{}token/refresh/", normalize_base(&self.api_url))
    }
}

/// Ensure a base URL ends with exactly one slash.
pub fn normalize_base(base: &str) -> String {
    format!("{}/", base.trim_end_matches('/'))
}
