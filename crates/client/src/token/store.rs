// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential persistence: three fixed entries in a JSON file with atomic
//! writes. No network calls live here.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::token::{decode_claims, epoch_secs};

/// The three persisted credential entries, under their fixed keys.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Owns persisted credential state.
///
/// Write paths: login/registration-verification ([`TokenStore::set_credential`]),
/// refresh success ([`TokenStore::store_refreshed`] — the refresher is the
/// only caller), and logout/terminal-refresh-failure ([`TokenStore::clear`]).
pub struct TokenStore {
    path: PathBuf,
    inner: RwLock<PersistedCredential>,
    /// Bumped on every write. Lets the refresher detect a refresh that
    /// completed while it was queued on the single-flight lock.
    generation: AtomicU64,
    /// Instant of the last in-process write. Never persisted, so a fresh
    /// process always revalidates against the server.
    last_write: RwLock<Option<Instant>>,
}

impl TokenStore {
    /// Open a store backed by the given file, loading existing entries.
    pub fn open(path: PathBuf) -> Self {
        let inner = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(creds) => creds,
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "unreadable credential file, starting empty");
                    PersistedCredential::default()
                }
            },
            Err(_) => PersistedCredential::default(),
        };
        Self {
            path,
            inner: RwLock::new(inner),
            generation: AtomicU64::new(0),
            last_write: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.read().ok().and_then(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.read().ok().and_then(|c| c.refresh_token.clone())
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.read().ok().and_then(|c| c.user_id.clone())
    }

    /// Write generation counter; bumped on every mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Instant of the last in-process credential write, if any.
    pub fn last_write(&self) -> Option<Instant> {
        self.last_write.read().ok().and_then(|g| *g)
    }

    /// Overwrite all three entries from a login or verification result.
    ///
    /// The user id is derived by decoding the access token payload. If that
    /// decode fails, the tokens are still stored — only the user id entry is
    /// skipped.
    pub fn set_credential(&self, access: &str, refresh: &str) {
        let user_id = match decode_claims(access).and_then(|c| c.user_id) {
            Some(id) => Some(id.to_string()),
            None => {
                warn!("could not decode user_id from access token; storing tokens without it");
                None
            }
        };
        self.mutate(|creds| {
            creds.access_token = Some(access.to_owned());
            creds.refresh_token = Some(refresh.to_owned());
            creds.user_id = user_id;
        });
    }

    /// Apply a refresh result. The server may omit rotation, so a present
    /// field is never overwritten by an absent one.
    pub fn store_refreshed(&self, access: Option<&str>, refresh: Option<&str>) {
        if access.is_none() && refresh.is_none() {
            return;
        }
        self.mutate(|creds| {
            if let Some(access) = access {
                creds.access_token = Some(access.to_owned());
            }
            if let Some(refresh) = refresh {
                creds.refresh_token = Some(refresh.to_owned());
            }
        });
    }

    /// Forget local freshness so the next token request revalidates against
    /// the server. Called when a request bounces with a stale-token 401.
    pub fn mark_access_stale(&self) {
        if let Ok(mut guard) = self.last_write.write() {
            *guard = None;
        }
    }

    /// Remove all three entries.
    pub fn clear(&self) {
        self.mutate(|creds| *creds = PersistedCredential::default());
    }

    /// Re-read the backing file, picking up writes from other instances.
    pub fn reload(&self) {
        let creds = match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => PersistedCredential::default(),
        };
        if let Ok(mut guard) = self.inner.write() {
            *guard = creds;
        }
        // External write: bump the generation but not last_write, so the
        // refresher does not treat foreign tokens as locally fresh.
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Seconds of life left on the refresh token.
    ///
    /// `None` for an absent token, a token without exactly three segments,
    /// or a payload that is not valid base64url JSON.
    pub fn remaining_refresh_lifetime_secs(&self) -> Option<i64> {
        let refresh = self.refresh_token()?;
        let exp = decode_claims(&refresh)?.exp?;
        Some(exp as i64 - epoch_secs() as i64)
    }

    fn mutate(&self, apply: impl FnOnce(&mut PersistedCredential)) {
        let snapshot = match self.inner.write() {
            Ok(mut guard) => {
                apply(&mut guard);
                guard.clone()
            }
            Err(_) => return,
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_write.write() {
            *guard = Some(Instant::now());
        }
        if let Err(e) = save(&self.path, &snapshot) {
            warn!(path = %self.path.display(), err = %e, "failed to persist credentials");
        } else {
            debug!(path = %self.path.display(), "credentials persisted");
        }
    }
}

/// Save credentials to disk atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves cannot
/// corrupt each other through a shared `.tmp` file.
fn save(path: &Path, creds: &PersistedCredential) -> anyhow::Result<()> {
    use std::sync::atomic::AtomicU32;
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(creds)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
