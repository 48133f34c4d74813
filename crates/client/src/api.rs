// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed wrappers over the LyncUp REST surface.
//!
//! Thin by intent: each function maps one endpoint, decodes the response
//! into a small struct, and propagates [`HttpError`] for the calling screen
//! to render.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HttpError;
use crate::http::HttpClient;

/// Authenticated GET that doubles as the session probe: answers whether the
/// signed-in user has filled in their profile.
pub const PROBE_PATH: &str = "users/checkprofilecomplete/";

#[derive(Debug, Clone, Serialize)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub password: String,
    pub password2: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub aboutme: Option<String>,
    #[serde(default)]
    pub country_id: Option<u64>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub organisation_id: Option<u64>,
    #[serde(default)]
    pub organisation_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Country {
    pub country_id: u64,
    pub country_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organisation {
    pub organisation_id: u64,
    pub organisation_name: String,
}

pub struct Api<'a> {
    http: &'a HttpClient,
}

impl<'a> Api<'a> {
    pub fn new(http: &'a HttpClient) -> Self {
        Self { http }
    }

    /// Create an account. The server sends a verification email; the account
    /// is not usable until the emailed link is followed.
    pub async fn register(&self, form: &RegisterForm) -> Result<(), HttpError> {
        let body = serde_json::to_value(form).map_err(|_| HttpError::Decode)?;
        self.http.post_public("users/register/", body).await?;
        Ok(())
    }

    /// Ask for a fresh verification email after a failed or expired link.
    pub async fn resend_verification(&self, email: &str) -> Result<Option<String>, HttpError> {
        let resp = self
            .http
            .post_public(
                "users/resend-verification/",
                serde_json::json!({ "email": email }),
            )
            .await?;
        Ok(detail_of(&resp))
    }

    /// Request a password-reset email. Always answers success-shaped so the
    /// endpoint does not confirm which addresses exist.
    pub async fn send_password_reset(&self, email: &str) -> Result<Option<String>, HttpError> {
        let resp = self
            .http
            .post_public(
                "users/send-password-reset/",
                serde_json::json!({ "email": email }),
            )
            .await?;
        Ok(detail_of(&resp))
    }

    /// Complete a password reset using the uid + token from the email link.
    pub async fn reset_password(
        &self,
        uidb64: &str,
        token: &str,
        new_password: &str,
    ) -> Result<Option<String>, HttpError> {
        let path = format!("users/reset-password/{uidb64}/{token}/");
        let resp = self
            .http
            .post_public(&path, serde_json::json!({ "new_password": new_password }))
            .await?;
        Ok(detail_of(&resp))
    }

    /// Change password while signed in.
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Option<String>, HttpError> {
        let resp = self
            .http
            .post(
                "users/change-password-authenticated/",
                serde_json::json!({
                    "old_password": old_password,
                    "new_password": new_password,
                    "confirm_password": confirm_password,
                }),
            )
            .await?;
        Ok(detail_of(&resp))
    }

    pub async fn show_profile(&self, user_id: &str) -> Result<Profile, HttpError> {
        let resp = self.http.get(&format!("users/showprofile/{user_id}")).await?;
        serde_json::from_value(resp).map_err(|_| HttpError::Decode)
    }

    /// Batch profile fetch for a roster of user ids.
    pub async fn show_multi_profiles(&self, user_ids: &[u64]) -> Result<Vec<Profile>, HttpError> {
        let ids = user_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let resp = self
            .http
            .get(&format!("users/showmultiprofiles/?user_ids={ids}"))
            .await?;
        serde_json::from_value(resp).map_err(|_| HttpError::Decode)
    }

    pub async fn update_profile(&self, profile: &Profile) -> Result<Profile, HttpError> {
        let body = serde_json::to_value(profile).map_err(|_| HttpError::Decode)?;
        let resp = self.http.put("users/updateprofile/", body).await?;
        serde_json::from_value(resp).map_err(|_| HttpError::Decode)
    }

    pub async fn show_all_countries(&self) -> Result<Vec<Country>, HttpError> {
        let resp = self.http.get("users/showallcountries/").await?;
        serde_json::from_value(resp).map_err(|_| HttpError::Decode)
    }

    /// Organisation typeahead; the caller debounces.
    pub async fn search_organisations(&self, query: &str) -> Result<Vec<Organisation>, HttpError> {
        let resp = self.http.get(&format!("users/searchorg/?q={query}")).await?;
        serde_json::from_value(resp).map_err(|_| HttpError::Decode)
    }

    /// Whether the signed-in user's profile is complete enough to queue.
    pub async fn check_profile_complete(&self) -> Result<bool, HttpError> {
        let resp = self.http.get(PROBE_PATH).await?;
        Ok(resp
            .get("profile_complete")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub async fn like(&self, user_to: u64) -> Result<(), HttpError> {
        self.http
            .post("users/like/", serde_json::json!({ "user_to": user_to }))
            .await?;
        Ok(())
    }

    pub async fn unlike(&self, user_to: u64) -> Result<(), HttpError> {
        self.http
            .post("users/unlike/", serde_json::json!({ "user_to": user_to }))
            .await?;
        Ok(())
    }
}

fn detail_of(resp: &Value) -> Option<String> {
    resp.get("detail").and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
