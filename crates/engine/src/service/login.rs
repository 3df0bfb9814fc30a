// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential renewal by logging in again.
//!
//! The long-lived account session token (kept as the bundle's refresh
//! token) is exchanged for an id token, which is then presented to the
//! account backend's login operation together with a proof bound to it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Operation, Outcome};
use crate::credential::{AuthBundle, UserIdentity};
use crate::error::{ErrorKind, Result};
use crate::flags::RequestFlags;
use crate::lifecycle::Renewer;
use crate::oauth::token::parse_error;
use crate::pipeline::Channel;
use crate::proof::HashMethod;
use crate::transport::{truncate, HttpRequest, HttpTransport};

pub const NA_TOKEN_URL: &str = "https://accounts.nintendo.com/connect/1.0.0/api/token";
pub const NA_CLIENT_ID: &str = "71b963c1b7b6d119";
pub const LOGIN_PATH: &str = "/v3/Account/Login";

const SESSION_TOKEN_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer-session-token";

#[derive(Debug, Deserialize)]
struct IdTokenResponse {
    id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResult {
    user: LoginUser,
    web_api_server_credential: ServerCredential,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginUser {
    id: Value,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerCredential {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Renews the bearer credential through the account backend's login call.
pub struct LoginRenewer {
    channel: Channel,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    na_token_url: String,
    na_client_id: String,
    language: String,
    country: String,
}

impl LoginRenewer {
    /// `channel` must target the account backend.
    pub fn new(channel: Channel, transport: Arc<dyn HttpTransport>, timeout: Duration) -> Self {
        Self {
            channel,
            transport,
            timeout,
            na_token_url: NA_TOKEN_URL.into(),
            na_client_id: NA_CLIENT_ID.into(),
            language: "en-GB".into(),
            country: "GB".into(),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.na_token_url = url.into();
        self
    }

    pub fn with_locale(mut self, language: impl Into<String>, country: impl Into<String>) -> Self {
        self.language = language.into();
        self.country = country.into();
        self
    }

    async fn id_token(&self, session_token: &str) -> Result<String> {
        let body = json!({
            "client_id": self.na_client_id,
            "session_token": session_token,
            "grant_type": SESSION_TOKEN_GRANT,
        });
        let request = HttpRequest::post(&self.na_token_url)
            .header("Accept", "application/json")
            .json(&body)?;
        let resp = self.transport.send(request, self.timeout).await?;
        let status = resp.status.as_u16();
        if !resp.status.is_success() {
            return Err(match parse_error(&resp) {
                Some(oauth) => oauth.into_error(status, "session token exchange"),
                None => ErrorKind::Transport
                    .error(format!(
                        "session token exchange failed ({}): {}",
                        resp.status,
                        truncate(&resp.text(), 256)
                    ))
                    .with_status(status),
            });
        }
        let token: IdTokenResponse = resp.json().map_err(|e| {
            ErrorKind::Protocol.error(format!("invalid id token response: {e}")).with_status(status)
        })?;
        Ok(token.id_token)
    }
}

#[async_trait]
impl Renewer for LoginRenewer {
    async fn renew(&self, previous: Option<Arc<AuthBundle>>) -> Result<AuthBundle> {
        let session_token = previous
            .as_ref()
            .and_then(|b| b.refresh_token.clone())
            .ok_or_else(|| ErrorKind::NotAuthenticated.error("no session token to log in with"))?;

        let id_token = self.id_token(&session_token).await?;
        let na_id = jwt_subject(&id_token);

        let operation = Operation::post("Account/Login", LOGIN_PATH)
            .parameter(json!({
                "naIdToken": id_token,
                "naCountry": self.country,
                "language": self.language,
            }))
            .with_proof_for(HashMethod::Login, id_token.clone(), na_id.clone());
        let attempt = self
            .channel
            .attempt(&operation, &RequestFlags::unauthenticated(), None)
            .await
            .map_err(|e| e.with_operation(&operation.name))?;

        let value = match attempt.outcome {
            Outcome::Success { value, .. } => value,
            Outcome::Expired { message, correlation_id, .. } => {
                return Err(ErrorKind::CredentialExpired
                    .error(format!("login rejected: {message}"))
                    .with_operation(&operation.name)
                    .with_correlation_id(correlation_id));
            }
        };
        let result: LoginResult = serde_json::from_value(value).map_err(|e| {
            ErrorKind::Protocol
                .error(format!("unexpected login result: {e}"))
                .with_operation(&operation.name)
        })?;

        let id = match result.user.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let user = UserIdentity { id, na_id, nickname: result.user.name };
        let credential = result.web_api_server_credential;
        Ok(AuthBundle::new(credential.access_token, credential.expires_in, user)
            .with_refresh_token(session_token))
    }
}

/// `sub` claim of a JWT, without verifying it.
fn jwt_subject(jwt: &str) -> Option<String> {
    let payload = jwt.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    claims.get("sub").and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
#[path = "login_tests.rs"]
mod tests;
