// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint requests and responses.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::oauth::client_auth::ClientAuthStrategy;
use crate::transport::{truncate, HttpRequest, HttpResponse, HttpTransport};

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// RFC 6749 §5.2 error body (also used by resource servers for 401s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuthErrorResponse {
    /// Map a well-known OAuth error code to an engine error.
    pub fn into_error(self, status: u16, context: &str) -> Error {
        let kind = match self.error.as_str() {
            "invalid_grant" => ErrorKind::InvalidGrant,
            "invalid_token" => ErrorKind::InvalidToken,
            _ => ErrorKind::Transport,
        };
        let mut message = format!("{context}: {}", self.error);
        if let Some(ref description) = self.error_description {
            message.push_str(&format!(" ({description})"));
        }
        kind.error(message).with_status(status).with_code(self.error)
    }
}

/// Parse an OAuth error from a failed response, if it carries one.
pub fn parse_error(resp: &HttpResponse) -> Option<OAuthErrorResponse> {
    resp.json::<OAuthErrorResponse>().ok()
}

/// Scope requested from the proof backend's authorization server.
pub const PROOF_BACKEND_SCOPE: &str = "ca:gf ca:er ca:dr";

/// Grants this client can perform.
#[derive(Debug, Clone, Copy)]
pub enum Grant<'a> {
    ClientCredentials { scope: &'a str },
    RefreshToken { refresh_token: &'a str },
}

impl Grant<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientCredentials { .. } => "client_credentials",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Perform a single token request.
pub async fn request_token(
    transport: &dyn HttpTransport,
    timeout: Duration,
    token_endpoint: &str,
    grant: Grant<'_>,
    client_auth: &ClientAuthStrategy,
    audience: &str,
) -> Result<TokenResponse> {
    let mut params: Vec<(String, String)> = vec![("grant_type".into(), grant.name().into())];
    match grant {
        Grant::ClientCredentials { scope } => params.push(("scope".into(), scope.into())),
        Grant::RefreshToken { refresh_token } => {
            params.push(("refresh_token".into(), refresh_token.into()));
        }
    }
    let mut headers = Vec::new();
    client_auth.apply(&mut params, &mut headers, audience).await?;

    let pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let mut req =
        HttpRequest::post(token_endpoint).header("Accept", "application/json").form(&pairs);
    req.headers.extend(headers);

    let resp = transport.send(req, timeout).await?;
    let status = resp.status.as_u16();
    if !resp.status.is_success() {
        let context = format!("{} grant failed", grant.name());
        return Err(match parse_error(&resp) {
            Some(oauth) => oauth.into_error(status, &context),
            None => ErrorKind::Transport
                .error(format!("{context} ({}): {}", resp.status, truncate(&resp.text(), 512)))
                .with_status(status),
        });
    }

    resp.json::<TokenResponse>().map_err(|e| {
        ErrorKind::Protocol.error(format!("invalid token response: {e}")).with_status(status)
    })
}
