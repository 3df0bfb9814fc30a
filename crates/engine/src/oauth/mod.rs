// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth client for the self-hosted proof backend.
//!
//! Keeps its own access token, independent of the primary credential, with
//! its own single-flight cell. Tokens are obtained lazily: nothing refreshes
//! ahead of expiry.

pub mod client_auth;
pub mod discovery;
pub mod token;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::credential::{epoch_secs, CredentialStore, StoredCredential};
use crate::error::{ErrorKind, Result};
use crate::lifecycle::{FlightState, SingleFlight};
use crate::transport::HttpTransport;

pub use client_auth::{
    AssertionSigner, ClientAssertion, ClientAuthConfig, ClientAuthMethod, ClientAuthStrategy,
};
pub use discovery::ProtectedResourceDescriptor;
pub use token::{Grant, TokenResponse, PROOF_BACKEND_SCOPE};

/// Access token state for the proof backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSession {
    /// `None` once the resource server rejected it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Epoch seconds; `0` when the server did not say.
    #[serde(default)]
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub client_auth: ClientAuthMethod,
}

impl OAuthSession {
    pub fn from_token(token: TokenResponse, client_auth: ClientAuthMethod) -> Self {
        let expires_at = if token.expires_in == 0 { 0 } else { epoch_secs() + token.expires_in };
        Self {
            access_token: Some(token.access_token),
            expires_at,
            refresh_token: token.refresh_token,
            client_auth,
        }
    }

    /// The access token, if present and not past `expires_at`.
    pub fn valid_token_at(&self, now: u64) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        if self.expires_at != 0 && self.expires_at <= now {
            return None;
        }
        Some(token)
    }
}

struct Inner {
    resource_url: String,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    client_auth: ClientAuthConfig,
    scope: String,
    descriptor: OnceCell<Arc<ProtectedResourceDescriptor>>,
    session: Mutex<Option<OAuthSession>>,
    store: Option<(Arc<dyn CredentialStore>, String)>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Option<OAuthSession>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn needs_token(&self) -> bool {
        self.session().as_ref().and_then(|s| s.valid_token_at(epoch_secs())).is_none()
    }

    async fn descriptor(&self) -> Result<Arc<ProtectedResourceDescriptor>> {
        self.descriptor
            .get_or_try_init(|| async {
                discovery::discover(self.transport.as_ref(), &self.resource_url, self.timeout)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    async fn get_access_token(self: Arc<Self>) -> Result<OAuthSession> {
        let descriptor = self.descriptor().await?;
        let strategy = self.client_auth.select(descriptor.resource_documentation.as_deref())?;
        let audience = descriptor.client_assertion_audience.as_str();
        let cached_refresh = self.session().as_ref().and_then(|s| s.refresh_token.clone());

        let mut refreshed = None;
        if let Some(ref refresh_token) = cached_refresh {
            let grant = Grant::RefreshToken { refresh_token };
            match self.request(&descriptor, grant, &strategy, audience).await {
                Ok(t) => refreshed = Some(t),
                Err(e) if e.is(ErrorKind::InvalidGrant) => {
                    tracing::warn!(resource = %self.resource_url, err = %e, "refresh token rejected, falling back to client credentials");
                    if let Some(s) = self.session().as_mut() {
                        s.refresh_token = None;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let session = match refreshed {
            Some(token) => {
                let mut session = OAuthSession::from_token(token, strategy.method());
                // A refresh response may omit the refresh token; the old one stays usable.
                if session.refresh_token.is_none() {
                    session.refresh_token = cached_refresh;
                }
                session
            }
            None => {
                let grant = Grant::ClientCredentials { scope: &self.scope };
                let token = self.request(&descriptor, grant, &strategy, audience).await?;
                OAuthSession::from_token(token, strategy.method())
            }
        };
        *self.session() = Some(session.clone());

        if let Some((ref store, ref key)) = self.store {
            if let Err(e) = store.set(key, StoredCredential::OAuth(session.clone())).await {
                tracing::warn!(err = %e, "failed to persist proof backend session");
            }
        }
        tracing::debug!(resource = %self.resource_url, method = ?session.client_auth, "obtained proof backend access token");
        Ok(session)
    }

    async fn request(
        &self,
        descriptor: &ProtectedResourceDescriptor,
        grant: Grant<'_>,
        strategy: &ClientAuthStrategy,
        audience: &str,
    ) -> Result<TokenResponse> {
        token::request_token(
            self.transport.as_ref(),
            self.timeout,
            &descriptor.token_endpoint,
            grant,
            strategy,
            audience,
        )
        .await
    }
}

/// Maintains a valid bearer token for calls to one protected resource.
pub struct OAuthClientAuthenticator {
    inner: Arc<Inner>,
    flight: SingleFlight<OAuthSession>,
}

impl OAuthClientAuthenticator {
    pub fn new(
        resource_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        timeout: Duration,
        client_auth: ClientAuthConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resource_url: resource_url.into(),
                transport,
                timeout,
                client_auth,
                scope: PROOF_BACKEND_SCOPE.to_owned(),
                descriptor: OnceCell::new(),
                session: Mutex::new(None),
                store: None,
            }),
            flight: SingleFlight::new(),
        }
    }

    /// Persist obtained sessions under `key`. Call before sharing.
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>, key: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.store = Some((store, key.into()));
        }
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.scope = scope.into();
        }
        self
    }

    pub fn resource_url(&self) -> &str {
        &self.inner.resource_url
    }

    /// Seed a previously persisted session.
    pub fn restore(&self, session: OAuthSession) {
        *self.inner.session() = Some(session);
    }

    pub fn session(&self) -> Option<OAuthSession> {
        self.inner.session().clone()
    }

    pub fn state(&self) -> FlightState {
        self.flight.state()
    }

    /// Cached discovery result, if discovery already ran.
    pub fn descriptor(&self) -> Option<Arc<ProtectedResourceDescriptor>> {
        self.inner.descriptor.get().cloned()
    }

    /// Return a usable access token, fetching one if none is cached or it
    /// expired. Concurrent callers share one token request.
    pub async fn ensure_valid(&self) -> Result<String> {
        let inner = Arc::clone(&self.inner);
        let needed = || self.inner.needs_token();
        let session =
            match self.flight.join_or_start(needed, move || inner.get_access_token().boxed()) {
                Some(handle) => self.flight.wait(handle).await?,
                None => self
                    .session()
                    .ok_or_else(|| ErrorKind::InvalidToken.error("no proof backend session"))?,
            };
        session.access_token.ok_or_else(|| {
            ErrorKind::InvalidToken.error("proof backend session has no access token")
        })
    }

    /// Drop `rejected` after the resource server answered `invalid_token`.
    ///
    /// The refresh token is kept, so the next [`ensure_valid`](Self::ensure_valid)
    /// rebuilds the session through the refresh grant.
    pub fn invalidate(&self, rejected: &str) {
        let mut session = self.inner.session();
        if let Some(s) = session.as_mut() {
            if s.access_token.as_deref() == Some(rejected) {
                s.access_token = None;
                tracing::debug!(resource = %self.inner.resource_url, "proof backend access token invalidated");
            }
        }
    }
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
