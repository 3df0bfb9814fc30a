// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client construction: a fresh login, or a credential restored from a store.

use std::sync::Arc;
use std::time::Duration;

use crate::credential::{AuthBundle, CredentialStore, StoredCredential, UserIdentity};
use crate::error::{ErrorKind, Result};
use crate::events::EventHub;
use crate::lifecycle::{Renewer, TokenLifecycle};
use crate::pipeline::{Channel, Client, ClientInfo};
use crate::proof::ProofGenerator;
use crate::service::ServiceProtocol;
use crate::transport::HttpTransport;

/// Collaborators of one authenticated client.
#[derive(Clone)]
pub struct SessionOptions {
    pub account_id: String,
    pub service: Arc<dyn ServiceProtocol>,
    pub provider: Arc<dyn ProofGenerator>,
    pub transport: Arc<dyn HttpTransport>,
    pub timeout: Duration,
    pub client_info: ClientInfo,
    pub renewer: Arc<dyn Renewer>,
    pub store: Option<Arc<dyn CredentialStore>>,
}

fn build(options: SessionOptions) -> Client {
    let events = EventHub::new();
    let lifecycle =
        TokenLifecycle::new(options.account_id, options.renewer, options.store, events.clone());
    let channel = Channel::new(
        options.service,
        options.provider,
        options.transport,
        options.timeout,
        options.client_info,
    );
    Client::new(channel, lifecycle, events)
}

/// Log in with `session_token` and return a client holding the new
/// credential. The credential is persisted if a store is configured.
pub async fn new_session(
    options: SessionOptions,
    session_token: impl Into<String>,
) -> Result<Client> {
    let client = build(options);
    // Expired placeholder carrying only the session token; the renewer
    // replaces it as a whole.
    let mut seed =
        AuthBundle::new("", 0, UserIdentity::default()).with_refresh_token(session_token);
    seed.expires_at = 1;
    client.lifecycle().install(seed);
    client.renew().await?;
    Ok(client)
}

/// Rebuild a client from the credential saved for `options.account_id`.
///
/// The saved credential is used as is; if it has expired it is renewed on
/// first use.
pub async fn restore_session(options: SessionOptions) -> Result<Client> {
    let store = options.store.clone().ok_or_else(|| {
        ErrorKind::Config.error("restoring a session requires a credential store")
    })?;
    let saved =
        store.get(&options.account_id).await?.and_then(StoredCredential::into_auth).ok_or_else(
            || {
                ErrorKind::NotAuthenticated
                    .error(format!("no saved credential for account {}", options.account_id))
            },
        )?;

    tracing::debug!(account = %options.account_id, expires_at = saved.expires_at, "restoring session");
    let client = build(options);
    client.lifecycle().install(saved);
    Ok(client)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
