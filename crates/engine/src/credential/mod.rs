// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential data and the storage seam.
//!
//! The engine keeps the live [`AuthBundle`] in memory and hands a copy to a
//! [`CredentialStore`] after each successful renewal. When and where that
//! copy lands on disk is the store's business.

pub mod persist;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::oauth::OAuthSession;

/// Who the bearer credential belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Service-side user id (e.g. the social backend's user id).
    pub id: String,
    /// Account-level id, forwarded to proof backends as an identity hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub na_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

/// The rotating bearer credential for one authenticated client.
///
/// Replaced as a whole on renewal, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBundle {
    pub bearer_token: String,
    /// Expiry as epoch seconds. `0` means unknown / no expiry.
    #[serde(default)]
    pub expires_at: u64,
    /// Long-lived token used to obtain the next bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user: UserIdentity,
    /// Opaque state the proof backend wants carried with the credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_backend_state: Option<serde_json::Value>,
}

impl AuthBundle {
    pub fn new(bearer_token: impl Into<String>, expires_in: u64, user: UserIdentity) -> Self {
        let expires_at = if expires_in == 0 { 0 } else { epoch_secs() + expires_in };
        Self {
            bearer_token: bearer_token.into(),
            expires_at,
            refresh_token: None,
            user,
            proof_backend_state: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(epoch_secs())
    }
}

/// Anything the engine persists through a [`CredentialStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoredCredential {
    Auth(AuthBundle),
    OAuth(OAuthSession),
}

impl StoredCredential {
    pub fn into_auth(self) -> Option<AuthBundle> {
        match self {
            Self::Auth(bundle) => Some(bundle),
            Self::OAuth(_) => None,
        }
    }

    pub fn into_oauth(self) -> Option<OAuthSession> {
        match self {
            Self::OAuth(session) => Some(session),
            Self::Auth(_) => None,
        }
    }
}

/// Async key-value persistence for credentials, keyed by account id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, account_id: &str) -> Result<Option<StoredCredential>>;
    async fn set(&self, account_id: &str, value: StoredCredential) -> Result<()>;
}

/// Process-local store, used when nothing should outlive the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, account_id: &str) -> Result<Option<StoredCredential>> {
        Ok(self.entries.read().await.get(account_id).cloned())
    }

    async fn set(&self, account_id: &str, value: StoredCredential) -> Result<()> {
        self.entries.write().await.insert(account_id.to_owned(), value);
        Ok(())
    }
}

/// Store key for the proof backend's OAuth session belonging to `account_id`.
pub fn oauth_session_key(account_id: &str) -> String {
    format!("{account_id}:znca-oauth")
}

/// Current time as epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
