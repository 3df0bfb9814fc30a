// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Anti-abuse proof ("f") generation.
//!
//! Every backend implements [`ProofGenerator`]. Backends that can also
//! encrypt request bodies and decrypt responses expose that through
//! [`ProofGenerator::encryption`]; callers discover it with
//! [`encryption_capability`] instead of assuming it.

pub mod flapg;
pub mod imink;
pub mod nxapi;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::credential::{oauth_session_key, CredentialStore, StoredCredential};
use crate::error::{ErrorKind, Result};
use crate::oauth::{ClientAuthConfig, OAuthClientAuthenticator};
use crate::transport::{truncate, HttpRequest, HttpTransport};

pub use flapg::FlapgProvider;
pub use imink::IminkProvider;
pub use nxapi::NxapiProvider;

pub const PLATFORM_HEADER: &str = "X-znca-Platform";
pub const VERSION_HEADER: &str = "X-znca-Version";

/// Which token the proof is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum HashMethod {
    /// Account login, bound to the account's id token.
    Login,
    /// Web service token request, bound to the service bearer token.
    WebService,
}

impl HashMethod {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Login => 1,
            Self::WebService => 2,
        }
    }
}

impl From<HashMethod> for u8 {
    fn from(method: HashMethod) -> u8 {
        method.as_u8()
    }
}

impl TryFrom<u8> for HashMethod {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            1 => Ok(Self::Login),
            2 => Ok(Self::WebService),
            other => Err(format!("unknown hash method {other}")),
        }
    }
}

/// Plaintext a backend may encrypt server-side alongside the proof.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptTokenRequest {
    /// URL the encrypted body will be sent to.
    pub url: String,
    /// The `parameter` object, without the proof fields.
    pub parameter: Value,
}

/// Input to one proof generation. Never reused across calls.
#[derive(Debug, Clone)]
pub struct ProofRequest {
    pub token: String,
    pub hash_method: HashMethod,
    /// Account id hint.
    pub na_id: Option<String>,
    /// Service user id hint.
    pub coral_user_id: Option<String>,
    /// Caller-chosen nonce echoed back by the backend.
    pub request_id: String,
    pub encrypt: Option<EncryptTokenRequest>,
}

impl ProofRequest {
    pub fn new(token: impl Into<String>, hash_method: HashMethod) -> Self {
        Self {
            token: token.into(),
            hash_method,
            na_id: None,
            coral_user_id: None,
            request_id: uuid::Uuid::new_v4().to_string(),
            encrypt: None,
        }
    }
}

/// Ciphertext plus the provider that produced it (and must decrypt the reply).
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub ciphertext: Bytes,
    pub provenance: String,
}

impl fmt::Debug for EncryptedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedEnvelope")
            .field("len", &self.ciphertext.len())
            .field("provenance", &self.provenance)
            .finish()
    }
}

/// A generated proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProofResult {
    pub provider_name: String,
    pub hash_method: HashMethod,
    #[serde(rename = "f")]
    pub proof_value: String,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    #[serde(rename = "request_id")]
    pub request_nonce: String,
    #[serde(skip)]
    pub encrypted_payload: Option<EncryptedEnvelope>,
}

impl ProofResult {
    /// `parameter` with `f`, `timestamp` and `requestId` filled in.
    pub fn apply_to(&self, parameter: &Value) -> Value {
        let mut out = match parameter {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        out.insert("f".into(), json!(self.proof_value));
        out.insert("timestamp".into(), json!(self.timestamp));
        out.insert("requestId".into(), json!(self.request_nonce));
        Value::Object(out)
    }
}

#[async_trait]
pub trait ProofGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_proof(&self, request: ProofRequest) -> Result<ProofResult>;

    fn encryption(&self) -> Option<&dyn EncryptionCapable> {
        None
    }
}

/// Request/response encryption offered by some backends.
#[async_trait]
pub trait EncryptionCapable: Send + Sync {
    async fn encrypt_request(
        &self,
        url: &str,
        token: Option<&str>,
        plaintext: &[u8],
    ) -> Result<EncryptedEnvelope>;

    async fn decrypt_response(&self, ciphertext: &[u8]) -> Result<Bytes>;
}

pub fn encryption_capability(provider: &dyn ProofGenerator) -> Option<&dyn EncryptionCapable> {
    provider.encryption()
}

/// Known backend ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendId {
    Imink,
    Flapg,
    Nxapi,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imink => "imink",
            Self::Flapg => "flapg",
            Self::Nxapi => "nxapi",
        }
    }
}

impl FromStr for BackendId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imink" => Ok(Self::Imink),
            "flapg" => Ok(Self::Flapg),
            "nxapi" | "nxapi-znca-api" => Ok(Self::Nxapi),
            other => Err(ErrorKind::Config.error(format!("unknown proof backend: {other}"))),
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend choice: a known id, or the URL of a self-hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelector {
    Id(BackendId),
    Url(String),
}

impl FromStr for BackendSelector {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("https://") || s.starts_with("http://") {
            return Ok(Self::Url(s.trim_end_matches('/').to_owned()));
        }
        s.parse().map(Self::Id)
    }
}

/// Everything backends need besides the choice itself.
#[derive(Clone)]
pub struct BackendContext {
    pub transport: Arc<dyn HttpTransport>,
    pub timeout: Duration,
    pub imink_url: String,
    pub flapg_url: String,
    /// Default self-hosted URL when `nxapi` is chosen by id.
    pub nxapi_url: Option<String>,
    pub client_auth: ClientAuthConfig,
    pub platform: String,
    pub app_version: Option<String>,
    /// Account whose OAuth session is persisted in `store`.
    pub account_id: Option<String>,
    pub store: Option<Arc<dyn CredentialStore>>,
}

/// Build the proof backend for a client.
///
/// `preference` wins over `default`. The result is fixed for the client's
/// lifetime. For the self-hosted backend a persisted OAuth session is
/// restored when a store and account are given.
pub async fn select_backend(
    preference: Option<&BackendSelector>,
    default: &BackendSelector,
    ctx: &BackendContext,
) -> Result<Arc<dyn ProofGenerator>> {
    let selector = preference.unwrap_or(default);
    let nxapi_url = match selector {
        BackendSelector::Id(BackendId::Imink) => {
            tracing::debug!(url = %ctx.imink_url, "using imink proof backend");
            return Ok(Arc::new(IminkProvider::new(ctx)));
        }
        BackendSelector::Id(BackendId::Flapg) => {
            tracing::debug!(url = %ctx.flapg_url, "using flapg proof backend");
            return Ok(Arc::new(FlapgProvider::new(ctx)));
        }
        BackendSelector::Id(BackendId::Nxapi) => ctx.nxapi_url.clone().ok_or_else(|| {
            ErrorKind::Config.error("nxapi proof backend selected without an endpoint URL")
        })?,
        BackendSelector::Url(url) => url.clone(),
    };

    let mut auth = OAuthClientAuthenticator::new(
        nxapi_url.clone(),
        Arc::clone(&ctx.transport),
        ctx.timeout,
        ctx.client_auth.clone(),
    );
    if let (Some(store), Some(account)) = (&ctx.store, &ctx.account_id) {
        let key = oauth_session_key(account);
        match store.get(&key).await {
            Ok(Some(StoredCredential::OAuth(session))) => auth.restore(session),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(account = %account, err = %e, "failed to load proof backend session")
            }
        }
        auth = auth.with_store(Arc::clone(store), key);
    }
    tracing::debug!(url = %nxapi_url, "using self-hosted proof backend");
    Ok(Arc::new(NxapiProvider::new(nxapi_url, auth, ctx)))
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Proof response shared by every backend.
#[derive(Debug, Deserialize)]
pub(crate) struct ProofResponse {
    pub f: String,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub encrypted_token_request: Option<String>,
}

/// JSON body common to the proof endpoints.
pub(crate) fn proof_body(request: &ProofRequest, timestamp: u64) -> serde_json::Map<String, Value> {
    let mut body = serde_json::Map::new();
    body.insert("hash_method".into(), json!(request.hash_method.as_u8()));
    body.insert("token".into(), json!(request.token));
    body.insert("timestamp".into(), json!(timestamp));
    body.insert("request_id".into(), json!(request.request_id));
    body
}

/// POST a proof request to a stateless backend and parse the reply.
pub(crate) async fn post_proof(
    provider: &str,
    transport: &dyn HttpTransport,
    timeout: Duration,
    request: HttpRequest,
    proof: &ProofRequest,
    timestamp: u64,
) -> Result<ProofResult> {
    let resp = transport.send(request, timeout).await.map_err(|e| e.into_proof_error(provider))?;
    let status = resp.status.as_u16();
    if !resp.status.is_success() {
        return Err(ErrorKind::ProofGeneration
            .error(format!(
                "proof request failed ({}): {}",
                resp.status,
                truncate(&resp.text(), 256)
            ))
            .with_status(status)
            .with_provider(provider));
    }
    let parsed: ProofResponse = resp.json().map_err(|e| {
        ErrorKind::ProofGeneration
            .error(format!("invalid proof response: {e}"))
            .with_status(status)
            .with_provider(provider)
    })?;
    Ok(ProofResult {
        provider_name: provider.to_owned(),
        hash_method: proof.hash_method,
        proof_value: parsed.f,
        timestamp: parsed.timestamp.unwrap_or(timestamp),
        request_nonce: parsed.request_id.unwrap_or_else(|| proof.request_id.clone()),
        encrypted_payload: None,
    })
}

#[cfg(test)]
#[path = "proof_tests.rs"]
mod tests;
