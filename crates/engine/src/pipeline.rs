// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request pipeline.
//!
//! [`Channel`] performs one transmission: proof, body, optional encryption,
//! send, decode, classify. [`Client`] wraps it with the credential
//! lifecycle and retries a call at most once after the service reports the
//! credential expired.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;

use crate::credential::AuthBundle;
use crate::error::{Error, ErrorKind, Result};
use crate::events::{CredentialEvent, EventHub};
use crate::flags::{RequestFlags, RequestIdPlacement};
use crate::lifecycle::TokenLifecycle;
use crate::proof::{
    encryption_capability, EncryptTokenRequest, EncryptionCapable, ProofGenerator, ProofRequest,
};
use crate::response::Response;
use crate::service::{Operation, Outcome, ServiceProtocol};
use crate::transport::{
    truncate, HttpRequest, HttpTransport, ACCEPT_ENCRYPTED, CONTENT_TYPE_JSON,
    CONTENT_TYPE_OCTET_STREAM,
};

pub const PLATFORM_HEADER: &str = "X-Platform";
pub const VERSION_HEADER: &str = "X-ProductVersion";

/// Transmissions per logical call: the first plus one retry after renewal.
const MAX_ATTEMPTS: u32 = 2;

/// Values for the client identification headers.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub platform: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self { platform: "Android".into(), version: "2.10.1".into() }
    }
}

/// The classified result of one transmission.
#[derive(Debug)]
pub struct Attempt {
    pub outcome: Outcome,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// One service, one proof backend, one transport.
pub struct Channel {
    service: Arc<dyn ServiceProtocol>,
    provider: Arc<dyn ProofGenerator>,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    client: ClientInfo,
}

impl Channel {
    pub fn new(
        service: Arc<dyn ServiceProtocol>,
        provider: Arc<dyn ProofGenerator>,
        transport: Arc<dyn HttpTransport>,
        timeout: Duration,
        client: ClientInfo,
    ) -> Self {
        Self { service, provider, transport, timeout, client }
    }

    pub fn service(&self) -> &Arc<dyn ServiceProtocol> {
        &self.service
    }

    pub fn provider(&self) -> &Arc<dyn ProofGenerator> {
        &self.provider
    }

    /// Send `operation` once and classify the response.
    pub async fn attempt(
        &self,
        operation: &Operation,
        flags: &RequestFlags,
        credential: Option<&AuthBundle>,
    ) -> Result<Attempt> {
        let url = self.service.url(operation);
        let encryption =
            if flags.encryption { encryption_capability(self.provider.as_ref()) } else { None };

        let mut parameter = operation.parameter.clone();
        let mut pre_encrypted = None;
        let mut request_id = None;
        if let Some(ref spec) = operation.proof {
            let token = match (&spec.token, credential) {
                (Some(token), _) => token.clone(),
                (None, Some(bundle)) => bundle.bearer_token.clone(),
                (None, None) => {
                    return Err(ErrorKind::NotAuthenticated.error("proof requires a credential"));
                }
            };
            let mut proof_request = ProofRequest::new(token, spec.hash_method);
            proof_request.na_id =
                spec.na_id.clone().or_else(|| credential.and_then(|b| b.user.na_id.clone()));
            proof_request.coral_user_id =
                credential.map(|b| b.user.id.clone()).filter(|id| !id.is_empty());
            let server_side = encryption.is_some()
                && self.service.supports_proof_encryption()
                && flags.request_id == RequestIdPlacement::None;
            if server_side {
                proof_request.encrypt = Some(EncryptTokenRequest {
                    url: url.clone(),
                    parameter: parameter.clone().unwrap_or_else(|| json!({})),
                });
            }

            let proof = self.provider.generate_proof(proof_request).await?;
            parameter = Some(proof.apply_to(&parameter.unwrap_or_else(|| json!({}))));
            request_id = Some(proof.request_nonce.clone());
            pre_encrypted = proof.encrypted_payload;
        }

        let mut body = self.service.body(operation, parameter);
        if flags.request_id != RequestIdPlacement::None {
            let id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            body = place_request_id(body, flags.request_id, id);
        }

        let bearer = match (flags.authenticate, credential) {
            (true, Some(bundle)) => Some(bundle.bearer_token.as_str()),
            (true, None) => {
                return Err(ErrorKind::NotAuthenticated.error("no credential available"));
            }
            (false, _) => None,
        };
        let mut request = HttpRequest::new(operation.method.clone(), url.as_str());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if flags.platform_header {
            request = request.header(PLATFORM_HEADER, &self.client.platform);
        }
        if flags.version_header {
            request = request.header(VERSION_HEADER, &self.client.version);
        }

        request = match encryption {
            Some(enc) => {
                let envelope = match pre_encrypted {
                    Some(envelope) => envelope,
                    None => {
                        let plaintext = serde_json::to_vec(&body)?;
                        enc.encrypt_request(&url, bearer, &plaintext).await?
                    }
                };
                if envelope.provenance != self.provider.name() {
                    return Err(ErrorKind::Protocol.error(format!(
                        "request encrypted by {} but {} is active",
                        envelope.provenance,
                        self.provider.name()
                    )));
                }
                request
                    .header("Accept", ACCEPT_ENCRYPTED)
                    .body(CONTENT_TYPE_OCTET_STREAM, envelope.ciphertext)
            }
            None => request.header("Accept", CONTENT_TYPE_JSON).json(&body)?,
        };

        tracing::debug!(
            service = self.service.name(),
            operation = %operation.name,
            encrypted = encryption.is_some(),
            "sending request"
        );
        let resp = self.transport.send(request, self.timeout).await?;
        let status = resp.status;

        let plain = if resp.is_octet_stream() {
            self.decrypt(&resp.body).await?
        } else {
            resp.body.clone()
        };
        let payload = match serde_json::from_slice::<Value>(&plain) {
            Ok(value) => value,
            Err(e) if status.is_success() => {
                return Err(ErrorKind::Protocol
                    .error(format!("invalid JSON response: {e}"))
                    .with_status(status.as_u16()));
            }
            // Non-2xx bodies that are not JSON are passed on as text; the
            // service decides between expiry and transport failure.
            Err(_) => Value::String(truncate(&String::from_utf8_lossy(&plain), 512).to_owned()),
        };

        let outcome = self.service.classify(status, &resp.headers, payload)?;
        Ok(Attempt { outcome, status, headers: resp.headers })
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Bytes> {
        let enc: &dyn EncryptionCapable = encryption_capability(self.provider.as_ref())
            .ok_or_else(|| {
                ErrorKind::Protocol.error(format!(
                    "encrypted response but {} cannot decrypt",
                    self.provider.name()
                ))
            })?;
        enc.decrypt_response(ciphertext).await
    }
}

/// Insert `requestId` next to the body's `parameter` member.
fn place_request_id(body: Value, placement: RequestIdPlacement, id: String) -> Value {
    let Value::Object(map) = body else {
        return body;
    };
    let has_parameter = map.contains_key("parameter");
    let mut out = Map::with_capacity(map.len() + 1);
    let mut id = Some(Value::String(id));
    if placement == RequestIdPlacement::BeforeBody && !has_parameter {
        if let Some(v) = id.take() {
            out.insert("requestId".into(), v);
        }
    }
    for (key, value) in map {
        let is_parameter = key == "parameter";
        if is_parameter && placement == RequestIdPlacement::BeforeBody {
            if let Some(v) = id.take() {
                out.insert("requestId".into(), v);
            }
        }
        out.insert(key, value);
        if is_parameter && placement == RequestIdPlacement::AfterBody {
            if let Some(v) = id.take() {
                out.insert("requestId".into(), v);
            }
        }
    }
    if let Some(v) = id.take() {
        out.insert("requestId".into(), v);
    }
    Value::Object(out)
}

/// An authenticated client: one credential, one proof backend, one service.
pub struct Client {
    channel: Channel,
    lifecycle: TokenLifecycle,
    events: EventHub,
}

impl Client {
    pub fn new(channel: Channel, lifecycle: TokenLifecycle, events: EventHub) -> Self {
        Self { channel, lifecycle, events }
    }

    pub fn account_id(&self) -> &str {
        self.lifecycle.account_id()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn lifecycle(&self) -> &TokenLifecycle {
        &self.lifecycle
    }

    pub fn current(&self) -> Option<Arc<AuthBundle>> {
        self.lifecycle.current()
    }

    /// Credential lifecycle events for this client.
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events.subscribe()
    }

    /// Renew now, or join a renewal already running.
    pub async fn renew(&self) -> Result<Arc<AuthBundle>> {
        self.lifecycle.renew().await
    }

    /// Execute `operation`, renewing the credential and retrying once if the
    /// service reports it expired.
    pub async fn execute(
        &self,
        operation: &Operation,
        flags: RequestFlags,
    ) -> Result<Response<Value>> {
        let provider = self.channel.provider().name().to_owned();
        let context = |e: Error| e.with_operation(&operation.name).with_provider(&provider);

        let mut attempt = 1;
        loop {
            let credential = if flags.authenticate {
                Some(self.credential(&flags).await.map_err(context)?)
            } else {
                None
            };
            let result = self
                .channel
                .attempt(operation, &flags, credential.as_deref())
                .await
                .map_err(context)?;

            match result.outcome {
                Outcome::Success { value, correlation_id } => {
                    return Ok(Response {
                        value,
                        status: result.status,
                        headers: result.headers,
                        correlation_id,
                    });
                }
                Outcome::Expired { message, code, correlation_id } => {
                    if let Some(ref bundle) = credential {
                        self.lifecycle.mark_expired(bundle);
                    }
                    if attempt < MAX_ATTEMPTS && flags.auto_renew && credential.is_some() {
                        tracing::info!(
                            account = %self.lifecycle.account_id(),
                            operation = %operation.name,
                            attempt,
                            "credential expired, renewing and retrying"
                        );
                        attempt += 1;
                        continue;
                    }

                    let mut err = ErrorKind::CredentialExpired
                        .error(message)
                        .with_status(result.status.as_u16())
                        .with_correlation_id(correlation_id);
                    if let Some(code) = code {
                        err = err.with_code(code);
                    }
                    return Err(context(err));
                }
            }
        }
    }

    /// [`execute`](Self::execute) and deserialize the value.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        operation: &Operation,
        flags: RequestFlags,
    ) -> Result<Response<T>> {
        self.execute(operation, flags).await?.deserialize()
    }

    async fn credential(&self, flags: &RequestFlags) -> Result<Arc<AuthBundle>> {
        if flags.auto_renew {
            return self.lifecycle.ensure_valid().await;
        }
        self.lifecycle
            .settled()
            .await?
            .ok_or_else(|| ErrorKind::NotAuthenticated.error("no credential and renewal disabled"))
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
