// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-hosted backend.
//!
//! Protected by its own OAuth client ([`OAuthClientAuthenticator`]) and able
//! to encrypt request bodies and decrypt responses. A proof request may
//! carry the request's `parameter` so the backend returns the encrypted body
//! together with the proof.
//!
//! A `401 invalid_token` from any endpoint drops the cached access token and
//! repeats that one call once. This retry is local to the provider and does
//! not count against the caller's own retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};

use super::{
    now_millis, proof_body, BackendContext, EncryptedEnvelope, EncryptionCapable, ProofGenerator,
    ProofRequest, ProofResponse, ProofResult, PLATFORM_HEADER, VERSION_HEADER,
};
use crate::error::{ErrorKind, Result};
use crate::oauth::token::parse_error;
use crate::oauth::OAuthClientAuthenticator;
use crate::transport::{
    truncate, HttpRequest, HttpResponse, HttpTransport, CONTENT_TYPE_OCTET_STREAM,
};

const NAME: &str = "nxapi";

pub struct NxapiProvider {
    base_url: String,
    auth: OAuthClientAuthenticator,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    platform: String,
    app_version: Option<String>,
}

impl NxapiProvider {
    pub fn new(
        base_url: impl Into<String>,
        auth: OAuthClientAuthenticator,
        ctx: &BackendContext,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth,
            transport: Arc::clone(&ctx.transport),
            timeout: ctx.timeout,
            platform: ctx.platform.clone(),
            app_version: ctx.app_version.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn authenticator(&self) -> &OAuthClientAuthenticator {
        &self.auth
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Send `build()` with the current access token, retrying once
    /// with a fresh token if the backend rejects it as `invalid_token`.
    async fn send_authorized<F>(&self, what: &str, build: F) -> Result<HttpResponse>
    where
        F: Fn() -> Result<HttpRequest>,
    {
        let mut retried = false;
        loop {
            let token = self.auth.ensure_valid().await?;
            let resp = self.transport.send(build()?.bearer_auth(&token), self.timeout).await?;
            if resp.status.is_success() {
                return Ok(resp);
            }

            let status = resp.status.as_u16();
            let err = match parse_error(&resp) {
                Some(oauth) => oauth.into_error(status, what),
                None => ErrorKind::ProofGeneration
                    .error(format!(
                        "{what} failed ({}): {}",
                        resp.status,
                        truncate(&resp.text(), 256)
                    ))
                    .with_status(status),
            };
            if status == 401 && err.is(ErrorKind::InvalidToken) && !retried {
                tracing::warn!(
                    provider = NAME,
                    what,
                    "access token rejected, retrying with a new one"
                );
                self.auth.invalidate(&token);
                retried = true;
                continue;
            }
            return Err(err);
        }
    }

    async fn proof(&self, request: &ProofRequest) -> Result<ProofResult> {
        let timestamp = now_millis();
        let mut body = proof_body(request, timestamp);
        if let Some(ref na_id) = request.na_id {
            body.insert("na_id".into(), json!(na_id));
        }
        if let Some(ref user_id) = request.coral_user_id {
            body.insert("coral_user_id".into(), json!(user_id));
        }
        if let Some(ref encrypt) = request.encrypt {
            body.insert(
                "encrypt_token_request".into(),
                json!({ "url": encrypt.url, "parameter": encrypt.parameter }),
            );
        }
        let body = Value::Object(body);
        let url = self.endpoint("f");

        let resp = self
            .send_authorized("proof request", || {
                let mut http = HttpRequest::post(&url).header(PLATFORM_HEADER, &self.platform);
                if let Some(ref version) = self.app_version {
                    http = http.header(VERSION_HEADER, version);
                }
                http.json(&body)
            })
            .await?;

        let status = resp.status.as_u16();
        let parsed: ProofResponse = resp.json().map_err(|e| {
            ErrorKind::ProofGeneration
                .error(format!("invalid proof response: {e}"))
                .with_status(status)
        })?;
        let encrypted_payload = match parsed.encrypted_token_request {
            Some(encoded) => Some(EncryptedEnvelope {
                ciphertext: Bytes::from(STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    ErrorKind::ProofGeneration
                        .error(format!("invalid encrypted_token_request: {e}"))
                })?),
                provenance: NAME.to_owned(),
            }),
            None => None,
        };

        Ok(ProofResult {
            provider_name: NAME.to_owned(),
            hash_method: request.hash_method,
            proof_value: parsed.f,
            timestamp: parsed.timestamp.unwrap_or(timestamp),
            request_nonce: parsed.request_id.unwrap_or_else(|| request.request_id.clone()),
            encrypted_payload,
        })
    }
}

#[async_trait]
impl ProofGenerator for NxapiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn generate_proof(&self, request: ProofRequest) -> Result<ProofResult> {
        tracing::debug!(
            provider = NAME,
            hash_method = request.hash_method.as_u8(),
            encrypt = request.encrypt.is_some(),
            "requesting proof"
        );
        self.proof(&request).await.map_err(|e| e.into_proof_error(NAME))
    }

    fn encryption(&self) -> Option<&dyn EncryptionCapable> {
        Some(self as &dyn EncryptionCapable)
    }
}

#[async_trait]
impl EncryptionCapable for NxapiProvider {
    async fn encrypt_request(
        &self,
        url: &str,
        token: Option<&str>,
        plaintext: &[u8],
    ) -> Result<EncryptedEnvelope> {
        let data = std::str::from_utf8(plaintext).map_err(|e| {
            ErrorKind::ProofGeneration
                .error(format!("request body is not UTF-8: {e}"))
                .with_provider(NAME)
        })?;
        let body = json!({ "url": url, "token": token, "data": data });
        let endpoint = self.endpoint("encrypt-request");

        let resp = self
            .send_authorized("encrypt request", || {
                HttpRequest::post(&endpoint).header("Accept", CONTENT_TYPE_OCTET_STREAM).json(&body)
            })
            .await
            .map_err(|e| e.into_proof_error(NAME))?;

        if !resp.is_octet_stream() {
            return Err(ErrorKind::ProofGeneration
                .error(format!("encrypt request returned {:?}", resp.content_type()))
                .with_status(resp.status.as_u16())
                .with_provider(NAME));
        }
        Ok(EncryptedEnvelope { ciphertext: resp.body, provenance: NAME.to_owned() })
    }

    async fn decrypt_response(&self, ciphertext: &[u8]) -> Result<Bytes> {
        let body = json!({ "data": STANDARD.encode(ciphertext) });
        let endpoint = self.endpoint("decrypt-response");

        let resp = self
            .send_authorized("decrypt response", || {
                HttpRequest::post(&endpoint)
                    .header("Accept", "text/plain, application/json")
                    .json(&body)
            })
            .await
            .map_err(|e| e.into_proof_error(NAME))?;
        Ok(resp.body)
    }
}

#[cfg(test)]
#[path = "nxapi_tests.rs"]
mod tests;
