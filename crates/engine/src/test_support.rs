// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted transports and providers shared by the unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::{ErrorKind, Result};
use crate::proof::{
    EncryptedEnvelope, EncryptionCapable, ProofGenerator, ProofRequest, ProofResult,
};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, CONTENT_TYPE_OCTET_STREAM};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync;

/// Transport that answers every request through a closure and records it.
pub struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Duration,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        Self::with_delay(Duration::ZERO, handler)
    }

    /// Like [`new`](Self::new) but every exchange takes `delay`, so
    /// concurrent callers overlap.
    pub fn with_delay<F>(delay: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        Arc::new(Self { handler: Box::new(handler), requests: Mutex::new(Vec::new()), delay })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of recorded requests whose URL path ends with `suffix`.
    pub fn count(&self, suffix: &str) -> usize {
        self.requests().iter().filter(|r| path_of(&r.url).ends_with(suffix)).count()
    }

    /// Recorded requests whose URL path ends with `suffix`.
    pub fn matching(&self, suffix: &str) -> Vec<HttpRequest> {
        self.requests().into_iter().filter(|r| path_of(&r.url).ends_with(suffix)).collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        if !self.delay.is_zero() {
            if self.delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ErrorKind::Transport.error("request timed out"));
            }
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(&request)
    }
}

/// Path component of `url`, without the query string.
pub fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let path = rest.find('/').map_or("", |i| &rest[i..]);
    path.split('?').next().unwrap_or(path)
}

pub fn json_response(status: u16, body: Value) -> Result<HttpResponse> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(HttpResponse {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        headers,
        body: Bytes::from(body.to_string()),
    })
}

pub fn bytes_response(
    status: u16,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Result<HttpResponse> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    Ok(HttpResponse {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        headers,
        body: body.into(),
    })
}

pub fn octet_response(body: impl Into<Bytes>) -> Result<HttpResponse> {
    bytes_response(200, CONTENT_TYPE_OCTET_STREAM, body)
}

/// Parse the JSON body of a recorded request.
pub fn body_json(request: &HttpRequest) -> Value {
    request.body.as_ref().and_then(|b| serde_json::from_slice(b).ok()).unwrap_or(Value::Null)
}

/// XOR "cipher" with a fixed key.
pub fn xor(data: &[u8], key: u8) -> Vec<u8> {
    data.iter().map(|b| b ^ key).collect()
}

/// Local provider that returns predictable proofs and, when built with
/// [`MockProvider::encrypting`], XOR-encrypts bodies.
pub struct MockProvider {
    encrypting: bool,
    key: u8,
    pub calls: AtomicU32,
}

impl MockProvider {
    pub fn plain() -> Arc<Self> {
        Arc::new(Self { encrypting: false, key: 0, calls: AtomicU32::new(0) })
    }

    pub fn encrypting(key: u8) -> Arc<Self> {
        Arc::new(Self { encrypting: true, key, calls: AtomicU32::new(0) })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProofGenerator for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_proof(&self, request: ProofRequest) -> Result<ProofResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut proof = ProofResult {
            provider_name: self.name().to_owned(),
            hash_method: request.hash_method,
            proof_value: format!("f-{n}-{}", request.hash_method.as_u8()),
            timestamp: 1_700_000_000_000,
            request_nonce: request.request_id,
            encrypted_payload: None,
        };
        if let (true, Some(encrypt)) = (self.encrypting, request.encrypt.as_ref()) {
            let body = serde_json::json!({ "parameter": proof.apply_to(&encrypt.parameter) });
            proof.encrypted_payload = Some(EncryptedEnvelope {
                ciphertext: Bytes::from(xor(body.to_string().as_bytes(), self.key)),
                provenance: self.name().to_owned(),
            });
        }
        Ok(proof)
    }

    fn encryption(&self) -> Option<&dyn EncryptionCapable> {
        self.encrypting.then_some(self as &dyn EncryptionCapable)
    }
}

#[async_trait]
impl EncryptionCapable for MockProvider {
    async fn encrypt_request(
        &self,
        _url: &str,
        _token: Option<&str>,
        plaintext: &[u8],
    ) -> Result<EncryptedEnvelope> {
        Ok(EncryptedEnvelope {
            ciphertext: Bytes::from(xor(plaintext, self.key)),
            provenance: self.name().to_owned(),
        })
    }

    async fn decrypt_response(&self, ciphertext: &[u8]) -> Result<Bytes> {
        Ok(Bytes::from(xor(ciphertext, self.key)))
    }
}
