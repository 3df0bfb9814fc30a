// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport-agnostic HTTP exchange used by every outbound call.
//!
//! The engine only needs "send a request, get status/headers/body back,
//! abort if it takes too long". [`ReqwestTransport`] is the production
//! implementation; tests substitute scripted transports.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use client::ReqwestTransport;

use crate::error::{ErrorKind, Result};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
/// `Accept` value sent with encrypted requests.
pub const ACCEPT_ENCRYPTED: &str = "application/octet-stream,application/json";

/// Outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: Vec::new(), body: None }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Set a raw body with the given content type.
    pub fn body(self, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut req = self.header("Content-Type", content_type);
        req.body = Some(body.into());
        req
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ErrorKind::Protocol.error(format!("failed to encode body: {e}")))?;
        Ok(self.body(CONTENT_TYPE_JSON, bytes))
    }

    /// Set a URL-encoded form body.
    pub fn form(self, params: &[(&str, &str)]) -> Self {
        self.body(CONTENT_TYPE_FORM, urlencoded(params))
    }

    /// Case-insensitive header lookup (first match).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// Response as received from the wire.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
    }

    pub fn is_octet_stream(&self) -> bool {
        self.content_type().as_deref() == Some(CONTENT_TYPE_OCTET_STREAM)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Fail with a transport error unless the status is 2xx.
    pub fn error_for_status(self, what: &str) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(ErrorKind::Transport
            .error(format!("{what} failed ({}): {}", self.status, truncate(&self.text(), 512)))
            .with_status(self.status.as_u16()))
    }
}

/// Send-a-request capability. Implementations must abort the exchange once
/// `timeout` elapses and report it as [`ErrorKind::Transport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse>;
}

/// Build a URL-encoded form body string.
pub fn urlencoded(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding(k), urlencoding(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0xf) as usize]));
            }
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
