// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `reqwest`-backed [`HttpTransport`].

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{ErrorKind, Result};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// HTTP transport over a shared connection pool.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Self {
        ensure_crypto();
        let client = Client::builder().user_agent(user_agent).build().unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await.map_err(|e| {
            ErrorKind::Transport.error(format!("request to {} failed: {e}", request.url))
        })?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(|e| {
            ErrorKind::Transport
                .error(format!("reading response from {} failed: {e}", request.url))
                .with_status(status.as_u16())
        })?;
        Ok(HttpResponse { status, headers, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse> {
        let url = request.url.clone();
        tracing::debug!(method = %request.method, url = %url, "sending request");
        // Dropping the exchange future on timeout closes the connection.
        match tokio::time::timeout(timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(ErrorKind::Transport
                .error(format!("request to {url} timed out after {}ms", timeout.as_millis()))),
        }
    }
}
