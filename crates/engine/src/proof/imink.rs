// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless third-party backend: one JSON POST per proof.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    now_millis, post_proof, proof_body, BackendContext, ProofGenerator, ProofRequest, ProofResult,
};
use crate::error::Result;
use crate::transport::{HttpRequest, HttpTransport};

pub const DEFAULT_URL: &str = "https://api.imink.app/f";

pub struct IminkProvider {
    url: String,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl IminkProvider {
    pub fn new(ctx: &BackendContext) -> Self {
        Self {
            url: ctx.imink_url.clone(),
            transport: Arc::clone(&ctx.transport),
            timeout: ctx.timeout,
        }
    }
}

#[async_trait]
impl ProofGenerator for IminkProvider {
    fn name(&self) -> &str {
        "imink"
    }

    async fn generate_proof(&self, request: ProofRequest) -> Result<ProofResult> {
        let timestamp = now_millis();
        let body = Value::Object(proof_body(&request, timestamp));
        let http = HttpRequest::post(&self.url)
            .json(&body)
            .map_err(|e| e.into_proof_error(self.name()))?;

        tracing::debug!(
            provider = "imink",
            hash_method = request.hash_method.as_u8(),
            "requesting proof"
        );
        post_proof(self.name(), self.transport.as_ref(), self.timeout, http, &request, timestamp)
            .await
    }
}
