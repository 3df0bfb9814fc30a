// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless third-party backend that also takes identity hints and the
//! client's platform/version.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    now_millis, post_proof, proof_body, BackendContext, ProofGenerator, ProofRequest, ProofResult,
    PLATFORM_HEADER, VERSION_HEADER,
};
use crate::error::Result;
use crate::transport::{HttpRequest, HttpTransport};

pub const DEFAULT_URL: &str = "https://flapg.com/ika/api/login-main";

pub struct FlapgProvider {
    url: String,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    platform: String,
    app_version: Option<String>,
}

impl FlapgProvider {
    pub fn new(ctx: &BackendContext) -> Self {
        Self {
            url: ctx.flapg_url.clone(),
            transport: Arc::clone(&ctx.transport),
            timeout: ctx.timeout,
            platform: ctx.platform.clone(),
            app_version: ctx.app_version.clone(),
        }
    }
}

#[async_trait]
impl ProofGenerator for FlapgProvider {
    fn name(&self) -> &str {
        "flapg"
    }

    async fn generate_proof(&self, request: ProofRequest) -> Result<ProofResult> {
        let timestamp = now_millis();
        let mut body = proof_body(&request, timestamp);
        if let Some(ref na_id) = request.na_id {
            body.insert("na_id".into(), json!(na_id));
        }
        if let Some(ref user_id) = request.coral_user_id {
            body.insert("coral_user_id".into(), json!(user_id));
        }

        let mut http = HttpRequest::post(&self.url).header(PLATFORM_HEADER, &self.platform);
        if let Some(ref version) = self.app_version {
            http = http.header(VERSION_HEADER, version);
        }
        let http = http.json(&Value::Object(body)).map_err(|e| e.into_proof_error(self.name()))?;

        tracing::debug!(
            provider = "flapg",
            hash_method = request.hash_method.as_u8(),
            "requesting proof"
        );
        post_proof(self.name(), self.transport.as_ref(), self.timeout, http, &request, timestamp)
            .await
    }
}
