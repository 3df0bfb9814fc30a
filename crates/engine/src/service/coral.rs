// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account/social backend.
//!
//! Every response is `{status, result?, errorMessage?, correlationId?}`
//! with HTTP 200. `status` 0 is success and 9404 means the bearer token
//! expired; anything else is an application error.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{Operation, Outcome, ServiceProtocol};
use crate::error::{ErrorKind, Result};
use crate::transport::truncate;

pub const DEFAULT_URL: &str = "https://api-lp1.znc.srv.nintendo.net";

pub const STATUS_OK: i64 = 0;
pub const STATUS_TOKEN_EXPIRED: i64 = 9404;

#[derive(Debug, Clone)]
pub struct CoralProtocol {
    base_url: String,
}

impl CoralProtocol {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl Default for CoralProtocol {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl ServiceProtocol for CoralProtocol {
    fn name(&self) -> &str {
        "coral"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body(&self, _operation: &Operation, parameter: Option<Value>) -> Value {
        json!({ "parameter": parameter.unwrap_or_else(|| json!({})) })
    }

    fn supports_proof_encryption(&self) -> bool {
        true
    }

    fn classify(
        &self,
        status: StatusCode,
        _headers: &HeaderMap,
        payload: Value,
    ) -> Result<Outcome> {
        let correlation_id =
            payload.get("correlationId").and_then(Value::as_str).map(str::to_owned);
        if !status.is_success() {
            return Err(ErrorKind::Transport
                .error(format!(
                    "unexpected HTTP status {status}: {}",
                    truncate(&payload.to_string(), 256)
                ))
                .with_status(status.as_u16())
                .with_correlation_id(correlation_id));
        }

        let code = payload.get("status").and_then(Value::as_i64).ok_or_else(|| {
            ErrorKind::Protocol
                .error("response has no numeric status")
                .with_status(status.as_u16())
                .with_correlation_id(correlation_id.clone())
        })?;
        let message = payload
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_owned();

        match code {
            STATUS_OK => Ok(Outcome::Success {
                value: payload.get("result").cloned().unwrap_or(Value::Null),
                correlation_id,
            }),
            STATUS_TOKEN_EXPIRED => {
                Ok(Outcome::Expired { message, code: Some(code.to_string()), correlation_id })
            }
            _ => Err(ErrorKind::Application
                .error(message)
                .with_status(status.as_u16())
                .with_code(code.to_string())
                .with_correlation_id(correlation_id)),
        }
    }
}
