// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted-query GraphQL service.
//!
//! Queries are sent by hash only. HTTP 401 means the bearer token expired;
//! a non-empty `errors` array is an application error.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{Operation, Outcome, ServiceProtocol};
use crate::error::{ErrorKind, Result};
use crate::persisted_query::PersistedQueryResolver;
use crate::transport::truncate;

pub const GRAPHQL_PATH: &str = "/api/graphql";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct GraphqlProtocol {
    base_url: String,
    resolver: Arc<PersistedQueryResolver>,
}

impl GraphqlProtocol {
    pub fn new(base_url: impl Into<String>, resolver: Arc<PersistedQueryResolver>) -> Self {
        Self { base_url: base_url.into(), resolver }
    }

    pub fn resolver(&self) -> &PersistedQueryResolver {
        &self.resolver
    }

    /// Build the operation for persisted query `query_id`, upgraded through
    /// the resolver.
    pub fn query(&self, query_id: &str, variables: Value) -> Result<Operation> {
        let resolved = self.resolver.resolve(query_id)?;
        if resolved != query_id {
            tracing::debug!(from = %query_id, to = %resolved, "upgraded persisted query");
        }
        let body = json!({
            "variables": variables,
            "extensions": {
                "persistedQuery": { "version": 1, "sha256Hash": resolved },
            },
        });
        Ok(Operation::post(resolved, GRAPHQL_PATH).parameter(body))
    }
}

impl ServiceProtocol for GraphqlProtocol {
    fn name(&self) -> &str {
        "graphql"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body(&self, _operation: &Operation, parameter: Option<Value>) -> Value {
        parameter.unwrap_or_else(|| json!({}))
    }

    fn classify(&self, status: StatusCode, headers: &HeaderMap, payload: Value) -> Result<Outcome> {
        let correlation_id =
            headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_owned);
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Outcome::Expired {
                message: "bearer token rejected".into(),
                code: Some(status.as_u16().to_string()),
                correlation_id,
            });
        }
        if !status.is_success() {
            return Err(ErrorKind::Transport
                .error(format!(
                    "unexpected HTTP status {status}: {}",
                    truncate(&payload.to_string(), 256)
                ))
                .with_status(status.as_u16())
                .with_correlation_id(correlation_id));
        }

        if let Some(first) = payload.get("errors").and_then(Value::as_array).and_then(|e| e.first())
        {
            let message = first.get("message").and_then(Value::as_str).unwrap_or("GraphQL error");
            let mut err = ErrorKind::Application
                .error(message)
                .with_status(status.as_u16())
                .with_correlation_id(correlation_id);
            if let Some(code) = first.pointer("/extensions/code").and_then(Value::as_str) {
                err = err.with_code(code);
            }
            return Err(err);
        }

        match payload.get("data") {
            Some(data) => Ok(Outcome::Success { value: data.clone(), correlation_id }),
            None => Err(ErrorKind::Protocol
                .error("GraphQL response has neither data nor errors")
                .with_status(status.as_u16())
                .with_correlation_id(correlation_id)),
        }
    }
}
