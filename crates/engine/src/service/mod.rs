// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote service protocols.
//!
//! A [`ServiceProtocol`] knows how one service frames request bodies and how
//! it reports success, credential expiry and application errors. The
//! request machinery in [`crate::pipeline`] is shared by all of them.

pub mod coral;
pub mod graphql;
pub mod login;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::Result;
use crate::proof::HashMethod;

pub use coral::CoralProtocol;
pub use graphql::GraphqlProtocol;
pub use login::LoginRenewer;

/// Proof requirement of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofSpec {
    pub hash_method: HashMethod,
    /// Token the proof is bound to. Defaults to the bearer token.
    pub token: Option<String>,
    /// Account id hint. Defaults to the credential's user.
    pub na_id: Option<String>,
}

/// One logical call against a service.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Name used in logs and errors.
    pub name: String,
    pub method: Method,
    /// Path relative to the service's base URL.
    pub path: String,
    pub parameter: Option<Value>,
    pub proof: Option<ProofSpec>,
}

impl Operation {
    pub fn new(method: Method, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self { name: name.into(), method, path: path.into(), parameter: None, proof: None }
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::POST, name, path)
    }

    pub fn parameter(mut self, parameter: Value) -> Self {
        self.parameter = Some(parameter);
        self
    }

    /// Require a proof bound to the bearer token.
    pub fn with_proof(mut self, hash_method: HashMethod) -> Self {
        self.proof = Some(ProofSpec { hash_method, token: None, na_id: None });
        self
    }

    /// Require a proof bound to `token` instead of the bearer token.
    pub fn with_proof_for(
        mut self,
        hash_method: HashMethod,
        token: impl Into<String>,
        na_id: Option<String>,
    ) -> Self {
        self.proof = Some(ProofSpec { hash_method, token: Some(token.into()), na_id });
        self
    }
}

/// How a decoded response was classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        value: Value,
        correlation_id: Option<String>,
    },
    /// The service says the bearer credential must be renewed.
    Expired {
        message: String,
        code: Option<String>,
        correlation_id: Option<String>,
    },
}

pub trait ServiceProtocol: Send + Sync {
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    fn url(&self, operation: &Operation) -> String {
        format!("{}{}", self.base_url().trim_end_matches('/'), operation.path)
    }

    /// Plaintext JSON body for `operation`. `parameter` already carries the
    /// proof fields when the operation needs them.
    fn body(&self, operation: &Operation, parameter: Option<Value>) -> Value;

    /// Whether the body has a `parameter` member the backend can encrypt
    /// together with the proof.
    fn supports_proof_encryption(&self) -> bool {
        false
    }

    /// Classify a decoded response. Transport and application failures are
    /// returned as errors.
    fn classify(&self, status: StatusCode, headers: &HeaderMap, payload: Value) -> Result<Outcome>;
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
