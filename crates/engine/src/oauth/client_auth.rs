// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client authentication for the token endpoint.
//!
//! Priority: client secret, pre-built assertion, public client id,
//! signing callback. The first configured one wins.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};
use crate::transport::urlencoding;

pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// A client assertion and its type URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAssertion {
    pub assertion: String,
    pub assertion_type: String,
}

/// Produces a client assertion for the given audience on demand.
#[async_trait]
pub trait AssertionSigner: Send + Sync {
    async fn sign(&self, audience: &str) -> Result<ClientAssertion>;
}

/// Raw client authentication inputs, as configured.
#[derive(Clone, Default)]
pub struct ClientAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub assertion: Option<ClientAssertion>,
    pub signer: Option<Arc<dyn AssertionSigner>>,
}

impl fmt::Debug for ClientAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("assertion", &self.assertion.as_ref().map(|_| "<redacted>"))
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

/// Which strategy produced a session (persisted alongside it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    ClientSecret,
    ClientAssertion,
    PublicClient,
    SignedAssertion,
}

/// The selected client authentication strategy.
#[derive(Clone)]
pub enum ClientAuthStrategy {
    Secret { client_id: String, client_secret: String },
    Assertion { client_id: Option<String>, assertion: ClientAssertion },
    Public { client_id: String },
    Signer { client_id: Option<String>, signer: Arc<dyn AssertionSigner> },
}

impl fmt::Debug for ClientAuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientAuthStrategy::{:?}", self.method())
    }
}

impl ClientAuthConfig {
    /// Pick a strategy, or fail with the resource's documentation URL.
    pub fn select(&self, documentation: Option<&str>) -> Result<ClientAuthStrategy> {
        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) {
            return Ok(ClientAuthStrategy::Secret {
                client_id: id.clone(),
                client_secret: secret.clone(),
            });
        }
        if let Some(ref assertion) = self.assertion {
            return Ok(ClientAuthStrategy::Assertion {
                client_id: self.client_id.clone(),
                assertion: assertion.clone(),
            });
        }
        if let Some(ref id) = self.client_id {
            return Ok(ClientAuthStrategy::Public { client_id: id.clone() });
        }
        if let Some(ref signer) = self.signer {
            return Ok(ClientAuthStrategy::Signer { client_id: None, signer: Arc::clone(signer) });
        }

        let mut message = "no client authentication configured for the proof backend".to_owned();
        if let Some(url) = documentation {
            message.push_str(&format!("; see {url}"));
        }
        Err(ErrorKind::ClientAuthNotConfigured.error(message))
    }
}

impl ClientAuthStrategy {
    pub fn method(&self) -> ClientAuthMethod {
        match self {
            Self::Secret { .. } => ClientAuthMethod::ClientSecret,
            Self::Assertion { .. } => ClientAuthMethod::ClientAssertion,
            Self::Public { .. } => ClientAuthMethod::PublicClient,
            Self::Signer { .. } => ClientAuthMethod::SignedAssertion,
        }
    }

    /// Add client credentials to a token request's form params and headers.
    pub async fn apply(
        &self,
        params: &mut Vec<(String, String)>,
        headers: &mut Vec<(String, String)>,
        audience: &str,
    ) -> Result<()> {
        match self {
            Self::Secret { client_id, client_secret } => {
                let raw = format!("{}:{}", urlencoding(client_id), urlencoding(client_secret));
                headers.push(("Authorization".into(), format!("Basic {}", STANDARD.encode(raw))));
            }
            Self::Assertion { client_id, assertion } => {
                push_assertion(params, client_id.as_deref(), assertion);
            }
            Self::Public { client_id } => {
                params.push(("client_id".into(), client_id.clone()));
            }
            Self::Signer { client_id, signer } => {
                let assertion = signer.sign(audience).await?;
                push_assertion(params, client_id.as_deref(), &assertion);
            }
        }
        Ok(())
    }
}

fn push_assertion(
    params: &mut Vec<(String, String)>,
    client_id: Option<&str>,
    assertion: &ClientAssertion,
) {
    if let Some(id) = client_id {
        params.push(("client_id".into(), id.to_owned()));
    }
    params.push(("client_assertion_type".into(), assertion.assertion_type.clone()));
    params.push(("client_assertion".into(), assertion.assertion.clone()));
}

#[cfg(test)]
#[path = "client_auth_tests.rs"]
mod tests;
