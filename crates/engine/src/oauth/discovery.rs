// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protected resource (RFC 9728) and authorization server (RFC 8414)
//! metadata discovery.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::{ErrorKind, Result};
use crate::transport::{HttpRequest, HttpTransport};

pub const PROTECTED_RESOURCE_SUFFIX: &str = "oauth-protected-resource";
pub const AUTHORIZATION_SERVER_SUFFIX: &str = "oauth-authorization-server";

/// Everything needed to request tokens for one resource URL.
#[derive(Debug, Clone)]
pub struct ProtectedResourceDescriptor {
    pub resource: String,
    pub authorization_server: String,
    pub token_endpoint: String,
    pub issuer: Option<String>,
    /// `aud` for client assertions: the issuer, else the token endpoint.
    pub client_assertion_audience: String,
    /// Human-facing docs the resource advertises (used in config errors).
    pub resource_documentation: Option<String>,
    pub raw_resource_metadata: serde_json::Value,
    pub raw_authorization_server_metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ResourceMetadata {
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    authorization_servers: Vec<String>,
    #[serde(default)]
    resource_documentation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationServerMetadata {
    #[serde(default)]
    issuer: Option<String>,
    token_endpoint: String,
}

/// `{origin}/.well-known/{suffix}{path}` for `url`.
///
/// The path component is appended after the well-known segment (with any
/// trailing slash removed), as both RFCs specify for path-bearing URLs.
pub fn well_known_url(url: &str, suffix: &str) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| ErrorKind::Config.error(format!("invalid URL {url}: {e}")))?;
    let origin = parsed.origin().ascii_serialization();
    let path = parsed.path().trim_end_matches('/');
    Ok(format!("{origin}/.well-known/{suffix}{path}"))
}

async fn fetch_json(
    transport: &dyn HttpTransport,
    url: &str,
    timeout: Duration,
    what: &str,
) -> Result<serde_json::Value> {
    let resp = transport
        .send(HttpRequest::get(url).header("Accept", "application/json"), timeout)
        .await?
        .error_for_status(what)?;
    resp.json().map_err(|e| {
        ErrorKind::Protocol
            .error(format!("{what} at {url} is not JSON: {e}"))
            .with_status(resp.status.as_u16())
    })
}

/// Fetch both metadata documents for `resource_url`.
pub async fn discover(
    transport: &dyn HttpTransport,
    resource_url: &str,
    timeout: Duration,
) -> Result<ProtectedResourceDescriptor> {
    let resource_meta_url = well_known_url(resource_url, PROTECTED_RESOURCE_SUFFIX)?;
    let raw_resource =
        fetch_json(transport, &resource_meta_url, timeout, "protected resource metadata").await?;
    let resource: ResourceMetadata = serde_json::from_value(raw_resource.clone()).map_err(|e| {
        ErrorKind::Protocol.error(format!("invalid protected resource metadata: {e}"))
    })?;

    let authorization_server =
        resource.authorization_servers.first().cloned().ok_or_else(|| {
            ErrorKind::Protocol
                .error(format!("{resource_meta_url} does not list an authorization server"))
        })?;

    let as_meta_url = well_known_url(&authorization_server, AUTHORIZATION_SERVER_SUFFIX)?;
    let raw_as =
        fetch_json(transport, &as_meta_url, timeout, "authorization server metadata").await?;
    let server: AuthorizationServerMetadata =
        serde_json::from_value(raw_as.clone()).map_err(|e| {
            ErrorKind::Protocol.error(format!("invalid authorization server metadata: {e}"))
        })?;

    tracing::debug!(
        resource = %resource_url,
        authorization_server = %authorization_server,
        token_endpoint = %server.token_endpoint,
        "discovered oauth metadata"
    );

    let client_assertion_audience =
        server.issuer.clone().unwrap_or_else(|| server.token_endpoint.clone());
    Ok(ProtectedResourceDescriptor {
        resource: resource.resource.unwrap_or_else(|| resource_url.to_owned()),
        authorization_server,
        token_endpoint: server.token_endpoint,
        issuer: server.issuer,
        client_assertion_audience,
        resource_documentation: resource.resource_documentation,
        raw_resource_metadata: raw_resource,
        raw_authorization_server_metadata: raw_as,
    })
}
