// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use reqwest::header::HeaderValue;
use serde_json::json;

use super::*;
use crate::error::ErrorKind;
use crate::persisted_query::{PersistedQueryResolver, UpgradeStrictness};
use crate::service::graphql::GRAPHQL_PATH;

fn coral() -> CoralProtocol {
    CoralProtocol::new("https://coral.example/")
}

#[test]
fn coral_success_returns_result_and_correlation() -> anyhow::Result<()> {
    let outcome = coral().classify(
        StatusCode::OK,
        &HeaderMap::new(),
        json!({ "status": 0, "result": { "friends": [] }, "correlationId": "abc" }),
    )?;
    assert_eq!(
        outcome,
        Outcome::Success { value: json!({ "friends": [] }), correlation_id: Some("abc".into()) }
    );
    Ok(())
}

#[test]
fn coral_9404_is_an_expiry_signal() -> anyhow::Result<()> {
    let outcome = coral().classify(
        StatusCode::OK,
        &HeaderMap::new(),
        json!({ "status": 9404, "errorMessage": "Token expired." }),
    )?;
    assert!(
        matches!(outcome, Outcome::Expired { ref code, .. } if code.as_deref() == Some("9404"))
    );
    Ok(())
}

#[yare::parameterized(
    application = { StatusCode::OK, json!({ "status": 9403, "errorMessage": "Invalid token." }), ErrorKind::Application },
    missing_status = { StatusCode::OK, json!({ "result": {} }), ErrorKind::Protocol },
    http_error = { StatusCode::BAD_GATEWAY, json!("<html>"), ErrorKind::Transport },
    http_error_with_envelope = { StatusCode::INTERNAL_SERVER_ERROR, json!({ "status": 9404 }), ErrorKind::Transport },
)]
fn coral_failures(status: StatusCode, payload: serde_json::Value, kind: ErrorKind) {
    let err = coral().classify(status, &HeaderMap::new(), payload).unwrap_err();
    assert_eq!(err.kind, kind);
    assert_eq!(err.status, Some(status.as_u16()));
}

#[test]
fn coral_application_error_keeps_remote_code() {
    let err = coral()
        .classify(
            StatusCode::OK,
            &HeaderMap::new(),
            json!({ "status": 9403, "errorMessage": "Invalid token.", "correlationId": "c" }),
        )
        .unwrap_err();
    assert_eq!(err.code.as_deref(), Some("9403"));
    assert_eq!(err.message, "Invalid token.");
    assert_eq!(err.correlation_id.as_deref(), Some("c"));
}

#[test]
fn coral_wraps_parameter_and_joins_url() {
    let op = Operation::post("Friend/List", "/v3/Friend/List");
    assert_eq!(coral().url(&op), "https://coral.example/v3/Friend/List");
    assert_eq!(coral().body(&op, None), json!({ "parameter": {} }));
    assert_eq!(coral().body(&op, Some(json!({ "id": 1 }))), json!({ "parameter": { "id": 1 } }));
}

fn graphql_service(strictness: UpgradeStrictness) -> GraphqlProtocol {
    let resolver = PersistedQueryResolver::new(strictness)
        .upgrade("old", Some("new"), false)
        .upgrade("new", Some("breaking"), true);
    GraphqlProtocol::new("https://game.example", Arc::new(resolver))
}

#[test]
fn graphql_query_uses_resolved_hash() -> anyhow::Result<()> {
    let op = graphql_service(UpgradeStrictness::SafeOnly).query("old", json!({ "first": 10 }))?;
    assert_eq!(op.name, "new");
    assert_eq!(op.path, GRAPHQL_PATH);
    assert_eq!(
        op.parameter,
        Some(json!({
            "variables": { "first": 10 },
            "extensions": { "persistedQuery": { "version": 1, "sha256Hash": "new" } }
        }))
    );
    Ok(())
}

#[test]
fn graphql_query_surfaces_resolver_errors() {
    let err = graphql_service(UpgradeStrictness::SafeOrReject).query("old", json!({})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsafeUpgradeRejected);
}

#[test]
fn graphql_401_is_an_expiry_signal() -> anyhow::Result<()> {
    let mut headers = HeaderMap::new();
    headers.insert(graphql::REQUEST_ID_HEADER, HeaderValue::from_static("req-9"));
    let outcome = graphql_service(UpgradeStrictness::All).classify(
        StatusCode::UNAUTHORIZED,
        &headers,
        json!(""),
    )?;
    assert!(matches!(
        outcome,
        Outcome::Expired { ref correlation_id, .. } if correlation_id.as_deref() == Some("req-9")
    ));
    Ok(())
}

#[test]
fn graphql_errors_are_application_errors() {
    let err = graphql_service(UpgradeStrictness::All)
        .classify(
            StatusCode::OK,
            &HeaderMap::new(),
            json!({ "errors": [{ "message": "bad variable", "extensions": { "code": "BAD_INPUT" } }] }),
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Application);
    assert_eq!(err.code.as_deref(), Some("BAD_INPUT"));
    assert_eq!(err.message, "bad variable");
}

#[test]
fn graphql_data_is_returned() -> anyhow::Result<()> {
    let outcome = graphql_service(UpgradeStrictness::All).classify(
        StatusCode::OK,
        &HeaderMap::new(),
        json!({ "data": { "viewer": { "id": "x" } } }),
    )?;
    assert_eq!(
        outcome,
        Outcome::Success { value: json!({ "viewer": { "id": "x" } }), correlation_id: None }
    );
    Ok(())
}

#[test]
fn operation_builders() {
    let op = Operation::post("Account/GetToken", "/v3/Account/GetToken")
        .parameter(json!({ "id": 1 }))
        .with_proof(crate::proof::HashMethod::WebService);
    assert_eq!(op.method, Method::POST);
    assert_eq!(
        op.proof.as_ref().map(|p| p.hash_method),
        Some(crate::proof::HashMethod::WebService)
    );
    assert_eq!(op.proof.and_then(|p| p.token), None);
}
