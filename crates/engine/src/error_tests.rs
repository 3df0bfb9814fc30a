// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn display_includes_layer_context() {
    let err = ErrorKind::Application
        .error("friend list unavailable")
        .with_status(200)
        .with_code("9407")
        .with_operation("friend_list")
        .with_provider("imink")
        .with_correlation_id(Some("c-1".to_owned()));

    let text = err.to_string();
    assert!(text.starts_with("APPLICATION_ERROR: friend list unavailable"));
    assert!(text.contains("operation friend_list"));
    assert!(text.contains("provider imink"));
    assert!(text.contains("status 200"));
    assert!(text.contains("code 9407"));
    assert!(text.contains("correlation c-1"));
}

#[test]
fn with_operation_keeps_innermost() {
    let err = ErrorKind::Transport.error("boom").with_operation("inner").with_operation("outer");
    assert_eq!(err.operation.as_deref(), Some("inner"));
}

#[test]
fn proof_error_wraps_transport_failures() {
    let err = ErrorKind::Transport.error("connection reset").with_status(502);
    let wrapped = err.into_proof_error("flapg");
    assert_eq!(wrapped.kind, ErrorKind::ProofGeneration);
    assert_eq!(wrapped.status, Some(502));
    assert_eq!(wrapped.provider.as_deref(), Some("flapg"));
}

#[test]
fn proof_error_preserves_oauth_kinds() {
    let err = ErrorKind::InvalidGrant.error("refresh token revoked");
    assert_eq!(err.into_proof_error("nxapi").kind, ErrorKind::InvalidGrant);
}

#[test]
fn codes_are_screaming_snake() {
    for kind in [ErrorKind::UpgradeLoopDetected, ErrorKind::ClientAuthNotConfigured] {
        let s = kind.as_str();
        assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "{s}");
    }
}
