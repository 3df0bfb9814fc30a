// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;
use crate::credential::MemoryCredentialStore;
use crate::oauth::{ClientAuthMethod, OAuthSession};
use crate::test_support::{body_json, bytes_response, json_response, MockProvider, MockTransport};

fn context(transport: Arc<MockTransport>) -> BackendContext {
    BackendContext {
        transport,
        timeout: Duration::from_secs(5),
        imink_url: "https://imink.example/f".into(),
        flapg_url: "https://flapg.example/f".into(),
        nxapi_url: None,
        client_auth: ClientAuthConfig::default(),
        platform: "Android".into(),
        app_version: Some("2.10.1".into()),
        account_id: None,
        store: None,
    }
}

fn echo_backend() -> Arc<MockTransport> {
    MockTransport::new(|req| {
        let body = body_json(req);
        json_response(
            200,
            json!({ "f": "proof-value", "timestamp": body["timestamp"], "request_id": body["request_id"] }),
        )
    })
}

#[tokio::test]
async fn imink_sends_the_documented_fields() -> anyhow::Result<()> {
    let transport = echo_backend();
    let imink = IminkProvider::new(&context(Arc::clone(&transport)));

    let request = ProofRequest::new("bearer", HashMethod::WebService);
    let proof = imink.generate_proof(request.clone()).await?;

    assert_eq!(proof.proof_value, "proof-value");
    assert_eq!(proof.request_nonce, request.request_id);
    assert_eq!(proof.hash_method, HashMethod::WebService);
    assert!(imink.encryption().is_none());

    let sent = body_json(&transport.requests()[0]);
    let keys: Vec<&str> =
        sent.as_object().map(|m| m.keys().map(String::as_str).collect()).unwrap_or_default();
    assert_eq!(keys, vec!["hash_method", "token", "timestamp", "request_id"]);
    assert_eq!(sent["hash_method"], json!(2));
    assert_eq!(sent["token"], json!("bearer"));
    Ok(())
}

#[tokio::test]
async fn flapg_adds_identity_and_client_headers() -> anyhow::Result<()> {
    let transport = echo_backend();
    let flapg = FlapgProvider::new(&context(Arc::clone(&transport)));

    let mut request = ProofRequest::new("id-token", HashMethod::Login);
    request.na_id = Some("na".into());
    request.coral_user_id = Some("42".into());
    flapg.generate_proof(request).await?;

    let call = &transport.requests()[0];
    assert_eq!(call.url, "https://flapg.example/f");
    assert_eq!(call.header_value("X-znca-Platform"), Some("Android"));
    assert_eq!(call.header_value("X-znca-Version"), Some("2.10.1"));
    let sent = body_json(call);
    assert_eq!(sent["na_id"], json!("na"));
    assert_eq!(sent["coral_user_id"], json!("42"));
    Ok(())
}

#[yare::parameterized(
    server_error = { 500 },
    rate_limited = { 429 },
    unauthorized = { 401 },
)]
#[test_macro(tokio::test)]
async fn stateless_backend_failure_is_proof_error(status: u16) {
    let transport = MockTransport::new(move |_| bytes_response(status, "text/plain", "nope"));
    let imink = IminkProvider::new(&context(transport));

    let err = imink.generate_proof(ProofRequest::new("t", HashMethod::Login)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProofGeneration);
    assert_eq!(err.status, Some(status));
    assert_eq!(err.provider.as_deref(), Some("imink"));
}

#[tokio::test]
async fn transport_failure_is_wrapped_as_proof_error() -> anyhow::Result<()> {
    let transport = MockTransport::new(|_| Err(ErrorKind::Transport.error("connection refused")));
    let imink = IminkProvider::new(&context(transport));

    let err = imink.generate_proof(ProofRequest::new("t", HashMethod::Login)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProofGeneration);
    assert!(err.message.contains("connection refused"));
    Ok(())
}

#[yare::parameterized(
    imink = { "imink", BackendSelector::Id(BackendId::Imink) },
    flapg_mixed_case = { "Flapg", BackendSelector::Id(BackendId::Flapg) },
    nxapi = { "nxapi", BackendSelector::Id(BackendId::Nxapi) },
    url = { "https://znca.example/api/znca/", BackendSelector::Url("https://znca.example/api/znca".into()) },
)]
fn selector_parsing(input: &str, expected: BackendSelector) {
    assert_eq!(input.parse::<BackendSelector>().ok(), Some(expected));
}

#[test]
fn unknown_backend_is_config_error() {
    let err = "carrier-pigeon".parse::<BackendSelector>().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Config);
}

#[tokio::test]
async fn preference_wins_over_default() -> anyhow::Result<()> {
    let ctx = context(echo_backend());
    let default = BackendSelector::Id(BackendId::Imink);

    let chosen =
        select_backend(Some(&BackendSelector::Id(BackendId::Flapg)), &default, &ctx).await?;
    assert_eq!(chosen.name(), "flapg");
    let fallback = select_backend(None, &default, &ctx).await?;
    assert_eq!(fallback.name(), "imink");
    Ok(())
}

#[tokio::test]
async fn self_hosted_url_selects_encrypting_backend() -> anyhow::Result<()> {
    let ctx = context(echo_backend());
    let url = BackendSelector::Url("https://znca.example/api/znca".into());

    let chosen = select_backend(Some(&url), &BackendSelector::Id(BackendId::Imink), &ctx).await?;
    assert_eq!(chosen.name(), "nxapi");
    assert!(encryption_capability(chosen.as_ref()).is_some());
    Ok(())
}

#[tokio::test]
async fn nxapi_by_id_needs_a_url() -> anyhow::Result<()> {
    let ctx = context(echo_backend());
    let err = select_backend(None, &BackendSelector::Id(BackendId::Nxapi), &ctx)
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert_eq!(err.kind, ErrorKind::Config);
    Ok(())
}

#[tokio::test]
async fn persisted_oauth_session_is_restored() -> anyhow::Result<()> {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let session = OAuthSession {
        access_token: Some("at-saved".into()),
        expires_at: 0,
        refresh_token: None,
        client_auth: ClientAuthMethod::PublicClient,
    };
    store.set("acct:znca-oauth", StoredCredential::OAuth(session)).await?;

    let mut ctx = context(echo_backend());
    ctx.store = Some(store);
    ctx.account_id = Some("acct".into());
    ctx.nxapi_url = Some("https://znca.example/api/znca".into());

    // Succeeds without discovery: the restored token is used directly.
    let chosen = select_backend(None, &BackendSelector::Id(BackendId::Nxapi), &ctx).await?;
    let proof = chosen.generate_proof(ProofRequest::new("t", HashMethod::Login)).await?;
    assert_eq!(proof.proof_value, "proof-value");
    Ok(())
}

#[test]
fn proof_fields_are_merged_into_parameter() {
    let proof = ProofResult {
        provider_name: "mock".into(),
        hash_method: HashMethod::Login,
        proof_value: "fff".into(),
        timestamp: 1234,
        request_nonce: "nonce".into(),
        encrypted_payload: None,
    };
    let merged = proof.apply_to(&json!({ "naIdToken": "tok" }));
    assert_eq!(
        merged,
        json!({ "naIdToken": "tok", "f": "fff", "timestamp": 1234, "requestId": "nonce" })
    );
}

#[test]
fn hash_method_round_trips_as_integer() -> anyhow::Result<()> {
    assert_eq!(serde_json::to_value(HashMethod::WebService)?, json!(2));
    assert_eq!(serde_json::from_value::<HashMethod>(json!(1))?, HashMethod::Login);
    assert!(serde_json::from_value::<HashMethod>(json!(3)).is_err());
    Ok(())
}

proptest! {
    #[test]
    fn mock_encryption_round_trips(payload in proptest::collection::vec(any::<u8>(), 0..512), key in any::<u8>()) {
        let rt = tokio::runtime::Builder::new_current_thread().build()?;
        let provider = MockProvider::encrypting(key);
        let enc = encryption_capability(provider.as_ref());
        prop_assert!(enc.is_some());
        if let Some(enc) = enc {
            let plain = rt.block_on(async {
                let envelope = enc.encrypt_request("https://x", None, &payload).await?;
                enc.decrypt_response(&envelope.ciphertext).await
            });
            prop_assert_eq!(plain.ok().map(|b| b.to_vec()), Some(payload));
        }
    }
}
