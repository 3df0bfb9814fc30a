// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

struct StaticSigner;

#[async_trait]
impl AssertionSigner for StaticSigner {
    async fn sign(&self, audience: &str) -> Result<ClientAssertion> {
        Ok(ClientAssertion {
            assertion: format!("signed-for-{audience}"),
            assertion_type: JWT_BEARER_ASSERTION_TYPE.to_owned(),
        })
    }
}

fn assertion() -> ClientAssertion {
    ClientAssertion { assertion: "jwt".into(), assertion_type: JWT_BEARER_ASSERTION_TYPE.into() }
}

#[yare::parameterized(
    secret_wins_over_everything = {
        ClientAuthConfig {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            assertion: Some(assertion()),
            signer: Some(Arc::new(StaticSigner)),
        },
        ClientAuthMethod::ClientSecret
    },
    assertion_wins_over_public = {
        ClientAuthConfig {
            client_id: Some("id".into()),
            assertion: Some(assertion()),
            ..Default::default()
        },
        ClientAuthMethod::ClientAssertion
    },
    public_wins_over_signer = {
        ClientAuthConfig {
            client_id: Some("id".into()),
            signer: Some(Arc::new(StaticSigner)),
            ..Default::default()
        },
        ClientAuthMethod::PublicClient
    },
    signer_is_last_resort = {
        ClientAuthConfig { signer: Some(Arc::new(StaticSigner)), ..Default::default() },
        ClientAuthMethod::SignedAssertion
    },
)]
fn selection_priority(config: ClientAuthConfig, expected: ClientAuthMethod) {
    let strategy = config.select(None);
    assert_eq!(strategy.map(|s| s.method()).ok(), Some(expected));
}

#[test]
fn nothing_configured_mentions_documentation() {
    let err =
        ClientAuthConfig::default().select(Some("https://znca.example/docs/auth")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClientAuthNotConfigured);
    assert!(err.message.contains("https://znca.example/docs/auth"));
}

#[tokio::test]
async fn secret_uses_basic_auth_header() -> anyhow::Result<()> {
    let strategy =
        ClientAuthStrategy::Secret { client_id: "a b".into(), client_secret: "s:1".into() };
    let (mut params, mut headers) = (Vec::new(), Vec::new());
    strategy.apply(&mut params, &mut headers, "https://as.example").await?;

    assert!(params.is_empty());
    let expected = format!("Basic {}", STANDARD.encode("a%20b:s%3A1"));
    assert_eq!(headers, vec![("Authorization".to_owned(), expected)]);
    Ok(())
}

#[tokio::test]
async fn signer_is_called_with_audience() -> anyhow::Result<()> {
    let strategy = ClientAuthStrategy::Signer { client_id: None, signer: Arc::new(StaticSigner) };
    let (mut params, mut headers) = (Vec::new(), Vec::new());
    strategy.apply(&mut params, &mut headers, "https://as.example").await?;

    assert!(headers.is_empty());
    assert!(params.contains(&("client_assertion".into(), "signed-for-https://as.example".into())));
    assert!(params.contains(&("client_assertion_type".into(), JWT_BEARER_ASSERTION_TYPE.into())));
    Ok(())
}

#[tokio::test]
async fn public_client_sends_only_client_id() -> anyhow::Result<()> {
    let strategy = ClientAuthStrategy::Public { client_id: "nxapi-cli".into() };
    let (mut params, mut headers) = (Vec::new(), Vec::new());
    strategy.apply(&mut params, &mut headers, "aud").await?;
    assert_eq!(params, vec![("client_id".to_owned(), "nxapi-cli".to_owned())]);
    assert!(headers.is_empty());
    Ok(())
}
