// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::credential::persist::FileCredentialStore;
use crate::credential::CredentialStore;
use crate::error::Result;
use crate::oauth::{ClientAssertion, ClientAuthConfig};
use crate::persisted_query::{PersistedQueryResolver, UpgradeStrictness};
use crate::pipeline::ClientInfo;
use crate::proof::{flapg, imink, BackendContext, BackendSelector};
use crate::transport::HttpTransport;

/// Engine configuration.
#[derive(Debug, Clone, clap::Args)]
pub struct EngineConfig {
    /// Proof backend to use: imink, flapg or nxapi.
    #[arg(long, env = "NXAPI_ZNCA_API")]
    pub znca_api: Option<String>,

    /// Self-hosted proof backend endpoint. Implies the nxapi backend.
    #[arg(long, env = "NXAPI_ZNCA_API_URL")]
    pub znca_api_url: Option<String>,

    /// Backend used when no preference is configured.
    #[arg(long, default_value = "imink", env = "NXAPI_DEFAULT_BACKEND")]
    pub default_backend: String,

    #[arg(long, default_value = imink::DEFAULT_URL, env = "NXAPI_IMINK_URL")]
    pub imink_url: String,

    #[arg(long, default_value = flapg::DEFAULT_URL, env = "NXAPI_FLAPG_URL")]
    pub flapg_url: String,

    /// OAuth client id for the self-hosted backend.
    #[arg(long, env = "NXAPI_ZNCA_API_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "NXAPI_ZNCA_API_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Pre-built client assertion (used with --client-assertion-type).
    #[arg(long, env = "NXAPI_ZNCA_API_CLIENT_ASSERTION", hide_env_values = true)]
    pub client_assertion: Option<String>,

    #[arg(
        long,
        default_value = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
        env = "NXAPI_ZNCA_API_CLIENT_ASSERTION_TYPE"
    )]
    pub client_assertion_type: String,

    /// Value of the platform header.
    #[arg(long, default_value = "Android", env = "NXAPI_PLATFORM")]
    pub platform: String,

    /// App version sent as the version header and to proof backends.
    #[arg(long, env = "NXAPI_APP_VERSION")]
    pub app_version: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30000, env = "NXAPI_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Persisted query upgrades: never, safe, safe-reject or all.
    #[arg(long, default_value = "safe", env = "NXAPI_QUERY_UPGRADE")]
    pub query_upgrade: UpgradeStrictness,

    /// Fail instead of keeping the old id when a persisted query was removed.
    #[arg(long, env = "NXAPI_QUERY_UPGRADE_STRICT")]
    pub query_upgrade_strict: bool,

    /// JSON file holding saved credentials.
    #[arg(long, env = "NXAPI_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The explicitly configured backend, if any. A self-hosted URL wins
    /// over a backend id.
    pub fn backend_preference(&self) -> Result<Option<BackendSelector>> {
        if let Some(ref url) = self.znca_api_url {
            return url.parse().map(Some);
        }
        self.znca_api.as_deref().map(str::parse).transpose()
    }

    pub fn default_selector(&self) -> Result<BackendSelector> {
        self.default_backend.parse()
    }

    pub fn client_auth(&self) -> ClientAuthConfig {
        ClientAuthConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            assertion: self.client_assertion.clone().map(|assertion| ClientAssertion {
                assertion,
                assertion_type: self.client_assertion_type.clone(),
            }),
            signer: None,
        }
    }

    pub fn client_info(&self) -> ClientInfo {
        let mut info = ClientInfo { platform: self.platform.clone(), ..ClientInfo::default() };
        if let Some(ref version) = self.app_version {
            info.version = version.clone();
        }
        info
    }

    pub fn credential_store(&self) -> Option<Arc<dyn CredentialStore>> {
        self.credentials_file.as_ref().map(|path| {
            Arc::new(FileCredentialStore::new(path.clone())) as Arc<dyn CredentialStore>
        })
    }

    /// Resolver over an upgrade table, with the configured strictness.
    pub fn query_resolver(&self, table: serde_json::Value) -> Result<PersistedQueryResolver> {
        Ok(PersistedQueryResolver::from_json(self.query_upgrade, table)?
            .strict(self.query_upgrade_strict))
    }

    /// Context for [`select_backend`](crate::proof::select_backend).
    pub fn backend_context(
        &self,
        transport: Arc<dyn HttpTransport>,
        account_id: Option<String>,
    ) -> BackendContext {
        BackendContext {
            transport,
            timeout: self.timeout(),
            imink_url: self.imink_url.clone(),
            flapg_url: self.flapg_url.clone(),
            nxapi_url: self.znca_api_url.clone(),
            client_auth: self.client_auth(),
            platform: self.platform.clone(),
            app_version: self.app_version.clone(),
            account_id,
            store: self.credential_store(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
