// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential persistence: a JSON file store with atomic writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::credential::{CredentialStore, StoredCredential};
use crate::error::{ErrorKind, Result};

/// On-disk layout: every stored credential keyed by account id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedCredentials {
    #[serde(default)]
    pub accounts: HashMap<String, StoredCredential>,
}

/// Load persisted credentials from a JSON file. A missing file is empty.
pub fn load(path: &Path) -> Result<PersistedCredentials> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(PersistedCredentials::default())
        }
        Err(e) => {
            return Err(ErrorKind::Config.error(format!("reading {}: {e}", path.display())));
        }
    };
    serde_json::from_str(&contents)
        .map_err(|e| ErrorKind::Config.error(format!("parsing {}: {e}", path.display())))
}

/// Save persisted credentials to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
pub fn save(path: &Path, creds: &PersistedCredentials) -> Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let io_err =
        |e: std::io::Error| ErrorKind::Config.error(format!("writing {}: {e}", path.display()));

    let json = serde_json::to_string_pretty(creds)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
    }
    std::fs::write(&tmp_path, json).map_err(io_err)?;
    std::fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}

/// [`CredentialStore`] backed by a single JSON file.
///
/// Reads go to disk every time so several processes sharing the file see
/// each other's renewals; writes are serialized within this process.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, account_id: &str) -> Result<Option<StoredCredential>> {
        let mut creds = load(&self.path)?;
        Ok(creds.accounts.remove(account_id))
    }

    async fn set(&self, account_id: &str, value: StoredCredential) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut creds = load(&self.path)?;
        creds.accounts.insert(account_id.to_owned(), value);
        save(&self.path, &creds)
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
