// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle events.
//!
//! Informational only: the engine never waits on a subscriber. Slow
//! subscribers lag and skip events rather than block renewals.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the token lifecycle coordinators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CredentialEvent {
    /// A credential was observed as expired.
    Expired { account: String },
    /// A renewal completed and a new credential is in use.
    Renewed { account: String, expires_at: u64 },
    /// A renewal failed; every waiter received `error`.
    RenewalFailed { account: String, error: String },
}

impl CredentialEvent {
    pub fn account(&self) -> &str {
        match self {
            Self::Expired { account }
            | Self::Renewed { account, .. }
            | Self::RenewalFailed { account, .. } => account,
        }
    }
}

/// Fan-out hub for [`CredentialEvent`]s.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<CredentialEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: CredentialEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
