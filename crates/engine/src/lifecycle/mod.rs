// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer credential lifecycle: expiry marking and single-flight renewal.
//!
//! Two states. **Idle**: callers read the current [`AuthBundle`].
//! **Renewing**: a renewal is in flight and every caller waits on it.
//! A successful renewal swaps the bundle and clears the expired flag before
//! any waiter wakes; a failed one leaves the flag set and hands the same
//! error to every waiter.

pub mod single_flight;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures_util::FutureExt;

pub use single_flight::{FlightState, SingleFlight};

use crate::credential::{AuthBundle, CredentialStore, StoredCredential};
use crate::error::{ErrorKind, Result};
use crate::events::{CredentialEvent, EventHub};

/// Produces a fresh [`AuthBundle`], typically by logging in again with the
/// long-lived token carried in the previous one.
#[async_trait]
pub trait Renewer: Send + Sync {
    async fn renew(&self, previous: Option<Arc<AuthBundle>>) -> Result<AuthBundle>;
}

/// The current bundle and its expired mark change together.
#[derive(Default)]
struct Slot {
    bundle: Option<Arc<AuthBundle>>,
    expired: bool,
}

struct Inner {
    account_id: String,
    slot: RwLock<Slot>,
    renewer: Arc<dyn Renewer>,
    store: Option<Arc<dyn CredentialStore>>,
    events: EventHub,
}

impl Inner {
    fn slot(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn slot_mut(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self) -> Option<Arc<AuthBundle>> {
        self.slot().bundle.clone()
    }

    fn needs_renewal(&self) -> bool {
        let slot = self.slot();
        if slot.expired {
            return true;
        }
        match slot.bundle {
            Some(ref bundle) => bundle.is_expired(),
            None => true,
        }
    }

    fn replace(&self, bundle: Arc<AuthBundle>) {
        *self.slot_mut() = Slot { bundle: Some(bundle), expired: false };
    }

    async fn perform_renewal(self: Arc<Self>) -> Result<Arc<AuthBundle>> {
        let previous = self.current();
        tracing::debug!(account = %self.account_id, "renewing credential");

        match self.renewer.renew(previous).await {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                self.replace(Arc::clone(&bundle));

                if let Some(ref store) = self.store {
                    let stored = StoredCredential::Auth(bundle.as_ref().clone());
                    if let Err(e) = store.set(&self.account_id, stored).await {
                        tracing::warn!(account = %self.account_id, err = %e, "failed to persist renewed credential");
                    }
                }

                self.events.emit(CredentialEvent::Renewed {
                    account: self.account_id.clone(),
                    expires_at: bundle.expires_at,
                });
                tracing::info!(account = %self.account_id, expires_at = bundle.expires_at, "credential renewed");
                Ok(bundle)
            }
            Err(e) => {
                self.events.emit(CredentialEvent::RenewalFailed {
                    account: self.account_id.clone(),
                    error: e.to_string(),
                });
                tracing::warn!(account = %self.account_id, err = %e, "credential renewal failed");
                Err(e)
            }
        }
    }
}

/// Per-client coordinator for the primary bearer credential.
pub struct TokenLifecycle {
    inner: Arc<Inner>,
    flight: SingleFlight<Arc<AuthBundle>>,
}

impl TokenLifecycle {
    pub fn new(
        account_id: impl Into<String>,
        renewer: Arc<dyn Renewer>,
        store: Option<Arc<dyn CredentialStore>>,
        events: EventHub,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                account_id: account_id.into(),
                slot: RwLock::new(Slot::default()),
                renewer,
                store,
                events,
            }),
            flight: SingleFlight::new(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.inner.account_id
    }

    /// Seed a bundle (restored session). Does not persist.
    pub fn install(&self, bundle: AuthBundle) {
        self.inner.replace(Arc::new(bundle));
    }

    pub fn current(&self) -> Option<Arc<AuthBundle>> {
        self.inner.current()
    }

    pub fn is_expired(&self) -> bool {
        self.inner.needs_renewal()
    }

    pub fn state(&self) -> FlightState {
        self.flight.state()
    }

    /// Mark the credential expired after a service reported it so.
    ///
    /// Only takes effect if `observed` is still the current bundle: a signal
    /// for a bundle that a completed renewal already replaced is stale.
    /// Returns whether the flag was set.
    pub fn mark_expired(&self, observed: &Arc<AuthBundle>) -> bool {
        let newly_expired = {
            let mut slot = self.inner.slot_mut();
            let is_current = slot.bundle.as_ref().is_some_and(|b| Arc::ptr_eq(b, observed));
            if !is_current {
                drop(slot);
                tracing::debug!(account = %self.inner.account_id, "ignoring stale expiry signal");
                return false;
            }
            !std::mem::replace(&mut slot.expired, true)
        };
        if newly_expired {
            self.inner
                .events
                .emit(CredentialEvent::Expired { account: self.inner.account_id.clone() });
        }
        true
    }

    /// Return a usable bundle, renewing (or joining a renewal) if needed.
    pub async fn ensure_valid(&self) -> Result<Arc<AuthBundle>> {
        let inner = Arc::clone(&self.inner);
        let needed = || self.inner.needs_renewal();
        match self.flight.join_or_start(needed, move || inner.perform_renewal().boxed()) {
            Some(handle) => self.flight.wait(handle).await,
            None => self
                .current()
                .ok_or_else(|| ErrorKind::NotAuthenticated.error("no credential available")),
        }
    }

    /// Wait for an in-flight renewal, if any, without starting one.
    pub async fn settled(&self) -> Result<Option<Arc<AuthBundle>>> {
        if let Some(handle) = self.flight.in_flight() {
            return self.flight.wait(handle).await.map(Some);
        }
        Ok(self.current())
    }

    /// Force a renewal (or join the running one) regardless of expiry.
    pub async fn renew(&self) -> Result<Arc<AuthBundle>> {
        let inner = Arc::clone(&self.inner);
        self.flight.run(move || inner.perform_renewal().boxed()).await
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
