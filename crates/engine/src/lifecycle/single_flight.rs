// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot shared operation cell.
//!
//! At most one operation runs at a time. Callers that arrive while it is
//! running get a clone of the same handle and observe the same outcome.
//! A settled handle is never handed out again: the next caller that needs
//! the operation installs a fresh one.

use std::sync::{Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::error::{ErrorKind, Result};

/// Shared handle to a running operation.
pub type FlightHandle<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Idle,
    Running,
}

/// Single-flight coordinator for operations producing `T`.
pub struct SingleFlight<T: Clone> {
    handle: Mutex<Option<FlightHandle<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self { handle: Mutex::new(None) }
    }

    fn lock(&self) -> MutexGuard<'_, Option<FlightHandle<T>>> {
        self.handle.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> FlightState {
        match self.lock().as_ref() {
            Some(h) if h.peek().is_none() => FlightState::Running,
            _ => FlightState::Idle,
        }
    }

    /// Handle of the running operation, if one is unsettled.
    pub fn in_flight(&self) -> Option<FlightHandle<T>> {
        self.lock().as_ref().filter(|h| h.peek().is_none()).cloned()
    }

    /// Join the running operation, or start one if `needed()` says so.
    ///
    /// `needed` is evaluated while the cell is locked, so a caller that
    /// raced with a just-settled operation sees its effects and does not
    /// start a redundant one. Returns `None` when nothing runs and nothing
    /// is needed.
    ///
    /// The operation is spawned onto the runtime: it completes even if
    /// every caller awaiting it is cancelled.
    pub fn join_or_start<N, F>(&self, needed: N, start: F) -> Option<FlightHandle<T>>
    where
        N: FnOnce() -> bool,
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        let mut slot = self.lock();
        if let Some(h) = slot.as_ref() {
            if h.peek().is_none() {
                return Some(h.clone());
            }
        }
        if !needed() {
            *slot = None;
            return None;
        }

        let task = tokio::spawn(start());
        let handle = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(ErrorKind::Transport.error(format!("operation task aborted: {e}"))),
            }
        }
        .boxed()
        .shared();
        *slot = Some(handle.clone());
        Some(handle)
    }

    /// Await `handle` and release the cell if it still holds it.
    pub async fn wait(&self, handle: FlightHandle<T>) -> Result<T> {
        let result = handle.clone().await;
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|h| h.ptr_eq(&handle)) {
            *slot = None;
        }
        result
    }

    /// Join or start unconditionally, then wait.
    pub async fn run<F>(&self, start: F) -> Result<T>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        match self.join_or_start(|| true, start) {
            Some(handle) => self.wait(handle).await,
            None => Err(ErrorKind::Transport.error("operation was not started")),
        }
    }
}

#[cfg(test)]
#[path = "single_flight_tests.rs"]
mod tests;
