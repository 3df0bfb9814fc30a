// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request engine for the Nintendo app APIs.
//!
//! A [`Client`] sends operations to one service with a bearer credential,
//! a proof from the configured proof backend and, when that backend can,
//! an encrypted body. When the service reports the credential expired the
//! client renews it once (shared by every concurrent caller) and retries.

pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod flags;
pub mod lifecycle;
pub mod oauth;
pub mod persisted_query;
pub mod pipeline;
pub mod proof;
pub mod response;
pub mod service;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use credential::{AuthBundle, CredentialStore, StoredCredential, UserIdentity};
pub use error::{Error, ErrorKind, Result};
pub use events::CredentialEvent;
pub use flags::{RequestFlags, RequestIdPlacement};
pub use pipeline::{Channel, Client, ClientInfo};
pub use proof::{select_backend, BackendSelector, HashMethod, ProofGenerator, ProofRequest};
pub use response::Response;
pub use service::{Operation, ServiceProtocol};
pub use session::{new_session, restore_session, SessionOptions};
