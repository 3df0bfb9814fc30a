// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for every layer of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network failure, timeout, or non-2xx response without a usable body.
    Transport,
    /// 2xx response that failed to parse or had the wrong shape.
    Protocol,
    /// The remote service reported the bearer credential as expired.
    CredentialExpired,
    /// Well-formed error payload from the remote service.
    Application,
    /// The proof backend's own HTTP call failed.
    ProofGeneration,
    ClientAuthNotConfigured,
    InvalidGrant,
    InvalidToken,
    UpgradeLoopDetected,
    UnsafeUpgradeRejected,
    UpgradeUnavailable,
    /// Authentication requested but no credential is available.
    NotAuthenticated,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT_ERROR",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::CredentialExpired => "CREDENTIAL_EXPIRED",
            Self::Application => "APPLICATION_ERROR",
            Self::ProofGeneration => "PROOF_GENERATION_ERROR",
            Self::ClientAuthNotConfigured => "CLIENT_AUTH_NOT_CONFIGURED",
            Self::InvalidGrant => "INVALID_GRANT",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::UpgradeLoopDetected => "UPGRADE_LOOP_DETECTED",
            Self::UnsafeUpgradeRejected => "UNSAFE_UPGRADE_REJECTED",
            Self::UpgradeUnavailable => "UPGRADE_UNAVAILABLE",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::Config => "CONFIG_ERROR",
        }
    }

    /// Construct an [`Error`] of this kind.
    pub fn error(self, message: impl Into<String>) -> Error {
        Error::new(self, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine error with enough context to tell which layer failed.
///
/// `Clone` so a single renewal failure can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status of the failing response, if any.
    pub status: Option<u16>,
    /// Remote error code (service status, OAuth `error`, GraphQL code).
    pub code: Option<String>,
    pub correlation_id: Option<String>,
    pub operation: Option<String>,
    /// Proof backend active when the error occurred.
    pub provider: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            code: None,
            correlation_id: None,
            operation: None,
            provider: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_correlation_id(mut self, id: Option<String>) -> Self {
        if id.is_some() {
            self.correlation_id = id;
        }
        self
    }

    /// Attach the operation name unless a deeper layer already did.
    pub fn with_operation(mut self, operation: &str) -> Self {
        if self.operation.is_none() {
            self.operation = Some(operation.to_owned());
        }
        self
    }

    /// Attach the provider name unless a deeper layer already did.
    pub fn with_provider(mut self, provider: &str) -> Self {
        if self.provider.is_none() {
            self.provider = Some(provider.to_owned());
        }
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Wrap a failure from a proof backend so the outer call sees it as
    /// a proof generation error while keeping the remote status and code.
    pub fn into_proof_error(self, provider: &str) -> Self {
        match self.kind {
            ErrorKind::ProofGeneration
            | ErrorKind::ClientAuthNotConfigured
            | ErrorKind::InvalidGrant
            | ErrorKind::InvalidToken
            | ErrorKind::Config => self.with_provider(provider),
            _ => Self { kind: ErrorKind::ProofGeneration, ..self }.with_provider(provider),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(ref op) = self.operation {
            write!(f, " (operation {op})")?;
        }
        if let Some(ref provider) = self.provider {
            write!(f, " (provider {provider})")?;
        }
        if let Some(status) = self.status {
            write!(f, " [status {status}]")?;
        }
        if let Some(ref code) = self.code {
            write!(f, " [code {code}]")?;
        }
        if let Some(ref id) = self.correlation_id {
            write!(f, " [correlation {id}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Protocol, e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
