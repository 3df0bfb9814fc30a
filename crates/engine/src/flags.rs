// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-call request options.

/// Where the generated `requestId` field goes in the JSON body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestIdPlacement {
    #[default]
    None,
    /// `{"requestId": ..., "parameter": ...}`
    BeforeBody,
    /// `{"parameter": ..., "requestId": ...}`
    AfterBody,
}

/// Options for one logical call. Passed by value, never persisted.
///
/// The default authenticates, sends both platform and version headers,
/// allows encryption, and renews an expired credential once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFlags {
    /// Attach the bearer token.
    pub authenticate: bool,
    /// Send the `X-Platform` header.
    pub platform_header: bool,
    /// Send the `X-ProductVersion` header.
    pub version_header: bool,
    /// Encrypt the body when the active proof backend can.
    pub encryption: bool,
    /// Renew the credential on expiry and retry once.
    pub auto_renew: bool,
    pub request_id: RequestIdPlacement,
}

impl Default for RequestFlags {
    fn default() -> Self {
        Self {
            authenticate: true,
            platform_header: true,
            version_header: true,
            encryption: true,
            auto_renew: true,
            request_id: RequestIdPlacement::None,
        }
    }
}

impl RequestFlags {
    /// Flags for calls made before a credential exists (login, renewal).
    pub fn unauthenticated() -> Self {
        Self { authenticate: false, auto_renew: false, ..Self::default() }
    }

    pub fn with_request_id(self, placement: RequestIdPlacement) -> Self {
        Self { request_id: placement, ..self }
    }

    pub fn without_encryption(self) -> Self {
        Self { encryption: false, ..self }
    }

    pub fn without_auto_renew(self) -> Self {
        Self { auto_renew: false, ..self }
    }
}
