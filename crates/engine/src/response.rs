// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decoded payload plus response provenance.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

/// A successful call's value with the metadata of the response it came from.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub value: T,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Server-assigned correlation id, from the body or a response header.
    pub correlation_id: Option<String>,
}

impl<T> Response<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            value: f(self.value),
            status: self.status,
            headers: self.headers,
            correlation_id: self.correlation_id,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl Response<serde_json::Value> {
    /// Deserialize the JSON value into a typed result.
    pub fn deserialize<T: serde::de::DeserializeOwned>(self) -> crate::Result<Response<T>> {
        let value = serde_json::from_value(self.value).map_err(|e| {
            crate::ErrorKind::Protocol
                .error(format!("unexpected response shape: {e}"))
                .with_status(self.status.as_u16())
                .with_correlation_id(self.correlation_id.clone())
        })?;
        Ok(Response {
            value,
            status: self.status,
            headers: self.headers,
            correlation_id: self.correlation_id,
        })
    }
}
