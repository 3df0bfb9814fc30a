// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted query id upgrades.
//!
//! The service retires query hashes over time. The upgrade table maps an
//! old hash to its replacement (or to nothing, when the query was removed)
//! and flags replacements that change the query's shape as unsafe.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// How far [`PersistedQueryResolver::resolve`] follows the upgrade table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpgradeStrictness {
    /// Use ids as given.
    Never,
    /// Follow safe upgrades; stop silently before an unsafe one.
    #[default]
    SafeOnly,
    /// Follow safe upgrades; fail on an unsafe one.
    SafeOrReject,
    /// Follow every upgrade, warning on unsafe ones.
    All,
}

impl UpgradeStrictness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::SafeOnly => "safe",
            Self::SafeOrReject => "safe-reject",
            Self::All => "all",
        }
    }
}

impl FromStr for UpgradeStrictness {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "0" => Ok(Self::Never),
            "safe" | "1" => Ok(Self::SafeOnly),
            "safe-reject" | "2" => Ok(Self::SafeOrReject),
            "all" | "3" => Ok(Self::All),
            other => Err(ErrorKind::Config.error(format!("unknown query upgrade level: {other}"))),
        }
    }
}

impl fmt::Display for UpgradeStrictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the upgrade table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryUpgrade {
    /// Replacement id, or `None` if the query no longer exists.
    pub to: Option<String>,
    #[serde(default, rename = "unsafe")]
    pub is_unsafe: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PersistedQueryResolver {
    table: HashMap<String, QueryUpgrade>,
    strictness: UpgradeStrictness,
    /// Fail instead of stopping when a query has no replacement.
    strict_unavailable: bool,
}

impl PersistedQueryResolver {
    pub fn new(strictness: UpgradeStrictness) -> Self {
        Self { table: HashMap::new(), strictness, strict_unavailable: false }
    }

    /// Load a table shaped as `{ "<from>": { "to": "<id>" | null, "unsafe": bool } }`.
    pub fn from_json(strictness: UpgradeStrictness, table: serde_json::Value) -> Result<Self> {
        let table: HashMap<String, QueryUpgrade> = serde_json::from_value(table)
            .map_err(|e| ErrorKind::Config.error(format!("invalid query upgrade table: {e}")))?;
        Ok(Self { table, strictness, strict_unavailable: false })
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_unavailable = strict;
        self
    }

    pub fn upgrade(mut self, from: &str, to: Option<&str>, is_unsafe: bool) -> Self {
        self.table.insert(from.to_owned(), QueryUpgrade { to: to.map(str::to_owned), is_unsafe });
        self
    }

    pub fn strictness(&self) -> UpgradeStrictness {
        self.strictness
    }

    /// Follow the upgrade table from `query_id` and return the final id.
    pub fn resolve(&self, query_id: &str) -> Result<String> {
        if self.strictness == UpgradeStrictness::Never {
            return Ok(query_id.to_owned());
        }

        let mut current = query_id;
        let mut visited = HashSet::from([query_id]);
        while let Some(edge) = self.table.get(current) {
            let Some(ref next) = edge.to else {
                if self.strict_unavailable {
                    return Err(ErrorKind::UpgradeUnavailable
                        .error(format!("persisted query {current} was removed with no replacement"))
                        .with_code(current));
                }
                break;
            };
            if !visited.insert(next.as_str()) {
                return Err(ErrorKind::UpgradeLoopDetected
                    .error(format!("upgrading {query_id} loops back to {next}"))
                    .with_code(query_id));
            }
            if edge.is_unsafe {
                match self.strictness {
                    UpgradeStrictness::SafeOnly | UpgradeStrictness::Never => break,
                    UpgradeStrictness::SafeOrReject => {
                        return Err(ErrorKind::UnsafeUpgradeRejected
                            .error(format!(
                                "upgrading persisted query {current} to {next} may be a breaking change"
                            ))
                            .with_code(current));
                    }
                    UpgradeStrictness::All => {
                        tracing::warn!(from = %current, to = %next, "following unsafe persisted query upgrade");
                    }
                }
            }
            current = next.as_str();
        }
        Ok(current.to_owned())
    }
}

#[cfg(test)]
#[path = "persisted_query_tests.rs"]
mod tests;
