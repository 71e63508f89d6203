//! Acting-user context supplied by the caller on every mutating operation.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Username of whoever triggered a ledger change.
///
/// Authentication happens outside the ledger; this is only the name recorded
/// on movements, receipts and adjustments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(name: impl AsRef<str>) -> LedgerResult<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(LedgerError::incomplete("acting user is required"));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
