//! Strongly-typed identifiers used across the ledger.
//!
//! Items, locations and suppliers are identified by business codes (SKU,
//! warehouse code, supplier code). Reservations get generated UUIDs.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier parse/validation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("{0}: code cannot be empty")]
    Empty(&'static str),

    #[error("{kind}: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

/// Identifier of a stocked item (SKU).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

/// Identifier of a stock location (warehouse, bin).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

/// Identifier of a supplier that receives reorder requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(String);

/// Identifier of a reservation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

macro_rules! impl_code_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Build an identifier from a code.
            ///
            /// Surrounding whitespace is trimmed; use `parse` to reject empty codes.
            pub fn new(code: impl Into<String>) -> Self {
                let code = code.into();
                Self(code.trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $t {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty($name));
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

impl_code_newtype!(ItemId, "ItemId");
impl_code_newtype!(LocationId, "LocationId");
impl_code_newtype!(SupplierId, "SupplierId");

impl ReservationId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for ReservationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for ReservationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s).map_err(|e| IdError::Malformed {
            kind: "ReservationId",
            reason: e.to_string(),
        })?;
        Ok(Self(uuid))
    }
}
