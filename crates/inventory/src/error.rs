//! Inventory error model.

use thiserror::Error;

use stockhold_core::{ItemId, LocationId, ReservationId};

use crate::reservation::ReservationStatus;
use crate::store::StoreError;

/// Result type used across the inventory layer.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Coarse classification of an [`InventoryError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input rejected before any mutation.
    Input,
    /// Business rule refused the operation; nothing was mutated.
    Business,
    /// Idempotent no-op signal (already resolved, unknown id).
    Signal,
    /// Ledger invariant violated. Indicates a bug or corrupted state; alert.
    Invariant,
    /// A collaborator (persistence) failed.
    Infrastructure,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),

    #[error("insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },

    #[error("stock record {item_id}@{location_id} already provisioned")]
    AlreadyProvisioned {
        item_id: ItemId,
        location_id: LocationId,
    },

    #[error("no stock record for {item_id}@{location_id}")]
    UnknownRecord {
        item_id: ItemId,
        location_id: LocationId,
    },

    #[error("reservation {0} not found")]
    NotFound(ReservationId),

    #[error("reservation {id} is not active (status: {status})")]
    ReservationNotActive {
        id: ReservationId,
        status: ReservationStatus,
    },

    #[error("reservation {0} expired before it was confirmed")]
    ReservationExpired(ReservationId),

    #[error("stock for {item_id}@{location_id} would go negative: {detail}")]
    NegativeStock {
        item_id: ItemId,
        location_id: LocationId,
        detail: String,
    },

    #[error("invalid ledger state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InventoryError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_expiry(msg: impl Into<String>) -> Self {
        Self::InvalidExpiry(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuantity(_)
            | Self::InvalidExpiry(_)
            | Self::AlreadyProvisioned { .. }
            | Self::UnknownRecord { .. } => ErrorKind::Input,
            Self::InsufficientStock { .. } => ErrorKind::Business,
            Self::NotFound(_) | Self::ReservationNotActive { .. } | Self::ReservationExpired(_) => {
                ErrorKind::Signal
            }
            Self::NegativeStock { .. } | Self::InvalidState(_) => ErrorKind::Invariant,
            Self::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Invariant violations must reach an operator; they are never swallowed.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Invariant
    }
}
