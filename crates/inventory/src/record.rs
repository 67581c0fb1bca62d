//! Stock records and their derived status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockhold_core::{ItemId, LocationId};

use crate::error::{InventoryError, InventoryResult};

/// Quantities for one item at one location.
///
/// Invariant: `available_quantity + reserved_quantity == total_quantity`, all ≥ 0.
/// Records handed out by the ledger are snapshots; mutating them changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub available_quantity: i64,
    pub reserved_quantity: i64,
    pub total_quantity: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    /// Unit cost in minor currency units (e.g. cents).
    pub unit_cost: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    pub fn provisioned(
        item_id: ItemId,
        location_id: LocationId,
        settings: &StockSettings,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id,
            location_id,
            available_quantity: settings.initial_quantity,
            reserved_quantity: 0,
            total_quantity: settings.initial_quantity,
            reorder_point: settings.reorder_point,
            reorder_quantity: settings.reorder_quantity,
            unit_cost: settings.unit_cost,
            updated_at: at,
        }
    }

    pub fn status(&self) -> StockStatus {
        status_of(self)
    }

    pub fn needs_reorder(&self) -> bool {
        self.status() != StockStatus::InStock
    }

    /// Value of all units on hand (reserved included).
    pub fn total_value(&self) -> i64 {
        self.total_quantity.saturating_mul(self.unit_cost)
    }

    /// Check the quantity invariants. A failure here means the ledger is corrupt.
    pub fn check_invariants(&self) -> InventoryResult<()> {
        if self.available_quantity < 0 || self.reserved_quantity < 0 || self.total_quantity < 0 {
            return Err(InventoryError::invalid_state(format!(
                "{}@{}: negative quantity (available={}, reserved={}, total={})",
                self.item_id,
                self.location_id,
                self.available_quantity,
                self.reserved_quantity,
                self.total_quantity
            )));
        }
        if self.available_quantity + self.reserved_quantity != self.total_quantity {
            return Err(InventoryError::invalid_state(format!(
                "{}@{}: available ({}) + reserved ({}) != total ({})",
                self.item_id,
                self.location_id,
                self.available_quantity,
                self.reserved_quantity,
                self.total_quantity
            )));
        }
        Ok(())
    }
}

/// Availability classification of a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "OUT_OF_STOCK",
            StockStatus::LowStock => "LOW_STOCK",
            StockStatus::InStock => "IN_STOCK",
        }
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OUT_OF_STOCK if available ≤ 0; LOW_STOCK if available ≤ reorder point; else IN_STOCK.
pub fn status_of(record: &StockRecord) -> StockStatus {
    if record.available_quantity <= 0 {
        StockStatus::OutOfStock
    } else if record.available_quantity <= record.reorder_point {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

/// Parameters for provisioning a new stock record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockSettings {
    pub initial_quantity: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    #[serde(default)]
    pub unit_cost: i64,
}

impl StockSettings {
    pub fn new(initial_quantity: i64) -> Self {
        Self {
            initial_quantity,
            ..Self::default()
        }
    }

    pub fn with_reorder(mut self, reorder_point: i64, reorder_quantity: i64) -> Self {
        self.reorder_point = reorder_point;
        self.reorder_quantity = reorder_quantity;
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: i64) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn validate(&self) -> InventoryResult<()> {
        if self.initial_quantity < 0 {
            return Err(InventoryError::invalid_quantity("initial quantity cannot be negative"));
        }
        if self.reorder_point < 0 || self.reorder_quantity < 0 {
            return Err(InventoryError::invalid_quantity(
                "reorder point and reorder quantity cannot be negative",
            ));
        }
        if self.unit_cost < 0 {
            return Err(InventoryError::invalid_quantity("unit cost cannot be negative"));
        }
        Ok(())
    }
}

/// Share of a reservation held at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub location_id: LocationId,
    pub quantity: i64,
}

impl Allocation {
    pub fn new(location_id: LocationId, quantity: i64) -> Self {
        Self {
            location_id,
            quantity,
        }
    }

    pub fn total(allocations: &[Allocation]) -> i64 {
        allocations.iter().map(|a| a.quantity).sum()
    }
}

/// Reason for a direct stock adjustment (receiving, shipping, corrections).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustReason {
    /// Goods received from a supplier.
    Receipt,
    /// Goods returned by a customer.
    Return,
    /// Goods shipped outside the reservation flow.
    Shipment,
    /// Damaged or lost.
    Damage,
    /// Perished / past shelf life.
    Expiry,
    /// Manual count correction.
    Correction,
}

impl AdjustReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustReason::Receipt => "receipt",
            AdjustReason::Return => "return",
            AdjustReason::Shipment => "shipment",
            AdjustReason::Damage => "damage",
            AdjustReason::Expiry => "expiry",
            AdjustReason::Correction => "correction",
        }
    }

    /// Inbound reasons add stock, outbound reasons remove it; corrections go either way.
    pub fn check_delta(&self, delta: i64) -> InventoryResult<()> {
        if delta == 0 {
            return Err(InventoryError::invalid_quantity("delta cannot be zero"));
        }
        match self {
            AdjustReason::Receipt | AdjustReason::Return if delta < 0 => Err(
                InventoryError::invalid_quantity(format!("{} requires a positive delta", self.as_str())),
            ),
            AdjustReason::Shipment | AdjustReason::Damage | AdjustReason::Expiry if delta > 0 => Err(
                InventoryError::invalid_quantity(format!("{} requires a negative delta", self.as_str())),
            ),
            _ => Ok(()),
        }
    }
}

impl core::fmt::Display for AdjustReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
