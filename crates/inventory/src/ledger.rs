//! Stock ledger: authoritative per-(item, location) quantities.
//!
//! Every mutation of an item's records happens inside that item's exclusion
//! scope ([`StockLedger::with_item`]):
//!
//! ```text
//! lock(item) → load records → mutate working copy → check invariants → save → unlock
//! ```
//!
//! Two concurrent reservations for the same item therefore never both pass the
//! availability check against stale quantities. Different items never contend.
//!
//! Callers that need to do their own bookkeeping atomically with a ledger change
//! (the reservation manager) run it inside the same scope through [`ItemTxn`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use stockhold_core::{Clock, ItemId, LocationId};

use crate::error::{InventoryError, InventoryResult};
use crate::record::{AdjustReason, Allocation, StockRecord, StockSettings, StockStatus, status_of};
use crate::store::StockStore;

/// Log an invariant violation for operators and turn it into `InvalidState`.
fn invariant_violation(item_id: &ItemId, detail: String) -> InventoryError {
    error!(alert = true, item_id = %item_id, detail = %detail, "stock ledger invariant violated");
    InventoryError::InvalidState(detail)
}

pub struct StockLedger {
    store: Arc<dyn StockStore>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<ItemId, Arc<Mutex<()>>>>,
}

impl core::fmt::Debug for StockLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockLedger").finish_non_exhaustive()
    }
}

impl StockLedger {
    pub fn new(store: Arc<dyn StockStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn item_lock(&self, item_id: &ItemId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(item_id.clone()).or_default().clone()
    }

    /// Run `f` inside the item's exclusion scope.
    ///
    /// On `Ok`, pending changes are checked and persisted. On `Err`, the item's
    /// records are restored to their state at scope entry, including anything `f`
    /// already committed.
    pub fn with_item<T, F>(&self, item_id: &ItemId, f: F) -> InventoryResult<T>
    where
        F: FnOnce(&mut ItemTxn<'_>) -> InventoryResult<T>,
    {
        let lock = self.item_lock(item_id);
        // A panic inside a previous scope never persisted a half-applied change.
        let _scope = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let records = self.store.load(item_id)?;
        let mut txn = ItemTxn::new(item_id.clone(), records, &*self.store, self.clock.now());

        let result = f(&mut txn).and_then(|out| txn.commit().map(|()| out));

        match result {
            Ok(out) => Ok(out),
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    error!(
                        alert = true,
                        item_id = %item_id,
                        cause = %err,
                        error = %rollback_err,
                        "failed to roll back item scope"
                    );
                    return Err(InventoryError::invalid_state(format!(
                        "rollback failed after `{err}`: {rollback_err}"
                    )));
                }
                Err(err)
            }
        }
    }

    /// Create the record for `item_id` at `location_id`.
    pub fn provision(
        &self,
        item_id: &ItemId,
        location_id: &LocationId,
        settings: &StockSettings,
    ) -> InventoryResult<StockRecord> {
        let record = self.with_item(item_id, |txn| txn.provision(location_id, settings))?;
        debug!(item_id = %item_id, location_id = %location_id, quantity = record.total_quantity, "stock record provisioned");
        Ok(record)
    }

    /// Sum of available quantity across the item's records (or one location). 0 if unknown.
    pub fn get_available(&self, item_id: &ItemId, location_id: Option<&LocationId>) -> InventoryResult<i64> {
        let records = self.store.load(item_id)?;
        Ok(sum_available(&records, location_id))
    }

    /// Move `quantity` from available to reserved, filling locations in id order.
    pub fn reserve(&self, item_id: &ItemId, quantity: i64) -> InventoryResult<Vec<Allocation>> {
        let allocations = self.with_item(item_id, |txn| txn.reserve(quantity))?;
        debug!(item_id = %item_id, quantity, locations = allocations.len(), "stock reserved");
        Ok(allocations)
    }

    /// Inverse of [`StockLedger::reserve`].
    pub fn release(&self, item_id: &ItemId, allocations: &[Allocation]) -> InventoryResult<()> {
        self.with_item(item_id, |txn| txn.release(allocations))?;
        debug!(item_id = %item_id, quantity = Allocation::total(allocations), "stock released");
        Ok(())
    }

    /// Permanently remove reserved units.
    pub fn allocate(&self, item_id: &ItemId, allocations: &[Allocation]) -> InventoryResult<()> {
        self.with_item(item_id, |txn| txn.allocate(allocations))?;
        debug!(item_id = %item_id, quantity = Allocation::total(allocations), "stock allocated");
        Ok(())
    }

    /// Receive, ship or correct stock at one location.
    pub fn adjust(
        &self,
        item_id: &ItemId,
        location_id: &LocationId,
        delta: i64,
        reason: AdjustReason,
    ) -> InventoryResult<StockRecord> {
        let record = self.with_item(item_id, |txn| txn.adjust(location_id, delta, reason))?;
        debug!(
            item_id = %item_id,
            location_id = %location_id,
            delta,
            reason = %reason,
            available = record.available_quantity,
            "stock adjusted"
        );
        Ok(record)
    }

    pub fn records(&self, item_id: &ItemId) -> InventoryResult<Vec<StockRecord>> {
        Ok(self.store.load(item_id)?)
    }

    pub fn record(&self, item_id: &ItemId, location_id: &LocationId) -> InventoryResult<Option<StockRecord>> {
        Ok(self
            .store
            .load(item_id)?
            .into_iter()
            .find(|r| &r.location_id == location_id))
    }

    /// Every record of every item, ordered by (item, location).
    pub fn all_records(&self) -> InventoryResult<Vec<StockRecord>> {
        let mut out = Vec::new();
        for item_id in self.store.items()? {
            out.extend(self.store.load(&item_id)?);
        }
        Ok(out)
    }

    pub fn status_of(record: &StockRecord) -> StockStatus {
        status_of(record)
    }
}

fn sum_available(records: &[StockRecord], location_id: Option<&LocationId>) -> i64 {
    records
        .iter()
        .filter(|r| location_id.is_none_or(|loc| &r.location_id == loc))
        .map(|r| r.available_quantity)
        .sum()
}

/// Working copy of one item's records inside its exclusion scope.
pub struct ItemTxn<'a> {
    item_id: ItemId,
    store: &'a dyn StockStore,
    now: DateTime<Utc>,
    /// State at scope entry.
    base: Vec<StockRecord>,
    /// State last written to the store.
    persisted: Vec<StockRecord>,
    records: Vec<StockRecord>,
}

impl<'a> ItemTxn<'a> {
    fn new(item_id: ItemId, records: Vec<StockRecord>, store: &'a dyn StockStore, now: DateTime<Utc>) -> Self {
        Self {
            item_id,
            store,
            now,
            base: records.clone(),
            persisted: records.clone(),
            records,
        }
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Business time captured at scope entry.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn records(&self) -> &[StockRecord] {
        &self.records
    }

    pub fn available(&self, location_id: Option<&LocationId>) -> i64 {
        sum_available(&self.records, location_id)
    }

    fn record_mut(&mut self, location_id: &LocationId) -> Option<&mut StockRecord> {
        self.records.iter_mut().find(|r| &r.location_id == location_id)
    }

    pub fn provision(&mut self, location_id: &LocationId, settings: &StockSettings) -> InventoryResult<StockRecord> {
        settings.validate()?;
        if self.records.iter().any(|r| &r.location_id == location_id) {
            return Err(InventoryError::AlreadyProvisioned {
                item_id: self.item_id.clone(),
                location_id: location_id.clone(),
            });
        }

        let record = StockRecord::provisioned(self.item_id.clone(), location_id.clone(), settings, self.now);
        self.records.push(record.clone());
        self.records.sort_by(|a, b| a.location_id.cmp(&b.location_id));
        Ok(record)
    }

    pub fn reserve(&mut self, quantity: i64) -> InventoryResult<Vec<Allocation>> {
        if quantity <= 0 {
            return Err(InventoryError::invalid_quantity(format!(
                "reservation quantity must be positive (got {quantity})"
            )));
        }

        let available = self.available(None);
        if available < quantity {
            return Err(InventoryError::InsufficientStock {
                item_id: self.item_id.clone(),
                requested: quantity,
                available,
            });
        }

        let now = self.now;
        let mut remaining = quantity;
        let mut allocations = Vec::new();
        for rec in self.records.iter_mut() {
            if remaining == 0 {
                break;
            }
            let take = rec.available_quantity.min(remaining);
            if take <= 0 {
                continue;
            }
            rec.available_quantity -= take;
            rec.reserved_quantity += take;
            rec.updated_at = now;
            remaining -= take;
            allocations.push(Allocation::new(rec.location_id.clone(), take));
        }

        if remaining != 0 {
            return Err(invariant_violation(
                &self.item_id,
                format!("aggregate availability {available} did not cover {quantity} across locations"),
            ));
        }
        Ok(allocations)
    }

    pub fn release(&mut self, allocations: &[Allocation]) -> InventoryResult<()> {
        let item_id = self.item_id.clone();
        let now = self.now;
        for alloc in allocations {
            let Some(rec) = self.record_mut(&alloc.location_id) else {
                return Err(invariant_violation(
                    &item_id,
                    format!("release references unknown location {}", alloc.location_id),
                ));
            };
            if alloc.quantity <= 0 || rec.reserved_quantity < alloc.quantity {
                let detail = format!(
                    "release of {} at {} exceeds reserved {}",
                    alloc.quantity, alloc.location_id, rec.reserved_quantity
                );
                return Err(invariant_violation(&item_id, detail));
            }
            rec.reserved_quantity -= alloc.quantity;
            rec.available_quantity += alloc.quantity;
            rec.updated_at = now;
        }
        Ok(())
    }

    pub fn allocate(&mut self, allocations: &[Allocation]) -> InventoryResult<()> {
        let item_id = self.item_id.clone();
        let now = self.now;
        for alloc in allocations {
            let Some(rec) = self.record_mut(&alloc.location_id) else {
                return Err(invariant_violation(
                    &item_id,
                    format!("allocation references unknown location {}", alloc.location_id),
                ));
            };
            if alloc.quantity <= 0
                || rec.reserved_quantity < alloc.quantity
                || rec.total_quantity < alloc.quantity
            {
                let detail = format!(
                    "allocation of {} at {} exceeds reserved {} / total {}",
                    alloc.quantity, alloc.location_id, rec.reserved_quantity, rec.total_quantity
                );
                return Err(invariant_violation(&item_id, detail));
            }
            rec.reserved_quantity -= alloc.quantity;
            rec.total_quantity -= alloc.quantity;
            rec.updated_at = now;
        }
        Ok(())
    }

    pub fn adjust(&mut self, location_id: &LocationId, delta: i64, reason: AdjustReason) -> InventoryResult<StockRecord> {
        reason.check_delta(delta)?;

        let item_id = self.item_id.clone();
        let now = self.now;
        let Some(rec) = self.record_mut(location_id) else {
            return Err(InventoryError::UnknownRecord {
                item_id,
                location_id: location_id.clone(),
            });
        };

        let (Some(new_total), Some(new_available)) = (
            rec.total_quantity.checked_add(delta),
            rec.available_quantity.checked_add(delta),
        ) else {
            return Err(InventoryError::invalid_quantity(format!("delta {delta} overflows stock quantities")));
        };

        if new_total < 0 || new_available < 0 {
            let detail = format!("{reason} of {delta} would leave total={new_total}, available={new_available}");
            error!(alert = true, item_id = %item_id, location_id = %location_id, detail = %detail, "adjustment rejected: negative stock");
            return Err(InventoryError::NegativeStock {
                item_id,
                location_id: location_id.clone(),
                detail,
            });
        }

        rec.total_quantity = new_total;
        rec.available_quantity = new_available;
        rec.updated_at = now;
        Ok(rec.clone())
    }

    /// Check invariants and persist the working copy.
    pub fn commit(&mut self) -> InventoryResult<()> {
        if self.records == self.persisted {
            return Ok(());
        }
        for rec in &self.records {
            if let Err(err) = rec.check_invariants() {
                return Err(invariant_violation(&self.item_id, err.to_string()));
            }
        }
        self.store.save(&self.item_id, &self.records)?;
        self.persisted = self.records.clone();
        Ok(())
    }

    /// Discard all changes made in this scope, including committed ones.
    pub fn rollback(&mut self) -> InventoryResult<()> {
        self.records = self.base.clone();
        if self.persisted != self.base {
            self.store.save(&self.item_id, &self.base)?;
            self.persisted = self.base.clone();
        }
        Ok(())
    }
}
