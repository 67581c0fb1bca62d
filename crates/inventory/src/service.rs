//! `InventoryService`: the query surface consumed by an API layer.
//!
//! Composes the ledger, the reservation manager and the reorder trigger over a
//! shared set of stores, publisher and clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use stockhold_core::{Clock, ItemId, LocationId, ReservationId};

use crate::error::{InventoryError, InventoryResult};
use crate::events::{EventPublisher, InventoryEvent, ItemCreated, StockUpdated};
use crate::ledger::StockLedger;
use crate::manager::ReservationManager;
use crate::record::{AdjustReason, StockRecord, StockSettings};
use crate::reorder::{ReorderRequest, ReorderRule, ReorderTrigger, RuleKey};
use crate::report::{InventoryReport, ReportFilter};
use crate::reservation::{Reservation, ReservationPolicy, ReservationRequest};
use crate::scheduler::ExpiryScheduler;
use crate::store::{InMemoryStockStore, InMemoryStore, StockStore, Store};

/// Persistence collaborators, one per component.
#[derive(Clone)]
pub struct InventoryStores {
    pub stock: Arc<dyn StockStore>,
    pub reservations: Arc<dyn Store<ReservationId, Reservation>>,
    pub rules: Arc<dyn Store<RuleKey, ReorderRule>>,
}

impl InventoryStores {
    pub fn in_memory() -> Self {
        Self {
            stock: Arc::new(InMemoryStockStore::new()),
            reservations: Arc::new(InMemoryStore::new()),
            rules: Arc::new(InMemoryStore::new()),
        }
    }
}

pub struct InventoryService {
    ledger: Arc<StockLedger>,
    manager: Arc<ReservationManager>,
    reorder: Arc<ReorderTrigger>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for InventoryService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InventoryService")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl InventoryService {
    pub fn new(
        stores: InventoryStores,
        scheduler: Arc<dyn ExpiryScheduler>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: ReservationPolicy,
    ) -> Self {
        let ledger = Arc::new(StockLedger::new(stores.stock, clock.clone()));
        let reorder = Arc::new(ReorderTrigger::new(
            ledger.clone(),
            stores.rules,
            publisher.clone(),
            clock.clone(),
        ));
        let manager = ReservationManager::new(
            ledger.clone(),
            stores.reservations,
            scheduler,
            reorder.clone(),
            publisher.clone(),
            clock.clone(),
            policy,
        );
        Self {
            ledger,
            manager,
            reorder,
            publisher,
            clock,
        }
    }

    pub fn ledger(&self) -> &Arc<StockLedger> {
        &self.ledger
    }

    pub fn manager(&self) -> &Arc<ReservationManager> {
        &self.manager
    }

    pub fn reorder(&self) -> &Arc<ReorderTrigger> {
        &self.reorder
    }

    /// Provision stock for an item at a location.
    pub fn create_item(
        &self,
        item_id: &ItemId,
        location_id: &LocationId,
        settings: &StockSettings,
    ) -> InventoryResult<StockRecord> {
        let record = self.ledger.provision(item_id, location_id, settings)?;
        info!(
            item_id = %item_id,
            location_id = %location_id,
            quantity = record.total_quantity,
            reorder_point = record.reorder_point,
            "item created"
        );
        self.publisher
            .publish(InventoryEvent::ItemCreated(ItemCreated::from_record(&record)));
        self.evaluate_reorder_logged(item_id);
        Ok(record)
    }

    /// Whether `quantity` units are available (at one location, or across all).
    pub fn check_availability(
        &self,
        item_id: &ItemId,
        quantity: i64,
        location_id: Option<&LocationId>,
    ) -> InventoryResult<bool> {
        if quantity <= 0 {
            return Err(InventoryError::invalid_quantity(format!(
                "availability check needs a positive quantity (got {quantity})"
            )));
        }
        Ok(self.ledger.get_available(item_id, location_id)? >= quantity)
    }

    pub fn get_available(&self, item_id: &ItemId, location_id: Option<&LocationId>) -> InventoryResult<i64> {
        self.ledger.get_available(item_id, location_id)
    }

    pub fn reserve(
        &self,
        item_id: &ItemId,
        quantity: i64,
        expiry_time: DateTime<Utc>,
    ) -> InventoryResult<ReservationId> {
        self.manager.reserve(item_id, quantity, expiry_time)
    }

    /// Reserve with the configured default lifetime.
    pub fn reserve_for(&self, item_id: &ItemId, quantity: i64) -> InventoryResult<ReservationId> {
        let expiry = self.manager.policy().default_expiry(self.clock.now())?;
        self.manager.reserve(item_id, quantity, expiry)
    }

    pub fn place(&self, request: ReservationRequest) -> InventoryResult<Reservation> {
        self.manager.place(request)
    }

    pub fn confirm(&self, id: ReservationId) -> InventoryResult<bool> {
        self.manager.confirm(id)
    }

    pub fn cancel(&self, id: ReservationId) -> InventoryResult<bool> {
        self.manager.cancel(id)
    }

    pub fn reservation(&self, id: ReservationId) -> InventoryResult<Option<Reservation>> {
        self.manager.get(id)
    }

    pub fn active_reservations(&self) -> Vec<Reservation> {
        self.manager.active()
    }

    /// Receive, ship or correct stock outside the reservation flow.
    pub fn adjust(
        &self,
        item_id: &ItemId,
        location_id: &LocationId,
        delta: i64,
        reason: AdjustReason,
    ) -> InventoryResult<StockRecord> {
        let record = self.ledger.adjust(item_id, location_id, delta, reason)?;
        info!(
            item_id = %item_id,
            location_id = %location_id,
            delta,
            reason = %reason,
            available = record.available_quantity,
            "stock updated"
        );
        self.publisher.publish(InventoryEvent::StockUpdated(StockUpdated {
            item_id: item_id.clone(),
            location_id: location_id.clone(),
            delta,
            reason,
            available_quantity: record.available_quantity,
            total_quantity: record.total_quantity,
            occurred_at: record.updated_at,
        }));
        self.evaluate_reorder_logged(item_id);
        Ok(record)
    }

    pub fn set_reorder_rule(&self, rule: ReorderRule) -> InventoryResult<()> {
        self.reorder.set_rule(rule)
    }

    pub fn reorder_rule(&self, item_id: &ItemId, location_id: &LocationId) -> InventoryResult<Option<ReorderRule>> {
        self.reorder.rule(item_id, location_id)
    }

    pub fn evaluate_reorder(&self, item_id: &ItemId) -> InventoryResult<Vec<ReorderRequest>> {
        self.reorder.evaluate(item_id)
    }

    pub fn report(&self, filter: &ReportFilter) -> InventoryResult<InventoryReport> {
        let records = self.ledger.all_records()?;
        Ok(InventoryReport::build(&records, filter, self.clock.now()))
    }

    pub fn expire_overdue(&self) -> InventoryResult<usize> {
        self.manager.expire_overdue()
    }

    /// Reload pending reservations after a restart.
    pub fn restore(&self) -> InventoryResult<usize> {
        self.manager.restore_active()
    }

    fn evaluate_reorder_logged(&self, item_id: &ItemId) {
        if let Err(err) = self.reorder.evaluate(item_id) {
            warn!(item_id = %item_id, error = %err, "reorder evaluation failed");
        }
    }
}
