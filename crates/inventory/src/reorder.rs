//! Reorder evaluation: turns low or empty locations into replenishment requests.
//!
//! The trigger only emits `reorder_triggered` events. Placing purchase orders is
//! left to whoever consumes them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stockhold_core::{Clock, ItemId, LocationId, SupplierId};

use crate::error::{InventoryError, InventoryResult};
use crate::events::{EventPublisher, InventoryEvent};
use crate::ledger::StockLedger;
use crate::record::{StockRecord, StockStatus, status_of};
use crate::store::Store;

pub type RuleKey = (ItemId, LocationId);

/// Longest supplier lead time a rule may carry.
pub const MAX_LEAD_TIME_DAYS: u32 = 365;

/// Who replenishes an item at a location, and how long it takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRule {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub supplier_id: SupplierId,
    pub is_active: bool,
    #[serde(default)]
    pub lead_time_days: u32,
}

impl ReorderRule {
    pub fn new(item_id: ItemId, location_id: LocationId, supplier_id: SupplierId) -> Self {
        Self {
            item_id,
            location_id,
            supplier_id,
            is_active: true,
            lead_time_days: 0,
        }
    }

    pub fn with_lead_time(mut self, days: u32) -> Self {
        self.lead_time_days = days;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn key(&self) -> RuleKey {
        (self.item_id.clone(), self.location_id.clone())
    }

    pub fn validate(&self) -> InventoryResult<()> {
        if self.lead_time_days > MAX_LEAD_TIME_DAYS {
            return Err(InventoryError::invalid_quantity(format!(
                "lead time of {} days for {}@{} exceeds {MAX_LEAD_TIME_DAYS}",
                self.lead_time_days, self.item_id, self.location_id
            )));
        }
        Ok(())
    }
}

/// Payload of `reorder_triggered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub supplier_id: SupplierId,
    pub reorder_quantity: i64,
    pub current_available: i64,
    pub reorder_point: i64,
    pub status: StockStatus,
    /// `occurred_at` plus the rule's lead time.
    pub expected_by: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

impl ReorderRequest {
    fn for_record(
        record: &StockRecord,
        rule: &ReorderRule,
        status: StockStatus,
        at: DateTime<Utc>,
    ) -> InventoryResult<Self> {
        let expected_by = Duration::try_days(i64::from(rule.lead_time_days))
            .and_then(|lead| at.checked_add_signed(lead))
            .ok_or_else(|| {
                InventoryError::invalid_quantity(format!(
                    "lead time of {} days from {at} is out of range",
                    rule.lead_time_days
                ))
            })?;
        Ok(Self {
            item_id: record.item_id.clone(),
            location_id: record.location_id.clone(),
            supplier_id: rule.supplier_id.clone(),
            reorder_quantity: record.reorder_quantity,
            current_available: record.available_quantity,
            reorder_point: record.reorder_point,
            status,
            expected_by,
            occurred_at: at,
        })
    }
}

pub struct ReorderTrigger {
    ledger: Arc<StockLedger>,
    rules: Arc<dyn Store<RuleKey, ReorderRule>>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for ReorderTrigger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReorderTrigger").finish_non_exhaustive()
    }
}

impl ReorderTrigger {
    pub fn new(
        ledger: Arc<StockLedger>,
        rules: Arc<dyn Store<RuleKey, ReorderRule>>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            rules,
            publisher,
            clock,
        }
    }

    pub fn set_rule(&self, rule: ReorderRule) -> InventoryResult<()> {
        rule.validate()?;
        debug!(
            item_id = %rule.item_id,
            location_id = %rule.location_id,
            supplier_id = %rule.supplier_id,
            is_active = rule.is_active,
            "reorder rule set"
        );
        self.rules.upsert(rule.key(), rule)?;
        Ok(())
    }

    pub fn rule(&self, item_id: &ItemId, location_id: &LocationId) -> InventoryResult<Option<ReorderRule>> {
        Ok(self.rules.get(&(item_id.clone(), location_id.clone()))?)
    }

    pub fn rules(&self) -> InventoryResult<Vec<ReorderRule>> {
        let mut rules = self.rules.list()?;
        rules.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(rules)
    }

    /// Emit one request per LOW_STOCK/OUT_OF_STOCK location with an active rule.
    pub fn evaluate(&self, item_id: &ItemId) -> InventoryResult<Vec<ReorderRequest>> {
        let now = self.clock.now();
        let mut requests = Vec::new();

        for record in self.ledger.records(item_id)? {
            let status = status_of(&record);
            if status == StockStatus::InStock {
                continue;
            }
            match self.rules.get(&(record.item_id.clone(), record.location_id.clone()))? {
                Some(rule) if rule.is_active => {
                    requests.push(ReorderRequest::for_record(&record, &rule, status, now)?);
                }
                Some(_) => {
                    debug!(item_id = %item_id, location_id = %record.location_id, "reorder rule inactive; skipping");
                }
                None => {
                    debug!(item_id = %item_id, location_id = %record.location_id, "no reorder rule; skipping");
                }
            }
        }

        for request in &requests {
            info!(
                item_id = %request.item_id,
                location_id = %request.location_id,
                supplier_id = %request.supplier_id,
                reorder_quantity = request.reorder_quantity,
                current_available = request.current_available,
                status = %request.status,
                "reorder triggered"
            );
            self.publisher.publish(InventoryEvent::ReorderTriggered(request.clone()));
        }

        Ok(requests)
    }
}
