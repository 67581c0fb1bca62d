//! Inventory event payloads and the publishing seam.
//!
//! Events are published after the item scope that produced them is released.
//! Publishing is fire-and-forget: a failed publish is logged and never undoes
//! the state change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use stockhold_core::{ItemId, LocationId, ReservationId};
use stockhold_events::{Event, EventBus, EventEnvelope};

use crate::record::{AdjustReason, Allocation, StockRecord};
use crate::reorder::ReorderRequest;
use crate::reservation::Reservation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub initial_quantity: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

impl ItemCreated {
    pub fn from_record(record: &StockRecord) -> Self {
        Self {
            item_id: record.item_id.clone(),
            location_id: record.location_id.clone(),
            initial_quantity: record.total_quantity,
            reorder_point: record.reorder_point,
            reorder_quantity: record.reorder_quantity,
            occurred_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdated {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub delta: i64,
    pub reason: AdjustReason,
    pub available_quantity: i64,
    pub total_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCreated {
    pub reservation_id: ReservationId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub expiry_time: DateTime<Utc>,
    pub allocations: Vec<Allocation>,
    pub order_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ReservationCreated {
    pub fn from_reservation(res: &Reservation) -> Self {
        Self {
            reservation_id: res.id,
            item_id: res.item_id.clone(),
            quantity: res.quantity,
            expiry_time: res.expiry_time,
            allocations: res.allocations.clone(),
            order_id: res.order_id.clone(),
            occurred_at: res.created_at,
        }
    }
}

/// Payload shared by the terminal reservation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationChanged {
    pub reservation_id: ReservationId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub order_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ReservationChanged {
    /// Built from a resolved reservation; `occurred_at` is its resolution time.
    pub fn from_reservation(res: &Reservation) -> Self {
        Self {
            reservation_id: res.id,
            item_id: res.item_id.clone(),
            quantity: res.quantity,
            order_id: res.order_id.clone(),
            occurred_at: res.resolved_at.unwrap_or(res.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    StockUpdated(StockUpdated),
    ReservationCreated(ReservationCreated),
    ReservationConfirmed(ReservationChanged),
    ReservationCancelled(ReservationChanged),
    ReservationExpired(ReservationChanged),
    ReorderTriggered(ReorderRequest),
}

impl InventoryEvent {
    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::ItemCreated(e) => &e.item_id,
            Self::StockUpdated(e) => &e.item_id,
            Self::ReservationCreated(e) => &e.item_id,
            Self::ReservationConfirmed(e) | Self::ReservationCancelled(e) | Self::ReservationExpired(e) => {
                &e.item_id
            }
            Self::ReorderTriggered(e) => &e.item_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::ItemCreated(_) => "item_created",
            Self::StockUpdated(_) => "stock_updated",
            Self::ReservationCreated(_) => "reservation_created",
            Self::ReservationConfirmed(_) => "reservation_confirmed",
            Self::ReservationCancelled(_) => "reservation_cancelled",
            Self::ReservationExpired(_) => "reservation_expired",
            Self::ReorderTriggered(_) => "reorder_triggered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::ItemCreated(e) => e.occurred_at,
            Self::StockUpdated(e) => e.occurred_at,
            Self::ReservationCreated(e) => e.occurred_at,
            Self::ReservationConfirmed(e) | Self::ReservationCancelled(e) | Self::ReservationExpired(e) => {
                e.occurred_at
            }
            Self::ReorderTriggered(e) => e.occurred_at,
        }
    }
}

pub type InventoryEnvelope = EventEnvelope<InventoryEvent>;

/// Outbound event seam. Implementations must not block for long; they are
/// called on the request path (outside any item scope).
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: InventoryEvent);
}

/// Wraps events in envelopes and publishes them on a bus.
#[derive(Debug)]
pub struct BusPublisher<B> {
    bus: B,
}

impl<B> BusPublisher<B>
where
    B: EventBus<InventoryEnvelope>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> EventPublisher for BusPublisher<B>
where
    B: EventBus<InventoryEnvelope>,
{
    fn publish(&self, event: InventoryEvent) {
        let envelope = EventEnvelope::wrap(event.item_id().clone(), event);
        let event_id = envelope.event_id();
        let event_type = envelope.event_type().to_string();
        if let Err(err) = self.bus.publish(envelope) {
            warn!(event_id = %event_id, event_type = %event_type, error = %err, "failed to publish inventory event");
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: InventoryEvent) {}
}
