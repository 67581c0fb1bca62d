//! Audit log of published inventory events.
//!
//! Deduplicates on `event_id` (the bus is at-least-once) and keeps per-type counts.
//! Only the most recent [`DEDUPE_WINDOW`] ids are remembered.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use uuid::Uuid;

use stockhold_events::{Event, EventBus};
use stockhold_inventory::{InventoryEnvelope, InventoryEvent};

use super::event_worker::{EventWorker, WorkerHandle};

/// How many recent event ids are kept for redelivery detection.
pub const DEDUPE_WINDOW: usize = 4096;

#[derive(Debug, Default)]
struct LogState {
    seen: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    counts: BTreeMap<String, u64>,
}

impl LogState {
    /// `false` if `id` is still inside the window.
    fn remember(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > DEDUPE_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    state: Arc<Mutex<LogState>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach to `bus` on a background thread.
    pub fn attach<B>(&self, name: &str, bus: &B) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<InventoryEnvelope>,
    {
        let log = self.clone();
        EventWorker::spawn(name, bus, move |env: InventoryEnvelope| {
            log.record(&env);
            Ok::<(), Infallible>(())
        })
    }

    /// Returns `false` for a redelivered envelope.
    pub fn record(&self, env: &InventoryEnvelope) -> bool {
        {
            let mut state = self.state();
            if !state.remember(env.event_id()) {
                debug!(event_id = %env.event_id(), "duplicate event ignored");
                return false;
            }
            *state.counts.entry(env.event_type().to_string()).or_default() += 1;
        }

        match env.payload() {
            InventoryEvent::ReorderTriggered(req) => info!(
                event_id = %env.event_id(),
                item_id = %req.item_id,
                location_id = %req.location_id,
                supplier_id = %req.supplier_id,
                reorder_quantity = req.reorder_quantity,
                expected_by = %req.expected_by,
                "reorder request"
            ),
            payload => info!(
                event_id = %env.event_id(),
                event_type = env.event_type(),
                item_id = %env.item_id(),
                version = payload.version(),
                timestamp = %env.timestamp(),
                "inventory event"
            ),
        }
        true
    }

    pub fn count(&self, event_type: &str) -> u64 {
        self.state().counts.get(event_type).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.state().counts.clone()
    }

    pub fn total(&self) -> u64 {
        self.state().counts.values().sum()
    }
}
