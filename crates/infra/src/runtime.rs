//! In-process wiring: stores, bus, expiry thread and the inventory service.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use stockhold_core::SystemClock;
use stockhold_events::InMemoryEventBus;
use stockhold_inventory::{
    BusPublisher, InventoryEnvelope, InventoryService, InventoryStores, ThreadExpiryScheduler,
};

use crate::config::StockholdConfig;
use crate::seed::{Seed, SeedOutcome};
use crate::workers::{EventLog, WorkerHandle};

pub type InventoryBus = InMemoryEventBus<InventoryEnvelope>;

pub struct InventoryRuntime {
    config: StockholdConfig,
    service: Arc<InventoryService>,
    bus: Arc<InventoryBus>,
    scheduler: Arc<ThreadExpiryScheduler>,
    event_log: EventLog,
    event_log_worker: Option<WorkerHandle>,
}

impl core::fmt::Debug for InventoryRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InventoryRuntime")
            .field("config", &self.config)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl InventoryRuntime {
    /// Wire everything over in-memory stores. Applies the seed file if configured.
    pub fn in_memory(config: StockholdConfig) -> anyhow::Result<Self> {
        let bus = Arc::new(InventoryBus::new());

        // Attach before anything publishes.
        let event_log = EventLog::new();
        let event_log_worker = event_log
            .attach("stockhold-event-log", &bus)
            .context("spawning event log worker")?;

        let scheduler = Arc::new(
            ThreadExpiryScheduler::spawn("stockhold-expiry").context("spawning expiry scheduler")?,
        );

        let service = Arc::new(InventoryService::new(
            InventoryStores::in_memory(),
            scheduler.clone(),
            Arc::new(BusPublisher::new(bus.clone())),
            Arc::new(SystemClock),
            config.reservation_policy(),
        ));

        let runtime = Self {
            config,
            service,
            bus,
            scheduler,
            event_log,
            event_log_worker: Some(event_log_worker),
        };

        if let Some(path) = runtime.config.seed_file.clone() {
            runtime.seed(&Seed::load(&path)?)?;
        }
        let restored = runtime.service.restore()?;

        info!(
            reservation_ttl_secs = runtime.config.reservation_ttl_secs,
            restored,
            "inventory runtime started"
        );
        Ok(runtime)
    }

    pub fn seed(&self, seed: &Seed) -> anyhow::Result<SeedOutcome> {
        seed.apply(&self.service)
    }

    pub fn config(&self) -> &StockholdConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<InventoryService> {
        &self.service
    }

    pub fn bus(&self) -> &Arc<InventoryBus> {
        &self.bus
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Stop the expiry thread, then let the event log drain and stop.
    pub fn shutdown(mut self) {
        self.scheduler.shutdown();
        if let Some(worker) = self.event_log_worker.take() {
            worker.shutdown();
        }
        info!(events = self.event_log.total(), "inventory runtime stopped");
    }
}
