//! Inventory reservation and stock ledger.
//!
//! - [`StockLedger`]: per-(item, location) quantities, serialized per item
//! - [`ReservationManager`]: reservation lifecycle with exactly-once terminal transitions
//! - [`ReorderTrigger`]: reorder requests for low/out-of-stock locations
//! - [`InventoryService`]: the query surface composed from the three
//!
//! Persistence and event delivery are collaborators behind [`StockStore`],
//! [`Store`] and [`EventPublisher`].

pub mod error;
pub mod events;
pub mod ledger;
pub mod manager;
pub mod record;
pub mod reorder;
pub mod report;
pub mod reservation;
pub mod scheduler;
pub mod service;
pub mod store;

pub use error::{ErrorKind, InventoryError, InventoryResult};
pub use events::{
    BusPublisher, EventPublisher, InventoryEnvelope, InventoryEvent, ItemCreated, NullPublisher,
    ReservationChanged, ReservationCreated, StockUpdated,
};
pub use ledger::{ItemTxn, StockLedger};
pub use manager::ReservationManager;
pub use record::{AdjustReason, Allocation, StockRecord, StockSettings, StockStatus, status_of};
pub use reorder::{MAX_LEAD_TIME_DAYS, ReorderRequest, ReorderRule, ReorderTrigger, RuleKey};
pub use report::{InventoryReport, ReportFilter, ReportLine, ReportSummary};
pub use reservation::{Reservation, ReservationPolicy, ReservationRequest, ReservationStatus};
pub use scheduler::{ExpiryCallback, ExpiryScheduler, ManualExpiryScheduler, ThreadExpiryScheduler};
pub use service::{InventoryService, InventoryStores};
pub use store::{InMemoryStockStore, InMemoryStore, StockStore, Store, StoreError};
