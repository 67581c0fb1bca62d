//! `stockhold-core`: shared building blocks for the stock ledger.
//!
//! Identifiers and the time source. No storage, no IO.

pub mod clock;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{IdError, ItemId, LocationId, ReservationId, SupplierId};
