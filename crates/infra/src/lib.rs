//! Infrastructure layer: configuration, seed data, runtime wiring and workers.

pub mod config;
pub mod runtime;
pub mod seed;
pub mod workers;


pub use config::{ConfigError, StockholdConfig};
pub use runtime::{InventoryBus, InventoryRuntime};
pub use seed::{Seed, SeedItem, SeedOutcome};
