//! Background workers fed by the event bus.

pub mod event_log;
pub mod event_worker;

pub use event_log::EventLog;
pub use event_worker::{EventWorker, WorkerHandle};
