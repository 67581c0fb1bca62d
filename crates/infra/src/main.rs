use anyhow::Context;

use stockhold_infra::{InventoryRuntime, StockholdConfig};
use stockhold_inventory::ReportFilter;

/// Start the runtime, apply seed data, expire anything overdue and print a stock report.
///
/// Usage: `stockhold [SEED_FILE]` (falls back to `STOCKHOLD_SEED_FILE`).
fn main() -> anyhow::Result<()> {
    let mut config = StockholdConfig::from_env().context("loading configuration")?;
    stockhold_observability::init_with(&config.log);

    if let Some(path) = std::env::args_os().nth(1) {
        config.seed_file = Some(path.into());
    }
    if config.seed_file.is_none() {
        tracing::warn!("no seed file given; the report will be empty");
    }

    let runtime = InventoryRuntime::in_memory(config)?;

    let expired = runtime.service().expire_overdue()?;
    tracing::info!(expired, "startup sweep complete");

    let report = runtime.service().report(&ReportFilter::all())?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    runtime.shutdown();
    Ok(())
}
