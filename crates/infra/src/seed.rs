//! Seed data: stock records and reorder rules provisioned at startup.
//!
//! ```json
//! {
//!   "items": [
//!     {"item_id": "SKU-1", "location_id": "WH-1", "initial_quantity": 10,
//!      "reorder_point": 3, "reorder_quantity": 20, "unit_cost": 450}
//!   ],
//!   "rules": [
//!     {"item_id": "SKU-1", "location_id": "WH-1", "supplier_id": "ACME",
//!      "is_active": true, "lead_time_days": 4}
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockhold_core::{ItemId, LocationId};
use stockhold_inventory::{InventoryError, InventoryService, ReorderRule, StockSettings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedItem {
    pub item_id: ItemId,
    pub location_id: LocationId,
    #[serde(flatten)]
    pub settings: StockSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub items: Vec<SeedItem>,
    #[serde(default)]
    pub rules: Vec<ReorderRule>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    pub rules: usize,
    pub created: usize,
    /// Records that already existed and were left untouched.
    pub skipped: usize,
}

impl Seed {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing seed file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Rules go in first so provisioning already evaluates them.
    pub fn apply(&self, service: &InventoryService) -> anyhow::Result<SeedOutcome> {
        let mut outcome = SeedOutcome::default();

        for rule in &self.rules {
            service
                .set_reorder_rule(rule.clone())
                .with_context(|| format!("setting reorder rule for {}@{}", rule.item_id, rule.location_id))?;
            outcome.rules += 1;
        }

        for item in &self.items {
            match service.create_item(&item.item_id, &item.location_id, &item.settings) {
                Ok(_) => outcome.created += 1,
                Err(InventoryError::AlreadyProvisioned { .. }) => {
                    warn!(item_id = %item.item_id, location_id = %item.location_id, "seed record already provisioned; skipping");
                    outcome.skipped += 1;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("provisioning {}@{}", item.item_id, item.location_id));
                }
            }
        }

        info!(
            rules = outcome.rules,
            created = outcome.created,
            skipped = outcome.skipped,
            "seed applied"
        );
        Ok(outcome)
    }
}
