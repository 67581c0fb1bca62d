//! Stock report: per-record lines plus a summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockhold_core::{ItemId, LocationId};

use crate::record::{StockRecord, StockStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(default)]
    pub location_id: Option<LocationId>,
    #[serde(default)]
    pub status: Option<StockStatus>,
}

impl ReportFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn at_location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_status(mut self, status: StockStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, record: &StockRecord) -> bool {
        self.location_id.as_ref().is_none_or(|loc| &record.location_id == loc)
            && self.status.is_none_or(|status| record.status() == status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLine {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub total_quantity: i64,
    pub available_quantity: i64,
    pub reserved_quantity: i64,
    pub reorder_point: i64,
    pub status: StockStatus,
    pub needs_reorder: bool,
    pub unit_cost: i64,
    pub total_value: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<&StockRecord> for ReportLine {
    fn from(record: &StockRecord) -> Self {
        Self {
            item_id: record.item_id.clone(),
            location_id: record.location_id.clone(),
            total_quantity: record.total_quantity,
            available_quantity: record.available_quantity,
            reserved_quantity: record.reserved_quantity,
            reorder_point: record.reorder_point,
            status: record.status(),
            needs_reorder: record.needs_reorder(),
            unit_cost: record.unit_cost,
            total_value: record.total_value(),
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_records: usize,
    pub total_quantity: i64,
    pub total_available: i64,
    pub total_reserved: i64,
    pub total_value: i64,
    pub needs_reorder: usize,
    pub generated_at: DateTime<Utc>,
    pub filters: ReportFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub summary: ReportSummary,
    pub items: Vec<ReportLine>,
}

impl InventoryReport {
    /// Lines keep the order of `records`.
    pub fn build(records: &[StockRecord], filter: &ReportFilter, generated_at: DateTime<Utc>) -> Self {
        let items: Vec<ReportLine> = records
            .iter()
            .filter(|r| filter.matches(r))
            .map(ReportLine::from)
            .collect();

        let summary = ReportSummary {
            total_records: items.len(),
            total_quantity: items.iter().map(|l| l.total_quantity).sum(),
            total_available: items.iter().map(|l| l.available_quantity).sum(),
            total_reserved: items.iter().map(|l| l.reserved_quantity).sum(),
            total_value: items.iter().fold(0i64, |acc, l| acc.saturating_add(l.total_value)),
            needs_reorder: items.iter().filter(|l| l.needs_reorder).count(),
            generated_at,
            filters: filter.clone(),
        };

        Self { summary, items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StockSettings;

    fn rec(loc: &str, qty: i64, reorder_point: i64, unit_cost: i64) -> StockRecord {
        StockRecord::provisioned(
            ItemId::new("SKU-1"),
            LocationId::new(loc),
            &StockSettings::new(qty)
                .with_reorder(reorder_point, 10)
                .with_unit_cost(unit_cost),
            Utc::now(),
        )
    }

    #[test]
    fn summary_totals_match_lines() {
        let records = vec![rec("WH-1", 10, 3, 200), rec("WH-2", 2, 3, 200), rec("WH-3", 0, 3, 50)];
        let report = InventoryReport::build(&records, &ReportFilter::all(), Utc::now());

        assert_eq!(report.summary.total_records, 3);
        assert_eq!(report.summary.total_quantity, 12);
        assert_eq!(report.summary.total_value, 12 * 200);
        assert_eq!(report.summary.needs_reorder, 2);
        assert_eq!(report.items[2].status, StockStatus::OutOfStock);
    }

    #[test]
    fn filters_narrow_lines_and_are_echoed() {
        let records = vec![rec("WH-1", 10, 3, 1), rec("WH-2", 2, 3, 1)];

        let low = ReportFilter::all().with_status(StockStatus::LowStock);
        let report = InventoryReport::build(&records, &low, Utc::now());
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].location_id.as_str(), "WH-2");
        assert_eq!(report.summary.filters, low);

        let at_wh1 = ReportFilter::all().at_location(LocationId::new("WH-1"));
        assert_eq!(InventoryReport::build(&records, &at_wh1, Utc::now()).items.len(), 1);
    }

    #[test]
    fn report_serializes_for_the_api_layer() {
        let report = InventoryReport::build(&[rec("WH-1", 2, 3, 1)], &ReportFilter::all(), Utc::now());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["items"][0]["status"], "LOW_STOCK");
        assert_eq!(json["summary"]["total_records"], 1);
    }
}
