//! Outbound collaborators: device notifications and inventory insights.

use serde::{Deserialize, Serialize};

use crate::error::{ZinicError, ZinicResult};
use crate::models::item::StockItem;

/// Schedules device notifications. Delivery is the implementor's concern,
/// so calls are fire-and-forget.
pub trait Notifier: Send + Sync {
    /// A new `PENDING` requisition was raised.
    fn new_order(&self, request_id: &str, department: &str);

    /// An item moved from above to at/below its minimum threshold.
    fn low_stock(&self, item_name: &str, current_stock: f64);
}

/// Inventory line handed to the insight provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightItem {
    pub name: String,
    pub stock: f64,
    pub min: f64,
    pub category: String,
    pub unit: String,
}

impl From<&StockItem> for InsightItem {
    fn from(item: &StockItem) -> Self {
        Self {
            name: item.name.clone(),
            stock: item.current_stock,
            min: item.min_stock_level,
            category: item.category.clone(),
            unit: item.unit.clone(),
        }
    }
}

/// Produces a free-text audit of the inventory as a JSON document with
/// `summary` and `recommendations` fields.
pub trait InsightProvider: Send + Sync {
    fn inventory_insights(
        &self,
        items: &[InsightItem],
    ) -> impl Future<Output = ZinicResult<String>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryInsights {
    pub summary: String,
    pub recommendations: Vec<String>,
}

impl InventoryInsights {
    /// Reply used when the provider's output cannot be parsed.
    pub fn manual_audit() -> Self {
        Self {
            summary: "Automated audit unavailable: the insight reply could not be parsed. \
                      Manual audit recommended."
                .into(),
            recommendations: vec![
                "Check items currently below threshold levels".into(),
                "Review vendor lead times for perishable goods".into(),
                "Ensure pending requisitions are authorized".into(),
            ],
        }
    }
}

/// Parse a provider reply. Only the shape is checked, not the prose.
pub fn parse_insights(raw: &str) -> ZinicResult<InventoryInsights> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ZinicError::malformed("insights", "empty reply"));
    }
    serde_json::from_str(raw).map_err(|e| ZinicError::malformed("insights", e.to_string()))
}
