//! Stock item domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::tenant::TenantCode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: String,
    pub tenant: TenantCode,
    pub name: String,
    pub category: String,
    /// Unit of measure (e.g. `pcs`, `kg`, `ltr`).
    pub unit: String,
    /// On-hand quantity; never negative.
    pub current_stock: f64,
    pub min_stock_level: f64,
    pub vendor_id: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl StockItem {
    /// At or below the minimum threshold. Derived, never stored.
    pub fn is_low(&self) -> bool {
        self.current_stock <= self.min_stock_level
    }
}

/// Create-or-update payload for a stock item. `id = None` creates.
#[derive(Debug, Clone)]
pub struct SaveItem {
    pub id: Option<String>,
    pub name: String,
    pub category: String,
    pub unit: String,
    /// Opening stock; ignored when updating an existing item.
    pub current_stock: f64,
    pub min_stock_level: f64,
    pub vendor_id: Option<String>,
}
