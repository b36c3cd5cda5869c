//! Notifier that records device notifications in the log.

use tracing::info;
use zinic_core::collaborator::Notifier;

/// Logs each notification instead of delivering it. Used by the server
/// binary where no device channel is attached.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn new_order(&self, request_id: &str, department: &str) {
        info!(request_id, department, "New requisition awaiting approval");
    }

    fn low_stock(&self, item_name: &str, current_stock: f64) {
        info!(item = item_name, current_stock, "Stock at or below minimum level");
    }
}
