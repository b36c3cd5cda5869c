//! Dashboard counters and report aggregates over one tenant's snapshot.

use serde::Serialize;
use zinic_core::models::request::RequestStatus;
use zinic_core::models::tenant::TenantCode;

use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_items: usize,
    pub low_stock_items: usize,
    pub pending_requests: usize,
    pub vendors: usize,
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceSummary {
    pub total_paid: f64,
    pub total_pending: f64,
    pub total_payable: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventorySummary {
    pub total_items: usize,
    pub low_stock_count: usize,
    pub category_distribution: Vec<NamedCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportData {
    pub finance: FinanceSummary,
    pub inventory: InventorySummary,
    /// Requisitions raised per department.
    pub consumption_by_department: Vec<NamedCount>,
}

/// Count occurrences, keeping first-seen order.
fn tally<'a>(names: impl Iterator<Item = &'a str>) -> Vec<NamedCount> {
    let mut counts: Vec<NamedCount> = Vec::new();
    for name in names {
        match counts.iter_mut().find(|c| c.name == name) {
            Some(count) => count.value += 1,
            None => counts.push(NamedCount {
                name: name.to_string(),
                value: 1,
            }),
        }
    }
    counts
}

pub fn dashboard_stats(snapshot: &Snapshot, code: &TenantCode) -> DashboardStats {
    let items = snapshot.items_of(code);
    DashboardStats {
        total_items: items.len(),
        low_stock_items: items.iter().filter(|i| i.is_low()).count(),
        pending_requests: snapshot
            .requests_of(code)
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count(),
        vendors: snapshot.vendors_of(code).len(),
        users: snapshot.users_of(code).len(),
    }
}

pub fn report(snapshot: &Snapshot, code: &TenantCode) -> ReportData {
    let items = snapshot.items_of(code);
    let requests = snapshot.requests_of(code);
    let vendors = snapshot.vendors_of(code);

    let (total_paid, total_pending) = vendors
        .iter()
        .flat_map(|v| v.invoices.iter())
        .fold((0.0, 0.0), |(paid, pending), inv| {
            (paid + inv.paid_amount, pending + inv.outstanding())
        });

    ReportData {
        finance: FinanceSummary {
            total_paid,
            total_pending,
            total_payable: total_paid + total_pending,
        },
        inventory: InventorySummary {
            total_items: items.len(),
            low_stock_count: items.iter().filter(|i| i.is_low()).count(),
            category_distribution: tally(items.iter().map(|i| i.category.as_str())),
        },
        consumption_by_department: tally(requests.iter().map(|r| r.department.as_str())),
    }
}
