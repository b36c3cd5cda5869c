//! Stock requisition domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::tenant::TenantCode;

/// Tolerance for comparing fractional quantities (kg, litres).
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Requisition status.
///
/// ```text
/// PENDING ──> APPROVED ──> TRANSFERRED ──(all lines consumed)──> CONSUMED
///    └──> REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Transferred,
    Consumed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Transferred => "TRANSFERRED",
            RequestStatus::Consumed => "CONSUMED",
        }
    }

    /// Transitions a reviewer may issue. `CONSUMED` is never a target: it
    /// is derived from the consumption ledger.
    pub fn can_transition_to(self, target: RequestStatus) -> bool {
        matches!(
            (self, target),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Approved, RequestStatus::Transferred)
        )
    }

    /// Consumption may be logged once stock has been handed over.
    pub fn accepts_consumption(self) -> bool {
        matches!(self, RequestStatus::Transferred | RequestStatus::Consumed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "REJECTED" => Ok(RequestStatus::Rejected),
            "TRANSFERRED" => Ok(RequestStatus::Transferred),
            "CONSUMED" => Ok(RequestStatus::Consumed),
            _ => Err(format!("unknown request status: {raw}")),
        }
    }
}

/// Append-only record of partial usage against a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionLog {
    pub id: String,
    pub amount: f64,
    pub remark: String,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub actor_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLine {
    pub item_id: String,
    /// Denormalized for display.
    pub item_name: String,
    pub quantity: f64,
    pub consumed_quantity: f64,
    pub logs: Vec<ConsumptionLog>,
}

impl RequestLine {
    pub fn remaining(&self) -> f64 {
        (self.quantity - self.consumed_quantity).max(0.0)
    }

    pub fn is_fully_consumed(&self) -> bool {
        self.consumed_quantity + QUANTITY_EPSILON >= self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRequest {
    pub id: String,
    pub tenant: TenantCode,
    pub requester_id: String,
    pub requester_name: String,
    pub department: String,
    pub lines: Vec<RequestLine>,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl StockRequest {
    pub fn is_fully_consumed(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(RequestLine::is_fully_consumed)
    }

    pub fn line(&self, item_id: &str) -> Option<&RequestLine> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewRequestLine {
    pub item_id: String,
    pub quantity: f64,
}

/// Payload for raising a requisition. The requester is the acting user.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub department: String,
    pub lines: Vec<NewRequestLine>,
    pub notes: Option<String>,
}

/// Consumption to record against one line of a request.
#[derive(Debug, Clone)]
pub struct LogConsumption {
    pub request_id: String,
    pub item_id: String,
    pub amount: f64,
    pub remark: String,
}
