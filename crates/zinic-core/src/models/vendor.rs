//! Vendor and invoice domain models.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::request::QUANTITY_EPSILON;
use crate::models::tenant::TenantCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Credit,
    Cash,
    BankTransfer,
    Upi,
    Cheque,
}

impl PaymentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMode::Credit => "CREDIT",
            PaymentMode::Cash => "CASH",
            PaymentMode::BankTransfer => "BANK_TRANSFER",
            PaymentMode::Upi => "UPI",
            PaymentMode::Cheque => "CHEQUE",
        }
    }
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "CREDIT" => Ok(PaymentMode::Credit),
            "CASH" => Ok(PaymentMode::Cash),
            "BANK_TRANSFER" => Ok(PaymentMode::BankTransfer),
            "UPI" => Ok(PaymentMode::Upi),
            "CHEQUE" | "CHECK" => Ok(PaymentMode::Cheque),
            _ => Err(format!("unknown payment mode: {raw}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Paid,
    Partial,
    Unpaid,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Unpaid => "UNPAID",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub payment_mode: PaymentMode,
    pub notes: Option<String>,
}

impl Invoice {
    /// Derived from the amounts; any stored status is ignored.
    pub fn status(&self) -> InvoiceStatus {
        if self.paid_amount + QUANTITY_EPSILON >= self.total_amount {
            InvoiceStatus::Paid
        } else if self.paid_amount > 0.0 {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Unpaid
        }
    }

    pub fn outstanding(&self) -> f64 {
        self.total_amount - self.paid_amount
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub tenant: TenantCode,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub invoices: Vec<Invoice>,
}

/// Create-or-replace payload for a vendor's contact details. Invoices are
/// managed separately.
#[derive(Debug, Clone)]
pub struct SaveVendor {
    pub id: Option<String>,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
}

/// Create-or-replace payload for one invoice. `id = None` creates.
#[derive(Debug, Clone)]
pub struct SaveInvoice {
    pub id: Option<String>,
    pub invoice_number: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub payment_mode: PaymentMode,
    pub notes: Option<String>,
}
