//! Translation between remote rows and domain entities.
//!
//! Each entity has a private row struct mirroring the remote column names
//! (`client_id`, `current_stock`, ...). Decoding is strict: a row missing a
//! required column, carrying a value of the wrong type, or naming an
//! unknown enum variant fails with `MalformedRecord`. Numeric columns
//! accept JSON numbers or numeric strings; enum columns are matched
//! case-insensitively. Nested JSON columns (request lines, invoices) keep
//! their camelCase keys.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ZinicError, ZinicResult};
use crate::models::demo::{DemoLead, LeadStatus};
use crate::models::department::Department;
use crate::models::item::StockItem;
use crate::models::request::{ConsumptionLog, RequestLine, StockRequest};
use crate::models::tenant::{Tenant, TenantCode};
use crate::models::user::User;
use crate::models::vendor::{Invoice, Vendor};
use crate::permission::Grants;
use crate::repository::{Row, Table};

/// Row ⇄ entity translation for one table.
pub trait RowMapping: Sized {
    const TABLE: Table;
    const ENTITY: &'static str;

    fn from_row(row: Row) -> ZinicResult<Self>;
    fn to_row(&self) -> Row;
}

/// Decode every row, failing on the first malformed one.
pub fn decode_all<T: RowMapping>(rows: Vec<Row>) -> ZinicResult<Vec<T>> {
    rows.into_iter().map(T::from_row).collect()
}

/// Decode a row that must be present (e.g. the tenant of a user that was
/// just matched). Absence is a data error, not a lookup miss.
pub fn decode_required<T: RowMapping>(row: Option<Row>) -> ZinicResult<T> {
    match row {
        Some(row) => T::from_row(row),
        None => Err(ZinicError::malformed(T::ENTITY, "expected a row, found none")),
    }
}

fn decode<R: DeserializeOwned>(entity: &str, row: Row) -> ZinicResult<R> {
    serde_json::from_value(Value::Object(row)).map_err(|e| ZinicError::malformed(entity, e.to_string()))
}

fn encode<R: Serialize>(row: &R) -> Row {
    match serde_json::to_value(row) {
        Ok(Value::Object(map)) => map,
        _ => Row::new(),
    }
}

fn tenant_code(entity: &str, raw: &str) -> ZinicResult<TenantCode> {
    let code = TenantCode::new(raw);
    if code.is_empty() {
        return Err(ZinicError::malformed(entity, "empty tenant code"));
    }
    Ok(code)
}

fn parse_enum<T>(entity: &str, raw: &str) -> ZinicResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse().map_err(|e: String| ZinicError::malformed(entity, e))
}

fn non_negative(entity: &str, field: &str, value: f64) -> ZinicResult<f64> {
    if value < 0.0 {
        return Err(ZinicError::malformed(entity, format!("{field} is negative: {value}")));
    }
    Ok(value)
}

mod coerce {
    use chrono::NaiveDate;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numeric {
        Number(f64),
        Text(String),
    }

    pub fn number<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
        let value = match Numeric::deserialize(de)? {
            Numeric::Number(n) => n,
            Numeric::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| D::Error::custom(format!("not a number: {s:?} ({e})")))?,
        };
        if !value.is_finite() {
            return Err(D::Error::custom("number is not finite"));
        }
        Ok(value)
    }

    pub fn count<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
        let value = number(de)?;
        if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
            return Err(D::Error::custom(format!("not a count: {value}")));
        }
        Ok(value as u32)
    }

    pub fn null_as_empty<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(de)?.unwrap_or_default())
    }

    fn parse_date(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        // Accept bare dates and full timestamps.
        raw.get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    }

    pub fn date<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(de)?;
        parse_date(&raw).ok_or_else(|| D::Error::custom(format!("not a date: {raw:?}")))
    }

    pub fn optional_date<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(de)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_date(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("not a date: {raw:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tenant
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct HotelRow {
    id: String,
    name: String,
    is_active: bool,
    #[serde(deserialize_with = "coerce::count")]
    max_users: u32,
    #[serde(deserialize_with = "coerce::count")]
    max_items: u32,
    #[serde(default)]
    contact_email: Option<String>,
    created_at: DateTime<Utc>,
}

impl RowMapping for Tenant {
    const TABLE: Table = Table::Hotels;
    const ENTITY: &'static str = "tenant";

    fn from_row(row: Row) -> ZinicResult<Self> {
        let row: HotelRow = decode(Self::ENTITY, row)?;
        Ok(Tenant {
            code: tenant_code(Self::ENTITY, &row.id)?,
            name: row.name,
            is_active: row.is_active,
            max_users: row.max_users,
            max_items: row.max_items,
            contact_email: row.contact_email,
            created_at: row.created_at,
        })
    }

    fn to_row(&self) -> Row {
        encode(&HotelRow {
            id: self.code.to_string(),
            name: self.name.clone(),
            is_active: self.is_active,
            max_users: self.max_users,
            max_items: self.max_items,
            contact_email: self.contact_email.clone(),
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct UserRow {
    id: String,
    client_id: String,
    username: String,
    full_name: String,
    #[serde(default)]
    email: Option<String>,
    role: String,
    department: String,
    #[serde(default, deserialize_with = "coerce::null_as_empty")]
    permissions: Vec<String>,
    password_hash: String,
}

impl RowMapping for User {
    const TABLE: Table = Table::Users;
    const ENTITY: &'static str = "user";

    fn from_row(row: Row) -> ZinicResult<Self> {
        let row: UserRow = decode(Self::ENTITY, row)?;
        Ok(User {
            id: row.id,
            tenant: tenant_code(Self::ENTITY, &row.client_id)?,
            username: row.username,
            full_name: row.full_name,
            email: row.email,
            role: parse_enum(Self::ENTITY, &row.role)?,
            department: row.department,
            grants: Grants::from_tokens(&row.permissions)?,
            secret_hash: row.password_hash,
        })
    }

    fn to_row(&self) -> Row {
        encode(&UserRow {
            id: self.id.clone(),
            client_id: self.tenant.to_string(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: self.role.as_str().to_string(),
            department: self.department.clone(),
            permissions: self.grants.to_tokens(),
            password_hash: self.secret_hash.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Stock item
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ItemRow {
    id: String,
    client_id: String,
    name: String,
    category: String,
    unit: String,
    #[serde(deserialize_with = "coerce::number")]
    current_stock: f64,
    #[serde(deserialize_with = "coerce::number")]
    min_stock_level: f64,
    #[serde(default)]
    vendor_id: Option<String>,
    last_updated: DateTime<Utc>,
}

impl RowMapping for StockItem {
    const TABLE: Table = Table::Inventory;
    const ENTITY: &'static str = "inventory item";

    fn from_row(row: Row) -> ZinicResult<Self> {
        let row: ItemRow = decode(Self::ENTITY, row)?;
        Ok(StockItem {
            id: row.id,
            tenant: tenant_code(Self::ENTITY, &row.client_id)?,
            name: row.name,
            category: row.category,
            unit: row.unit,
            current_stock: non_negative(Self::ENTITY, "current_stock", row.current_stock)?,
            min_stock_level: row.min_stock_level,
            vendor_id: row.vendor_id,
            last_updated: row.last_updated,
        })
    }

    fn to_row(&self) -> Row {
        encode(&ItemRow {
            id: self.id.clone(),
            client_id: self.tenant.to_string(),
            name: self.name.clone(),
            category: self.category.clone(),
            unit: self.unit.clone(),
            current_stock: self.current_stock,
            min_stock_level: self.min_stock_level,
            vendor_id: self.vendor_id.clone(),
            last_updated: self.last_updated,
        })
    }
}

// ---------------------------------------------------------------------------
// Stock request
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRow {
    id: String,
    #[serde(deserialize_with = "coerce::number")]
    amount: f64,
    #[serde(default)]
    remark: String,
    timestamp: DateTime<Utc>,
    user_id: String,
    user_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineRow {
    item_id: String,
    item_name: String,
    #[serde(deserialize_with = "coerce::number")]
    quantity: f64,
    #[serde(default, deserialize_with = "coerce::number")]
    consumed_quantity: f64,
    #[serde(default, deserialize_with = "coerce::null_as_empty")]
    logs: Vec<LogRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RequestRow {
    id: String,
    client_id: String,
    requester_id: String,
    requester_name: String,
    department: String,
    #[serde(default, deserialize_with = "coerce::null_as_empty")]
    items: Vec<LineRow>,
    status: String,
    requested_at: DateTime<Utc>,
    #[serde(default)]
    notes: Option<String>,
}

impl From<LineRow> for RequestLine {
    fn from(line: LineRow) -> Self {
        RequestLine {
            item_id: line.item_id,
            item_name: line.item_name,
            quantity: line.quantity,
            consumed_quantity: line.consumed_quantity,
            logs: line
                .logs
                .into_iter()
                .map(|log| ConsumptionLog {
                    id: log.id,
                    amount: log.amount,
                    remark: log.remark,
                    timestamp: log.timestamp,
                    actor_id: log.user_id,
                    actor_name: log.user_name,
                })
                .collect(),
        }
    }
}

impl From<&RequestLine> for LineRow {
    fn from(line: &RequestLine) -> Self {
        LineRow {
            item_id: line.item_id.clone(),
            item_name: line.item_name.clone(),
            quantity: line.quantity,
            consumed_quantity: line.consumed_quantity,
            logs: line
                .logs
                .iter()
                .map(|log| LogRow {
                    id: log.id.clone(),
                    amount: log.amount,
                    remark: log.remark.clone(),
                    timestamp: log.timestamp,
                    user_id: log.actor_id.clone(),
                    user_name: log.actor_name.clone(),
                })
                .collect(),
        }
    }
}

impl RowMapping for StockRequest {
    const TABLE: Table = Table::Requests;
    const ENTITY: &'static str = "stock request";

    fn from_row(row: Row) -> ZinicResult<Self> {
        let row: RequestRow = decode(Self::ENTITY, row)?;
        let lines: Vec<RequestLine> = row.items.into_iter().map(RequestLine::from).collect();
        if let Some(line) = lines
            .iter()
            .find(|l| l.consumed_quantity > l.quantity + crate::models::request::QUANTITY_EPSILON)
        {
            return Err(ZinicError::malformed(
                Self::ENTITY,
                format!("line {} consumed more than requested", line.item_id),
            ));
        }
        Ok(StockRequest {
            id: row.id,
            tenant: tenant_code(Self::ENTITY, &row.client_id)?,
            requester_id: row.requester_id,
            requester_name: row.requester_name,
            department: row.department,
            lines,
            status: parse_enum(Self::ENTITY, &row.status)?,
            requested_at: row.requested_at,
            notes: row.notes,
        })
    }

    fn to_row(&self) -> Row {
        encode(&RequestRow {
            id: self.id.clone(),
            client_id: self.tenant.to_string(),
            requester_id: self.requester_id.clone(),
            requester_name: self.requester_name.clone(),
            department: self.department.clone(),
            items: self.lines.iter().map(LineRow::from).collect(),
            status: self.status.as_str().to_string(),
            requested_at: self.requested_at,
            notes: self.notes.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Vendor
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceRow {
    id: String,
    invoice_number: String,
    #[serde(deserialize_with = "coerce::date")]
    date: NaiveDate,
    #[serde(default, deserialize_with = "coerce::optional_date")]
    due_date: Option<NaiveDate>,
    #[serde(deserialize_with = "coerce::number")]
    total_amount: f64,
    #[serde(default, deserialize_with = "coerce::number")]
    paid_amount: f64,
    payment_mode: String,
    /// Written for readers of the raw table; recomputed on decode.
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VendorRow {
    id: String,
    client_id: String,
    name: String,
    contact_person: String,
    email: String,
    phone: String,
    #[serde(default, deserialize_with = "coerce::null_as_empty")]
    invoices: Vec<InvoiceRow>,
}

impl RowMapping for Vendor {
    const TABLE: Table = Table::Vendors;
    const ENTITY: &'static str = "vendor";

    fn from_row(row: Row) -> ZinicResult<Self> {
        let row: VendorRow = decode(Self::ENTITY, row)?;
        let invoices = row
            .invoices
            .into_iter()
            .map(|inv| {
                Ok(Invoice {
                    id: inv.id,
                    invoice_number: inv.invoice_number,
                    date: inv.date,
                    due_date: inv.due_date,
                    total_amount: inv.total_amount,
                    paid_amount: inv.paid_amount,
                    payment_mode: parse_enum(Self::ENTITY, &inv.payment_mode)?,
                    notes: inv.notes,
                })
            })
            .collect::<ZinicResult<Vec<_>>>()?;
        Ok(Vendor {
            id: row.id,
            tenant: tenant_code(Self::ENTITY, &row.client_id)?,
            name: row.name,
            contact_person: row.contact_person,
            email: row.email,
            phone: row.phone,
            invoices,
        })
    }

    fn to_row(&self) -> Row {
        encode(&VendorRow {
            id: self.id.clone(),
            client_id: self.tenant.to_string(),
            name: self.name.clone(),
            contact_person: self.contact_person.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            invoices: self
                .invoices
                .iter()
                .map(|inv| InvoiceRow {
                    id: inv.id.clone(),
                    invoice_number: inv.invoice_number.clone(),
                    date: inv.date,
                    due_date: inv.due_date,
                    total_amount: inv.total_amount,
                    paid_amount: inv.paid_amount,
                    payment_mode: inv.payment_mode.as_str().to_string(),
                    status: Some(inv.status().to_string()),
                    notes: inv.notes.clone(),
                })
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Department
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct DepartmentRow {
    id: String,
    client_id: String,
    name: String,
}

impl RowMapping for Department {
    const TABLE: Table = Table::Departments;
    const ENTITY: &'static str = "department";

    fn from_row(row: Row) -> ZinicResult<Self> {
        let row: DepartmentRow = decode(Self::ENTITY, row)?;
        Ok(Department {
            id: row.id,
            tenant: tenant_code(Self::ENTITY, &row.client_id)?,
            name: row.name,
        })
    }

    fn to_row(&self) -> Row {
        encode(&DepartmentRow {
            id: self.id.clone(),
            client_id: self.tenant.to_string(),
            name: self.name.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Demo lead
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct DemoLeadRow {
    id: String,
    full_name: String,
    hotel_name: String,
    position: String,
    location: String,
    email: String,
    mobile: String,
    registered_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    client_id: String,
    status: String,
}

impl RowMapping for DemoLead {
    const TABLE: Table = Table::DemoLeads;
    const ENTITY: &'static str = "demo lead";

    fn from_row(row: Row) -> ZinicResult<Self> {
        let row: DemoLeadRow = decode(Self::ENTITY, row)?;
        let status = match row.status.trim().to_ascii_uppercase().as_str() {
            "PENDING" => LeadStatus::Pending,
            "VERIFIED" => LeadStatus::Verified,
            other => {
                return Err(ZinicError::malformed(
                    Self::ENTITY,
                    format!("unknown lead status: {other}"),
                ));
            }
        };
        Ok(DemoLead {
            id: row.id,
            full_name: row.full_name,
            hotel_name: row.hotel_name,
            position: row.position,
            location: row.location,
            email: row.email,
            mobile: row.mobile,
            registered_at: row.registered_at,
            expires_at: row.expires_at,
            tenant: tenant_code(Self::ENTITY, &row.client_id)?,
            status,
        })
    }

    fn to_row(&self) -> Row {
        encode(&DemoLeadRow {
            id: self.id.clone(),
            full_name: self.full_name.clone(),
            hotel_name: self.hotel_name.clone(),
            position: self.position.clone(),
            location: self.location.clone(),
            email: self.email.clone(),
            mobile: self.mobile.clone(),
            registered_at: self.registered_at,
            expires_at: self.expires_at,
            client_id: self.tenant.to_string(),
            status: self.status.as_str().into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

fn project(row: Row, columns: &[&str]) -> Row {
    row.into_iter()
        .filter(|(column, _)| columns.contains(&column.as_str()))
        .collect()
}

/// On-hand quantity and its timestamp only, so a stock movement never
/// overwrites a concurrent edit of the item's other columns.
pub fn stock_patch(item: &StockItem) -> Row {
    project(item.to_row(), &["current_stock", "last_updated"])
}

pub fn lead_status_patch(status: LeadStatus) -> Row {
    Row::from_iter([("status".to_string(), Value::String(status.as_str().into()))])
}
