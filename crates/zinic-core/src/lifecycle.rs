//! Stock requisition state machine and on-hand quantity ledger.
//!
//! Every operation here is pure: it validates its inputs, then returns the
//! updated entities for the caller to persist. Nothing is returned unless
//! every check passed, so a rejected command never produces a partial
//! write.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ZinicError, ZinicResult};
use crate::models::item::StockItem;
use crate::models::request::{
    ConsumptionLog, CreateRequest, LogConsumption, QUANTITY_EPSILON, RequestLine, RequestStatus,
    StockRequest,
};
use crate::models::tenant::TenantCode;
use crate::models::user::{Role, User};
use crate::permission::{ModuleAction, require};

/// Result of logging consumption: both entities change together.
#[derive(Debug, Clone, PartialEq)]
pub struct Consumption {
    pub request: StockRequest,
    pub item: StockItem,
    /// The item moved from above its threshold to at/below it.
    pub crossed_threshold: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub item: StockItem,
    pub crossed_threshold: bool,
}

/// Reject access to another tenant's records. Only the super role spans
/// tenants.
pub fn ensure_same_tenant(actor: &User, tenant: &TenantCode) -> ZinicResult<()> {
    if actor.role == Role::Super || actor.tenant == *tenant {
        return Ok(());
    }
    Err(ZinicError::PermissionDenied {
        action: format!("access tenant {tenant}"),
    })
}

fn crossed(before: f64, after: f64, min: f64) -> bool {
    before > min && after <= min
}

fn check_quantity(value: f64, what: &str) -> ZinicResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ZinicError::invalid_quantity(format!(
            "{what} must be a positive number, got {value}"
        )));
    }
    Ok(())
}

fn new_request_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("REQ-{}", raw[..10].to_ascii_uppercase())
}

/// Raise a new requisition in `PENDING`.
///
/// `items` is the tenant's inventory; each line must name one of them.
pub fn open_request(
    actor: &User,
    input: CreateRequest,
    items: &[StockItem],
    now: DateTime<Utc>,
) -> ZinicResult<StockRequest> {
    require(actor, ModuleAction::RAISE_REQUESTS)?;

    if input.lines.is_empty() {
        return Err(ZinicError::validation("a requisition needs at least one line"));
    }
    if input.department.trim().is_empty() {
        return Err(ZinicError::validation("department must not be empty"));
    }

    let mut lines = Vec::with_capacity(input.lines.len());
    for line in input.lines {
        check_quantity(line.quantity, "requested quantity")?;
        let item = items
            .iter()
            .find(|i| i.id == line.item_id && i.tenant == actor.tenant)
            .ok_or_else(|| ZinicError::not_found("inventory item", &line.item_id))?;
        lines.push(RequestLine {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            quantity: line.quantity,
            consumed_quantity: 0.0,
            logs: Vec::new(),
        });
    }

    Ok(StockRequest {
        id: new_request_id(),
        tenant: actor.tenant.clone(),
        requester_id: actor.id.clone(),
        requester_name: actor.full_name.clone(),
        department: input.department.trim().to_string(),
        lines,
        status: RequestStatus::Pending,
        requested_at: now,
        notes: input.notes.filter(|n| !n.trim().is_empty()),
    })
}

/// Approve, reject or transfer. `CONSUMED` can never be commanded.
pub fn transition(
    actor: &User,
    request: &StockRequest,
    target: RequestStatus,
) -> ZinicResult<StockRequest> {
    require(actor, ModuleAction::REVIEW_REQUESTS)?;
    ensure_same_tenant(actor, &request.tenant)?;

    if !request.status.can_transition_to(target) {
        return Err(ZinicError::InvalidTransition {
            from: request.status.to_string(),
            to: target.to_string(),
        });
    }

    let mut updated = request.clone();
    updated.status = target;
    Ok(updated)
}

/// Record usage against one line of a transferred requisition and draw
/// the same amount from the item's on-hand stock.
pub fn log_consumption(
    actor: &User,
    request: &StockRequest,
    item: &StockItem,
    input: &LogConsumption,
    now: DateTime<Utc>,
) -> ZinicResult<Consumption> {
    require(actor, ModuleAction::RAISE_REQUESTS)?;
    ensure_same_tenant(actor, &request.tenant)?;

    if !request.status.accepts_consumption() {
        return Err(ZinicError::InvalidTransition {
            from: request.status.to_string(),
            to: RequestStatus::Consumed.to_string(),
        });
    }
    if item.id != input.item_id || item.tenant != request.tenant {
        return Err(ZinicError::validation(format!(
            "item {} does not match consumption target {}",
            item.id, input.item_id
        )));
    }

    let index = request
        .lines
        .iter()
        .position(|l| l.item_id == input.item_id)
        .ok_or_else(|| ZinicError::not_found("request line", &input.item_id))?;

    let line = &request.lines[index];
    let remaining = line.remaining();
    check_quantity(input.amount, "consumption amount")?;
    if input.amount > remaining + QUANTITY_EPSILON {
        return Err(ZinicError::invalid_quantity(format!(
            "amount {} exceeds remaining {} of {}",
            input.amount, remaining, line.item_name
        )));
    }

    let mut updated = request.clone();
    let line = &mut updated.lines[index];
    line.consumed_quantity = (line.consumed_quantity + input.amount).min(line.quantity);
    line.logs.push(ConsumptionLog {
        id: Uuid::new_v4().to_string(),
        amount: input.amount,
        remark: input.remark.trim().to_string(),
        timestamp: now,
        actor_id: actor.id.clone(),
        actor_name: actor.full_name.clone(),
    });
    if updated.is_fully_consumed() {
        updated.status = RequestStatus::Consumed;
    }

    let mut drawn = item.clone();
    drawn.current_stock = (item.current_stock - input.amount).max(0.0);
    drawn.last_updated = now;

    Ok(Consumption {
        crossed_threshold: crossed(item.current_stock, drawn.current_stock, item.min_stock_level),
        request: updated,
        item: drawn,
    })
}

/// Apply a signed correction to on-hand stock, floored at zero.
pub fn adjust_stock(
    actor: &User,
    item: &StockItem,
    delta: f64,
    now: DateTime<Utc>,
) -> ZinicResult<Adjustment> {
    require(actor, ModuleAction::MODIFY_INVENTORY)?;
    ensure_same_tenant(actor, &item.tenant)?;

    if !delta.is_finite() {
        return Err(ZinicError::invalid_quantity(format!(
            "adjustment must be finite, got {delta}"
        )));
    }

    let mut adjusted = item.clone();
    adjusted.current_stock = (item.current_stock + delta).max(0.0);
    adjusted.last_updated = now;

    Ok(Adjustment {
        crossed_threshold: crossed(item.current_stock, adjusted.current_stock, item.min_stock_level),
        item: adjusted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::NewRequestLine;
    use crate::permission::Grants;

    fn now() -> DateTime<Utc> {
        "2026-04-01T09:00:00Z".parse().unwrap()
    }

    fn staff(role: Role) -> User {
        User {
            id: "u-1".into(),
            tenant: TenantCode::new("GRAND01"),
            username: "asha".into(),
            full_name: "Asha Nair".into(),
            email: None,
            role,
            department: "Kitchen".into(),
            grants: Grants::role_defaults(role),
            secret_hash: String::new(),
        }
    }

    fn item(stock: f64, min: f64) -> StockItem {
        StockItem {
            id: "itm-1".into(),
            tenant: TenantCode::new("GRAND01"),
            name: "Basmati Rice".into(),
            category: "Dry Goods".into(),
            unit: "kg".into(),
            current_stock: stock,
            min_stock_level: min,
            vendor_id: None,
            last_updated: now(),
        }
    }

    fn transferred(quantity: f64) -> StockRequest {
        StockRequest {
            id: "REQ-1".into(),
            tenant: TenantCode::new("GRAND01"),
            requester_id: "u-1".into(),
            requester_name: "Asha Nair".into(),
            department: "Kitchen".into(),
            lines: vec![RequestLine {
                item_id: "itm-1".into(),
                item_name: "Basmati Rice".into(),
                quantity,
                consumed_quantity: 0.0,
                logs: Vec::new(),
            }],
            status: RequestStatus::Transferred,
            requested_at: now(),
            notes: None,
        }
    }

    fn consume(amount: f64) -> LogConsumption {
        LogConsumption {
            request_id: "REQ-1".into(),
            item_id: "itm-1".into(),
            amount,
            remark: "lunch service".into(),
        }
    }

    #[test]
    fn adjustment_reports_threshold_crossing() {
        let admin = staff(Role::TenantAdmin);
        let first = adjust_stock(&admin, &item(10.0, 5.0), -3.0, now()).unwrap();
        assert_eq!(first.item.current_stock, 7.0);
        assert!(!first.item.is_low());
        assert!(!first.crossed_threshold);

        let second = adjust_stock(&admin, &first.item, -3.0, now()).unwrap();
        assert_eq!(second.item.current_stock, 4.0);
        assert!(second.item.is_low());
        assert!(second.crossed_threshold);
    }

    #[test]
    fn adjustment_floors_at_zero() {
        let admin = staff(Role::TenantAdmin);
        let adjusted = adjust_stock(&admin, &item(2.0, 1.0), -50.0, now()).unwrap();
        assert_eq!(adjusted.item.current_stock, 0.0);
    }

    #[test]
    fn adjustment_requires_inventory_modify() {
        let mut viewer = staff(Role::DepartmentUser);
        viewer.grants = Grants::from_tokens(["inventory:view"]).unwrap();
        let err = adjust_stock(&viewer, &item(10.0, 5.0), 1.0, now()).unwrap_err();
        assert!(matches!(err, ZinicError::PermissionDenied { .. }), "got {err:?}");
    }

    #[test]
    fn partial_then_full_consumption() {
        let user = staff(Role::DepartmentUser);
        let stock = item(20.0, 2.0);
        let request = transferred(5.0);

        let first = log_consumption(&user, &request, &stock, &consume(3.0), now()).unwrap();
        assert_eq!(first.request.lines[0].consumed_quantity, 3.0);
        assert_eq!(first.request.status, RequestStatus::Transferred);
        assert_eq!(first.item.current_stock, 17.0);
        assert_eq!(first.request.lines[0].logs.len(), 1);
        assert_eq!(first.request.lines[0].logs[0].actor_name, "Asha Nair");

        let second =
            log_consumption(&user, &first.request, &first.item, &consume(2.0), now()).unwrap();
        assert_eq!(second.request.lines[0].consumed_quantity, 5.0);
        assert_eq!(second.request.status, RequestStatus::Consumed);
        assert_eq!(second.item.current_stock, 15.0);

        let err = log_consumption(&user, &second.request, &second.item, &consume(1.0), now())
            .unwrap_err();
        assert!(matches!(err, ZinicError::InvalidQuantity { .. }), "got {err:?}");
    }

    #[test]
    fn over_consumption_is_rejected() {
        let user = staff(Role::DepartmentUser);
        let err = log_consumption(&user, &transferred(5.0), &item(20.0, 2.0), &consume(6.0), now())
            .unwrap_err();
        assert!(matches!(err, ZinicError::InvalidQuantity { .. }));
    }

    #[test]
    fn consumption_draws_stock_down_to_zero_only() {
        let user = staff(Role::DepartmentUser);
        let result =
            log_consumption(&user, &transferred(5.0), &item(1.0, 0.0), &consume(4.0), now())
                .unwrap();
        assert_eq!(result.item.current_stock, 0.0);
        assert!(result.crossed_threshold);
    }

    #[test]
    fn consumption_needs_transferred_request() {
        let user = staff(Role::DepartmentUser);
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
        ] {
            let mut request = transferred(5.0);
            request.status = status;
            let err = log_consumption(&user, &request, &item(20.0, 2.0), &consume(1.0), now())
                .unwrap_err();
            assert!(
                matches!(err, ZinicError::InvalidTransition { .. }),
                "{status}: got {err:?}"
            );
        }
    }

    #[test]
    fn zero_or_negative_amounts_are_rejected() {
        let user = staff(Role::DepartmentUser);
        for amount in [0.0, -1.0, f64::NAN] {
            let err =
                log_consumption(&user, &transferred(5.0), &item(20.0, 2.0), &consume(amount), now())
                    .unwrap_err();
            assert!(matches!(err, ZinicError::InvalidQuantity { .. }));
        }
    }

    #[test]
    fn consumed_is_never_a_commanded_target() {
        let approver = staff(Role::Approver);
        let mut request = transferred(5.0);
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Transferred,
        ] {
            request.status = status;
            let err = transition(&approver, &request, RequestStatus::Consumed).unwrap_err();
            assert!(matches!(err, ZinicError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn review_path_and_rejection_is_terminal() {
        let approver = staff(Role::Approver);
        let mut request = transferred(5.0);
        request.status = RequestStatus::Pending;

        let approved = transition(&approver, &request, RequestStatus::Approved).unwrap();
        let moved = transition(&approver, &approved, RequestStatus::Transferred).unwrap();
        assert_eq!(moved.status, RequestStatus::Transferred);

        let rejected = transition(&approver, &request, RequestStatus::Rejected).unwrap();
        assert!(transition(&approver, &rejected, RequestStatus::Approved).is_err());
        assert!(transition(&approver, &approved, RequestStatus::Rejected).is_err());
    }

    #[test]
    fn department_users_cannot_review() {
        let user = staff(Role::DepartmentUser);
        let mut request = transferred(5.0);
        request.status = RequestStatus::Pending;
        let err = transition(&user, &request, RequestStatus::Approved).unwrap_err();
        assert!(matches!(err, ZinicError::PermissionDenied { .. }));
    }

    #[test]
    fn opening_validates_lines() {
        let user = staff(Role::DepartmentUser);
        let inventory = vec![item(20.0, 2.0)];

        let request = open_request(
            &user,
            CreateRequest {
                department: "Kitchen".into(),
                lines: vec![NewRequestLine {
                    item_id: "itm-1".into(),
                    quantity: 4.0,
                }],
                notes: Some("  ".into()),
            },
            &inventory,
            now(),
        )
        .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.lines[0].item_name, "Basmati Rice");
        assert_eq!(request.notes, None);
        assert!(request.id.starts_with("REQ-"));

        let empty = open_request(
            &user,
            CreateRequest {
                department: "Kitchen".into(),
                lines: vec![],
                notes: None,
            },
            &inventory,
            now(),
        )
        .unwrap_err();
        assert!(matches!(empty, ZinicError::Validation { .. }));

        let unknown = open_request(
            &user,
            CreateRequest {
                department: "Kitchen".into(),
                lines: vec![NewRequestLine {
                    item_id: "itm-9".into(),
                    quantity: 1.0,
                }],
                notes: None,
            },
            &inventory,
            now(),
        )
        .unwrap_err();
        assert!(matches!(unknown, ZinicError::NotFound { .. }));
    }

    #[test]
    fn other_tenants_records_are_out_of_reach() {
        let mut admin = staff(Role::TenantAdmin);
        admin.tenant = TenantCode::new("SEAVIEW");
        let err = adjust_stock(&admin, &item(10.0, 5.0), 1.0, now()).unwrap_err();
        assert!(matches!(err, ZinicError::PermissionDenied { .. }));

        let mut root = staff(Role::Super);
        root.tenant = TenantCode::new("HQ");
        assert!(adjust_stock(&root, &item(10.0, 5.0), 1.0, now()).is_ok());
    }
}
