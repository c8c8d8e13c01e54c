//! Domain notifications pushed by the server.
//!
//! A [`Notification`] is only ever built through [`Notification::from_value`],
//! which validates the raw payload. Once built it is immutable: fields are
//! private and exposed through accessors.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ValidationError;

/// Kind of state change a notification reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// A new order was opened.
    NewOrder,
    /// A dish on an order changed state.
    DishUpdate,
    /// A payment was registered or changed.
    PaymentUpdate,
    /// A table changed lifecycle state.
    TableStatusUpdate,
    /// Staff asked for approval to close an order with debt.
    DebtValidationRequest,
    /// Debt closure approved.
    DebtValidationApproved,
    /// Debt closure rejected.
    DebtValidationRejected,
    /// An order was closed with outstanding debt.
    OrderClosedWithDebt,
}

impl Category {
    /// All categories, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::NewOrder,
        Self::DishUpdate,
        Self::PaymentUpdate,
        Self::TableStatusUpdate,
        Self::DebtValidationRequest,
        Self::DebtValidationApproved,
        Self::DebtValidationRejected,
        Self::OrderClosedWithDebt,
    ];

    /// Wire name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewOrder => "NEW_ORDER",
            Self::DishUpdate => "DISH_UPDATE",
            Self::PaymentUpdate => "PAYMENT_UPDATE",
            Self::TableStatusUpdate => "TABLE_STATUS_UPDATE",
            Self::DebtValidationRequest => "DEBT_VALIDATION_REQUEST",
            Self::DebtValidationApproved => "DEBT_VALIDATION_APPROVED",
            Self::DebtValidationRejected => "DEBT_VALIDATION_REJECTED",
            Self::OrderClosedWithDebt => "ORDER_CLOSED_WITH_DEBT",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// Lifecycle state of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableLifecycleState {
    /// No guests seated.
    Free,
    /// Guests seated or an order open.
    Occupied,
    /// Held for an upcoming reservation.
    Reserved,
}

impl FromStr for TableLifecycleState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "OCCUPIED" => Ok(Self::Occupied),
            "RESERVED" => Ok(Self::Reserved),
            other => Err(ValidationError::InvalidField {
                field: "tableLifecycleState",
                reason: format!("unknown table state `{other}`"),
            }),
        }
    }
}

/// A validated, immutable domain event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    order_id: u64,
    table_id: u64,
    tenant_id: String,
    previous_state: String,
    new_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    table_lifecycle_state: Option<TableLifecycleState>,
    category: Category,
    occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
}

impl Notification {
    /// Validate a raw server payload.
    ///
    /// `orderId`, `tableId`, `tenantId`, and `category` are required; `type`
    /// is accepted in place of `category`. Ids may be positive integers or
    /// strings holding one. A missing or unparseable `occurredAt` (or
    /// `timestamp`) is replaced by `received_at`.
    pub fn from_value(raw: &Value, received_at: DateTime<Utc>) -> Result<Self, ValidationError> {
        let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;

        let order_id = positive_id(obj, "orderId")?;
        let table_id = positive_id(obj, "tableId")?;
        let tenant_id = tenant(obj)?;
        let category = field(obj, "category")
            .or_else(|| field(obj, "type"))
            .ok_or(ValidationError::MissingField("category"))?;
        let category: Category = category
            .as_str()
            .ok_or_else(|| ValidationError::UnknownCategory(category.to_string()))?
            .parse()?;

        let table_lifecycle_state = match field(obj, "tableLifecycleState")
            .or_else(|| field(obj, "tableStatus"))
            .and_then(Value::as_str)
        {
            Some(s) => Some(s.parse()?),
            None => None,
        };

        let item_id = if field(obj, "itemId").is_some() {
            Some(positive_id(obj, "itemId")?)
        } else {
            None
        };

        let occurred_at = field(obj, "occurredAt")
            .or_else(|| field(obj, "timestamp"))
            .and_then(parse_timestamp)
            .unwrap_or(received_at);

        Ok(Self {
            order_id,
            table_id,
            tenant_id,
            previous_state: string_or_empty(obj, "previousState"),
            new_state: string_or_empty(obj, "newState"),
            table_lifecycle_state,
            category,
            occurred_at,
            item_id,
            metadata: field(obj, "metadata").and_then(Value::as_object).cloned(),
        })
    }

    /// Order the event refers to.
    pub fn order_id(&self) -> u64 {
        self.order_id
    }

    /// Table the order belongs to.
    pub fn table_id(&self) -> u64 {
        self.table_id
    }

    /// Tenant that owns the order.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Order state before the change.
    pub fn previous_state(&self) -> &str {
        &self.previous_state
    }

    /// Order state after the change.
    pub fn new_state(&self) -> &str {
        &self.new_state
    }

    /// Table lifecycle state, when the server reported one.
    pub fn table_lifecycle_state(&self) -> Option<TableLifecycleState> {
        self.table_lifecycle_state
    }

    /// Event category.
    pub fn category(&self) -> Category {
        self.category
    }

    /// When the change happened (or when it was received, if unreported).
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Order line the event refers to, for dish-level events.
    pub fn item_id(&self) -> Option<u64> {
        self.item_id
    }

    /// Free-form extra data.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name).filter(|v| !v.is_null())
}

fn positive_id(obj: &Map<String, Value>, name: &'static str) -> Result<u64, ValidationError> {
    let value = field(obj, name).ok_or(ValidationError::MissingField(name))?;
    let id = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidField {
            field: name,
            reason: format!("expected a positive integer, got {value}"),
        }),
    }
}

fn tenant(obj: &Map<String, Value>) -> Result<String, ValidationError> {
    let value = field(obj, "tenantId").ok_or(ValidationError::MissingField("tenantId"))?;
    let tenant = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    if tenant.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "tenantId",
            reason: "expected a non-empty string".into(),
        });
    }
    Ok(tenant)
}

fn string_or_empty(obj: &Map<String, Value>, name: &str) -> String {
    field(obj, name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn valid() -> Value {
        json!({
            "orderId": 42,
            "tableId": 7,
            "tenantId": "tenantA",
            "previousState": "OPEN",
            "newState": "IN_KITCHEN",
            "tableLifecycleState": "OCCUPIED",
            "category": "DISH_UPDATE",
            "occurredAt": "2026-03-01T11:59:00Z",
            "itemId": 3,
            "metadata": {"dish": "Lomo saltado"}
        })
    }

    #[test]
    fn parses_full_payload() {
        let n = Notification::from_value(&valid(), now()).unwrap();
        assert_eq!(n.order_id(), 42);
        assert_eq!(n.table_id(), 7);
        assert_eq!(n.tenant_id(), "tenantA");
        assert_eq!(n.previous_state(), "OPEN");
        assert_eq!(n.new_state(), "IN_KITCHEN");
        assert_eq!(n.table_lifecycle_state(), Some(TableLifecycleState::Occupied));
        assert_eq!(n.category(), Category::DishUpdate);
        assert_eq!(n.item_id(), Some(3));
        assert_eq!(n.metadata().unwrap()["dish"], "Lomo saltado");
        assert_eq!(
            n.occurred_at(),
            Utc.with_ymd_and_hms(2026, 3, 1, 11, 59, 0).unwrap()
        );
    }

    #[test]
    fn missing_timestamp_defaults_to_receipt() {
        let mut raw = valid();
        let _ = raw.as_object_mut().unwrap().remove("occurredAt");
        let n = Notification::from_value(&raw, now()).unwrap();
        assert_eq!(n.occurred_at(), now());
    }

    #[test]
    fn epoch_millis_timestamp_accepted() {
        let mut raw = valid();
        raw["occurredAt"] = json!(1_700_000_000_000_i64);
        let n = Notification::from_value(&raw, now()).unwrap();
        assert_eq!(n.occurred_at().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn string_ids_accepted() {
        let mut raw = valid();
        raw["orderId"] = json!("42");
        raw["tableId"] = json!(" 7 ");
        let n = Notification::from_value(&raw, now()).unwrap();
        assert_eq!(n.order_id(), 42);
        assert_eq!(n.table_id(), 7);
    }

    #[test]
    fn type_is_alias_for_category() {
        let mut raw = valid();
        let _ = raw.as_object_mut().unwrap().remove("category");
        raw["type"] = json!("NEW_ORDER");
        let n = Notification::from_value(&raw, now()).unwrap();
        assert_eq!(n.category(), Category::NewOrder);
    }

    #[test]
    fn missing_order_id_rejected() {
        let mut raw = valid();
        let _ = raw.as_object_mut().unwrap().remove("orderId");
        let err = Notification::from_value(&raw, now()).unwrap_err();
        assert_matches!(err, ValidationError::MissingField("orderId"));
    }

    #[test]
    fn null_field_counts_as_missing() {
        let mut raw = valid();
        raw["tenantId"] = Value::Null;
        let err = Notification::from_value(&raw, now()).unwrap_err();
        assert_matches!(err, ValidationError::MissingField("tenantId"));
    }

    #[test]
    fn zero_table_id_rejected() {
        let mut raw = valid();
        raw["tableId"] = json!(0);
        let err = Notification::from_value(&raw, now()).unwrap_err();
        assert_matches!(err, ValidationError::InvalidField { field: "tableId", .. });
    }

    #[test]
    fn negative_order_id_rejected() {
        let mut raw = valid();
        raw["orderId"] = json!(-5);
        let err = Notification::from_value(&raw, now()).unwrap_err();
        assert_matches!(err, ValidationError::InvalidField { field: "orderId", .. });
    }

    #[test]
    fn missing_category_rejected() {
        let mut raw = valid();
        let _ = raw.as_object_mut().unwrap().remove("category");
        let err = Notification::from_value(&raw, now()).unwrap_err();
        assert_matches!(err, ValidationError::MissingField("category"));
    }

    #[test]
    fn unknown_category_rejected() {
        let mut raw = valid();
        raw["category"] = json!("KITCHEN_ON_FIRE");
        let err = Notification::from_value(&raw, now()).unwrap_err();
        assert_matches!(err, ValidationError::UnknownCategory(c) if c == "KITCHEN_ON_FIRE");
    }

    #[test]
    fn non_object_rejected() {
        let err = Notification::from_value(&json!([1, 2]), now()).unwrap_err();
        assert_matches!(err, ValidationError::NotAnObject);
    }

    #[test]
    fn unknown_table_state_rejected() {
        let mut raw = valid();
        raw["tableLifecycleState"] = json!("ON_FIRE");
        let err = Notification::from_value(&raw, now()).unwrap_err();
        assert_matches!(
            err,
            ValidationError::InvalidField { field: "tableLifecycleState", .. }
        );
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let raw = json!({
            "orderId": 1,
            "tableId": 2,
            "tenantId": "t",
            "category": "PAYMENT_UPDATE"
        });
        let n = Notification::from_value(&raw, now()).unwrap();
        assert_eq!(n.previous_state(), "");
        assert!(n.table_lifecycle_state().is_none());
        assert!(n.item_id().is_none());
        assert!(n.metadata().is_none());
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
            let json = serde_json::to_string(&c).unwrap();
            assert_eq!(json.trim_matches('"'), c.as_str());
        }
    }

    #[test]
    fn serializes_camel_case() {
        let n = Notification::from_value(&valid(), now()).unwrap();
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["orderId"], 42);
        assert_eq!(json["category"], "DISH_UPDATE");
        assert_eq!(json["tableLifecycleState"], "OCCUPIED");
    }
}
