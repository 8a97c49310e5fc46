//! Operator-entered orders, created immediately rather than staged.

use serde::{Deserialize, Serialize};

use opsdesk_core::{CoreError, FieldValue, Fields};

pub const ITEMS_FIELD: &str = "items";
pub const SHIPPING_FEE_FIELD: &str = "shippingFee";
pub const TOTAL_FIELD: &str = "total";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub line_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipping {
    pub method: String,
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub store_code: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub fee: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    #[serde(default)]
    pub spec: String,
    pub qty: i64,
    pub price: i64,
    pub subtotal: i64,
}

impl OrderLine {
    pub fn new(
        name: impl Into<String>,
        spec: impl Into<String>,
        qty: i64,
        price: i64,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        let subtotal = price
            .checked_mul(qty)
            .ok_or_else(|| overflow(&format!("subtotal for {name}")))?;
        Ok(Self {
            name,
            spec: spec.into(),
            qty,
            price,
            subtotal,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOrder {
    pub customer: Customer,
    pub shipping: Shipping,
    pub items: Vec<OrderLine>,
    pub total: i64,
    #[serde(default)]
    pub note: String,
}

impl ManualOrder {
    /// Builds an order whose total is the item subtotals plus the shipping fee.
    pub fn new(
        customer: Customer,
        shipping: Shipping,
        items: Vec<OrderLine>,
    ) -> Result<Self, CoreError> {
        let total = items
            .iter()
            .map(|i| i.subtotal)
            .chain([shipping.fee])
            .try_fold(0i64, i64::checked_add)
            .ok_or_else(|| overflow("order total"))?;
        Ok(Self {
            customer,
            shipping,
            items,
            total,
            note: String::new(),
        })
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.items.is_empty() {
            return Err(CoreError::InvalidData("order has no items".into()));
        }
        if self.customer.name.trim().is_empty() || self.customer.phone.trim().is_empty() {
            return Err(CoreError::InvalidData(
                "customer name and phone are required".into(),
            ));
        }
        if let Some(line) = self.items.iter().find(|l| l.qty <= 0) {
            return Err(CoreError::InvalidData(format!(
                "quantity for {} must be positive",
                line.name
            )));
        }
        if let Some(line) = self.items.iter().find(|l| l.price < 0) {
            return Err(CoreError::InvalidData(format!(
                "price for {} cannot be negative",
                line.name
            )));
        }
        if self.shipping.fee < 0 {
            return Err(CoreError::InvalidData(
                "shipping fee cannot be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        serde_json::to_value(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

fn overflow(what: &str) -> CoreError {
    CoreError::InvalidData(format!("{what} is out of range"))
}

/// Total of an order row: every item's subtotal (price times qty when the
/// subtotal is missing) plus the shipping fee. `None` when the row carries no
/// item list to total.
pub fn order_total(fields: &Fields) -> Result<Option<i64>, CoreError> {
    let items = match fields.get(ITEMS_FIELD) {
        None | Some(FieldValue::Null) => return Ok(None),
        Some(FieldValue::List(items)) => items,
        Some(_) => return Err(CoreError::InvalidData(format!("{ITEMS_FIELD} is not a list"))),
    };
    let mut total = amount(fields.get(SHIPPING_FEE_FIELD), SHIPPING_FEE_FIELD)?.unwrap_or(0);
    for item in items {
        let FieldValue::Map(item) = item else {
            return Err(CoreError::InvalidData(format!("{ITEMS_FIELD} entry is not an object")));
        };
        let subtotal = match amount(item.get("subtotal"), "subtotal")? {
            Some(subtotal) => subtotal,
            None => {
                let price = amount(item.get("price"), "price")?.unwrap_or(0);
                let qty = amount(item.get("qty"), "qty")?.unwrap_or(0);
                price.checked_mul(qty).ok_or_else(|| overflow("subtotal"))?
            }
        };
        total = total
            .checked_add(subtotal)
            .ok_or_else(|| overflow("order total"))?;
    }
    Ok(Some(total))
}

/// Whole-currency amount. Form fields may arrive as text or as floats.
fn amount(value: Option<&FieldValue>, label: &str) -> Result<Option<i64>, CoreError> {
    let number = match value {
        None | Some(FieldValue::Null) => return Ok(None),
        Some(FieldValue::Integer(n)) => return Ok(Some(*n)),
        Some(FieldValue::Text(text)) if text.trim().is_empty() => return Ok(None),
        Some(FieldValue::Text(text)) => text.trim().parse::<f64>().ok(),
        Some(other) => other.as_float(),
    };
    match number {
        Some(n) if n.is_finite() && n.abs() < i64::MAX as f64 => Ok(Some(n.round() as i64)),
        Some(_) => Err(overflow(label)),
        None => Err(CoreError::InvalidData(format!("{label} is not a number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order() -> ManualOrder {
        ManualOrder::new(
            Customer {
                name: "林小姐".into(),
                phone: "0912345678".into(),
                ..Default::default()
            },
            Shipping {
                method: "7-11".into(),
                fee: 60,
                ..Default::default()
            },
            vec![OrderLine::new("Toner", "200ml", 2, 450).unwrap()],
        )
        .unwrap()
    }

    #[test]
    fn total_includes_shipping() {
        assert_eq!(order().total, 960);
    }

    #[test]
    fn validation_rejects_missing_contact_and_items() {
        assert!(order().validate().is_ok());

        let mut no_phone = order();
        no_phone.customer.phone = " ".into();
        assert!(matches!(no_phone.validate(), Err(CoreError::InvalidData(_))));

        let mut empty = order();
        empty.items.clear();
        assert!(matches!(empty.validate(), Err(CoreError::InvalidData(_))));
    }

    #[test]
    fn validation_rejects_negative_amounts() {
        let mut refund = order();
        refund.items.push(OrderLine::new("Coupon", "", 1, -500).unwrap());
        assert!(matches!(refund.validate(), Err(CoreError::InvalidData(_))));

        let mut free = order();
        free.shipping.fee = -60;
        assert!(matches!(free.validate(), Err(CoreError::InvalidData(_))));
    }

    #[test]
    fn overflowing_amounts_are_rejected() {
        assert!(matches!(
            OrderLine::new("Toner", "", 2, i64::MAX),
            Err(CoreError::InvalidData(_))
        ));

        let line = OrderLine::new("Toner", "", 1, i64::MAX).unwrap();
        let shipping = Shipping {
            fee: 1,
            ..Default::default()
        };
        assert!(matches!(
            ManualOrder::new(Customer::default(), shipping, vec![line]),
            Err(CoreError::InvalidData(_))
        ));
    }

    #[test]
    fn row_total_sums_items_and_shipping() {
        let row = Fields::from([
            (
                ITEMS_FIELD.to_string(),
                FieldValue::from_json(json!([
                    { "name": "Toner", "qty": 2, "price": 450, "subtotal": 900 },
                    { "name": "Mask", "qty": 3, "price": "40" },
                ])),
            ),
            (SHIPPING_FEE_FIELD.to_string(), FieldValue::Float(60.0)),
        ]);
        assert_eq!(order_total(&row).unwrap(), Some(1080));

        let no_items = Fields::from([(SHIPPING_FEE_FIELD.to_string(), FieldValue::Integer(60))]);
        assert_eq!(order_total(&no_items).unwrap(), None);

        let bad = Fields::from([(ITEMS_FIELD.to_string(), FieldValue::Text("oops".into()))]);
        assert!(order_total(&bad).is_err());
    }

    #[test]
    fn wire_form_uses_camel_case() {
        let json = order().to_json().unwrap();
        assert_eq!(json["customer"]["lineId"], "");
        assert_eq!(json["shipping"]["storeName"], "");
        assert_eq!(json["items"][0]["subtotal"], 900);
    }
}
