use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(n) => Some(*n),
            FieldValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Plain text used by search and exact-match filters.
    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Float(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(_) | FieldValue::Map(_) => self.to_json().to_string(),
        }
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from_json).collect())
            }
            Value::Object(map) => FieldValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(n) => Value::Number((*n).into()),
            // Non-finite floats have no JSON form.
            FieldValue::Float(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Map(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Parses operator-entered structured data (e.g. product options).
    /// Blank input is an empty map; anything else must be a JSON object.
    pub fn parse_structured(text: &str) -> Result<Self, CoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(FieldValue::Map(BTreeMap::new()));
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CoreError::MalformedStructure(e.to_string()))?;
        if !value.is_object() {
            return Err(CoreError::MalformedStructure(
                "expected a JSON object".into(),
            ));
        }
        Ok(FieldValue::from_json(value))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Float(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_precision() {
        assert_eq!(FieldValue::from_json(json!(60)), FieldValue::Integer(60));
        assert_eq!(FieldValue::from_json(json!(1.5)), FieldValue::Float(1.5));
    }

    #[test]
    fn nested_items_convert_both_ways() {
        let items = json!([{ "name": "Serum", "qty": 2, "subtotal": 880 }]);
        let value = FieldValue::from_json(items.clone());
        assert!(matches!(value, FieldValue::List(ref l) if l.len() == 1));
        assert_eq!(value.to_json(), items);
    }

    #[test]
    fn parse_structured_rejects_malformed_options() {
        assert!(matches!(
            FieldValue::parse_structured("{\"size\": [\"S\", \"M\""),
            Err(CoreError::MalformedStructure(_))
        ));
        assert!(FieldValue::parse_structured("[1, 2]").is_err());
        assert_eq!(
            FieldValue::parse_structured("   ").unwrap(),
            FieldValue::Map(BTreeMap::new())
        );
        let parsed = FieldValue::parse_structured("{\"color\": [\"red\"]}").unwrap();
        assert_eq!(parsed.to_json(), json!({ "color": ["red"] }));
    }

    #[test]
    fn display_text_for_search() {
        assert_eq!(FieldValue::Integer(880).display_text(), "880");
        assert_eq!(FieldValue::Null.display_text(), "");
        assert_eq!(FieldValue::from("已出貨").display_text(), "已出貨");
    }
}
