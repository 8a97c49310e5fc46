use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// Prefix that marks a locally generated identifier.
pub const TEMP_ID_PREFIX: &str = "NEW_";

/// Identifier assigned by the remote store. Numeric ids on the wire are kept
/// as their decimal text so lookups compare the same way regardless of source.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidData("empty entity id".into()));
        }
        if id.starts_with(TEMP_ID_PREFIX) {
            return Err(CoreError::InvalidData(format!(
                "entity id {id} uses the temporary prefix"
            )));
        }
        Ok(Self(id))
    }

    pub fn from_json(value: &Value) -> Result<Self, CoreError> {
        match value {
            Value::String(s) => Self::new(s.clone()),
            Value::Number(n) => Self::new(n.to_string()),
            other => Err(CoreError::InvalidData(format!(
                "entity id must be a string or number, got {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Locally generated identifier for a record the remote store has not seen yet.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TempId(String);

impl TempId {
    pub fn generate() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::now_v7().simple()))
    }

    /// Accepts any token carrying the temporary prefix.
    pub fn parse(s: &str) -> Option<Self> {
        match s.strip_prefix(TEMP_ID_PREFIX) {
            Some(rest) if !rest.is_empty() => Some(Self(s.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Debug for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(TEMP_ID_PREFIX.len() + 8).collect();
        write!(f, "TempId({short})")
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a staged or displayed record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    Persisted(EntityId),
    Temp(TempId),
}

impl RecordKey {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match TempId::parse(s) {
            Some(temp) => Ok(Self::Temp(temp)),
            None => Ok(Self::Persisted(EntityId::new(s)?)),
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::Persisted(id) => Some(id),
            Self::Temp(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Persisted(id) => id.as_str(),
            Self::Temp(temp) => temp.as_str(),
        }
    }
}

impl From<EntityId> for RecordKey {
    fn from(id: EntityId) -> Self {
        Self::Persisted(id)
    }
}

impl From<TempId> for RecordKey {
    fn from(temp: TempId) -> Self {
        Self::Temp(temp)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_are_unique_and_prefixed() {
        let a = TempId::generate();
        let b = TempId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(TEMP_ID_PREFIX));
    }

    #[test]
    fn debug_shortens_on_char_boundaries() {
        let temp = TempId::parse("NEW_abcdefg中文字").unwrap();
        assert_eq!(format!("{temp:?}"), "TempId(NEW_abcdefg中)");
        let short = TempId::parse("NEW_品").unwrap();
        assert_eq!(format!("{short:?}"), "TempId(NEW_品)");
    }

    #[test]
    fn record_key_parse_distinguishes_temp_ids() {
        assert_eq!(
            RecordKey::parse("NEW_1").unwrap(),
            RecordKey::Temp(TempId::parse("NEW_1").unwrap())
        );
        assert_eq!(
            RecordKey::parse("P1").unwrap(),
            RecordKey::Persisted(EntityId::new("P1").unwrap())
        );
        assert!(TempId::parse("NEW_").is_none());
    }

    #[test]
    fn entity_id_rejects_temporary_prefix_and_blank() {
        assert!(EntityId::new("NEW_7").is_err());
        assert!(EntityId::new("  ").is_err());
    }

    #[test]
    fn entity_id_accepts_numeric_wire_ids() {
        let id = EntityId::from_json(&serde_json::json!(42)).unwrap();
        assert_eq!(id.as_str(), "42");
        assert!(EntityId::from_json(&serde_json::json!(null)).is_err());
    }
}
