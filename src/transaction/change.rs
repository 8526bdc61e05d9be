// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Writes staged inside a transaction. They are applied to the committed
// store on COMMIT and discarded on ROLLBACK.
//
// ============================================================================

use crate::core::FieldValue;
use serde::{Deserialize, Serialize};

/// Identity of a stored entity: its type name plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.entity_type, self.id)
    }
}

/// Field state of one entity, index-aligned names and values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub field_names: Vec<String>,
    pub values: Vec<FieldValue>,
}

impl EntityRecord {
    pub fn new(field_names: Vec<String>, values: Vec<FieldValue>) -> Self {
        Self {
            field_names,
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_names
            .iter()
            .position(|name| name == field)
            .and_then(|idx| self.values.get(idx))
    }
}

/// A single staged write in a transaction
#[derive(Debug, Clone)]
pub enum Change {
    /// Insert or replace the record stored under `key`
    Upsert { key: EntityKey, record: EntityRecord },

    /// Remove the record stored under `key`
    Delete { key: EntityKey },
}

impl Change {
    pub fn key(&self) -> &EntityKey {
        match self {
            Change::Upsert { key, .. } => key,
            Change::Delete { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_key() {
        let key = EntityKey::new("Order", "42");
        let change = Change::Upsert {
            key: key.clone(),
            record: EntityRecord::new(vec![], vec![]),
        };
        assert_eq!(change.key(), &key);
        assert_eq!(format!("{}", key), "Order[42]");
    }

    #[test]
    fn test_record_field_lookup() {
        let record = EntityRecord::new(
            vec!["code".into(), "note".into()],
            vec![FieldValue::from("A-1"), FieldValue::Null],
        );
        assert_eq!(record.get("code"), Some(&FieldValue::from("A-1")));
        assert_eq!(record.get("note"), Some(&FieldValue::Null));
        assert_eq!(record.get("missing"), None);
    }
}
