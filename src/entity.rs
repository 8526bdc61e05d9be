use crate::core::FieldValue;
use crate::immutable::EntityMetadata;
use crate::transaction::{EntityKey, EntityRecord};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot map field '{field}' of {entity_type}: {message}")]
pub struct MappingError {
    pub entity_type: String,
    pub field: String,
    pub message: String,
}

impl MappingError {
    pub fn missing(entity_type: &str, field: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            message: "field is missing".to_string(),
        }
    }

    pub fn unexpected(entity_type: &str, field: &str, expected: &str, found: &FieldValue) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            message: format!("expected {}, found {}", expected, found.type_name()),
        }
    }
}

/// A persistent type with an identity and a static field layout.
///
/// Implementations list their fields explicitly; nothing is discovered at
/// runtime. A type that wants its fields guarded overrides `mutability`.
pub trait Entity: Sized + Send + Sync {
    /// Stable type name, the key into the metadata registry.
    fn entity_type() -> &'static str;

    fn id(&self) -> String;

    fn field_names() -> Vec<&'static str>;

    /// Values in the order of `field_names`.
    fn field_values(&self) -> Vec<FieldValue>;

    fn from_record(id: &str, record: &EntityRecord) -> Result<Self, MappingError>;

    fn mutability() -> EntityMetadata {
        EntityMetadata::mutable_entity(Self::entity_type())
    }

    fn business_key(&self) -> String {
        self.id()
    }

    fn as_business_string(&self) -> String {
        format!("{}: {}", Self::entity_type(), self.business_key())
    }

    fn key(&self) -> EntityKey {
        EntityKey::new(Self::entity_type(), self.id())
    }

    fn to_record(&self) -> EntityRecord {
        EntityRecord::new(
            Self::field_names().into_iter().map(String::from).collect(),
            self.field_values(),
        )
    }
}

/// Looks up a field that `from_record` cannot do without.
pub fn require<'a>(
    entity_type: &str,
    record: &'a EntityRecord,
    field: &str,
) -> Result<&'a FieldValue, MappingError> {
    record
        .get(field)
        .ok_or_else(|| MappingError::missing(entity_type, field))
}

/// Text field; `Null` maps to `None`.
pub fn optional_text(
    entity_type: &str,
    record: &EntityRecord,
    field: &str,
) -> Result<Option<String>, MappingError> {
    match require(entity_type, record, field)? {
        FieldValue::Null => Ok(None),
        FieldValue::Text(s) => Ok(Some(s.clone())),
        other => Err(MappingError::unexpected(entity_type, field, "TEXT", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immutable::MutabilityRule;

    #[derive(Debug, PartialEq)]
    struct Invoice {
        number: String,
        memo: Option<String>,
    }

    impl Entity for Invoice {
        fn entity_type() -> &'static str {
            "Invoice"
        }

        fn id(&self) -> String {
            self.number.clone()
        }

        fn field_names() -> Vec<&'static str> {
            vec!["memo"]
        }

        fn field_values(&self) -> Vec<FieldValue> {
            vec![self.memo.clone().into()]
        }

        fn from_record(id: &str, record: &EntityRecord) -> Result<Self, MappingError> {
            Ok(Self {
                number: id.to_string(),
                memo: optional_text(Self::entity_type(), record, "memo")?,
            })
        }

        fn mutability() -> EntityMetadata {
            EntityMetadata::immutable(Self::entity_type()).mutable_once("memo")
        }
    }

    #[test]
    fn test_record_mapping() {
        let invoice = Invoice {
            number: "INV-1".into(),
            memo: None,
        };
        let record = invoice.to_record();
        assert_eq!(record.field_names, vec!["memo".to_string()]);
        assert_eq!(record.values, vec![FieldValue::Null]);

        let back = Invoice::from_record("INV-1", &record).unwrap();
        assert_eq!(back, invoice);
        assert_eq!(invoice.key(), EntityKey::new("Invoice", "INV-1"));
        assert_eq!(invoice.as_business_string(), "Invoice: INV-1");
    }

    #[test]
    fn test_mapping_errors() {
        let empty = EntityRecord::new(vec![], vec![]);
        let err = Invoice::from_record("INV-1", &empty).unwrap_err();
        assert_eq!(err, MappingError::missing("Invoice", "memo"));

        let wrong = EntityRecord::new(vec!["memo".into()], vec![FieldValue::Integer(3)]);
        let err = Invoice::from_record("INV-1", &wrong).unwrap_err();
        assert_eq!(err.to_string(), "Cannot map field 'memo' of Invoice: expected TEXT, found INTEGER");
    }

    #[test]
    fn test_declared_mutability() {
        let metadata = Invoice::mutability();
        assert!(metadata.is_enforced());
        assert_eq!(metadata.rule_for("memo"), MutabilityRule::MutableOnceFromEmpty);
    }
}
