use crate::core::FieldValue;
use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a single field of an enforced entity type may change after it has
/// been written once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutabilityRule {
    /// Any observed change is illegal.
    #[default]
    Immutable,

    /// Changes are always allowed.
    MutableAlways,

    /// The field may be set once, from an empty value to a non-empty one.
    MutableOnceFromEmpty,
}

impl MutabilityRule {
    /// Whether changing a field from `previous` to `attempted` is allowed.
    /// Callers only ask for values that actually differ.
    pub fn allows(&self, previous: &FieldValue, attempted: &FieldValue) -> bool {
        match self {
            MutabilityRule::Immutable => false,
            MutabilityRule::MutableAlways => true,
            MutabilityRule::MutableOnceFromEmpty => previous.is_empty() && !attempted.is_empty(),
        }
    }
}

/// Static mutability declaration of one entity type.
///
/// Closed by default: a type that does not opt in is left alone by the
/// interceptor, and on an opted-in type every field without an explicit
/// rule is `Immutable`.
///
/// ```ignore
/// let metadata = EntityMetadata::immutable("Order")
///     .mutable("note")
///     .mutable_once("shipped_at");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    entity_type: String,
    enforced: bool,
    fields: HashMap<String, MutabilityRule>,
}

impl EntityMetadata {
    /// Metadata for a type whose fields are guarded.
    pub fn immutable(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            enforced: true,
            fields: HashMap::new(),
        }
    }

    /// Metadata for an ordinary type the interceptor does not inspect.
    pub fn mutable_entity(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            enforced: false,
            fields: HashMap::new(),
        }
    }

    pub fn mutable(self, field: impl Into<String>) -> Self {
        self.with_rule(field, MutabilityRule::MutableAlways)
    }

    pub fn mutable_once(self, field: impl Into<String>) -> Self {
        self.with_rule(field, MutabilityRule::MutableOnceFromEmpty)
    }

    pub fn with_rule(mut self, field: impl Into<String>, rule: MutabilityRule) -> Self {
        self.fields.insert(field.into(), rule);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn is_enforced(&self) -> bool {
        self.enforced
    }

    pub fn rule_for(&self, field: &str) -> MutabilityRule {
        self.fields.get(field).copied().unwrap_or_default()
    }
}

/// Entity type name -> mutability declaration.
///
/// Built once at startup and then shared read-only (usually behind an
/// `Arc`), so lookups need no locking.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entries: HashMap<String, EntityMetadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `metadata`, replacing an earlier declaration for the same type.
    pub fn with(mut self, metadata: EntityMetadata) -> Self {
        self.insert(metadata);
        self
    }

    pub fn insert(&mut self, metadata: EntityMetadata) -> Option<EntityMetadata> {
        self.entries
            .insert(metadata.entity_type().to_string(), metadata)
    }

    /// Registers the declaration an entity type carries.
    pub fn register<E: Entity>(&mut self) -> &mut Self {
        self.insert(E::mutability());
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntityMetadata> {
        self.entries.get(entity_type)
    }

    pub fn is_enforced(&self, entity_type: &str) -> bool {
        self.get(entity_type).is_some_and(EntityMetadata::is_enforced)
    }

    /// Unknown types and undeclared fields are `Immutable`.
    pub fn rule_for(&self, entity_type: &str, field: &str) -> MutabilityRule {
        self.get(entity_type)
            .map(|metadata| metadata.rule_for(field))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
