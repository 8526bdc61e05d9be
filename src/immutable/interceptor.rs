// ============================================================================
// Immutability Interceptor
// ============================================================================
//
// Runs at flush time for every dirty entity. Illegal changes are logged and
// reverted in the snapshot; nothing is ever returned as an error because a
// flush that has started cannot be aborted.
//
// ============================================================================

use super::MetadataRegistry;
use crate::core::FieldValue;
use crate::flush::FlushInterceptor;
use crate::transaction::EntityKey;
use log::{error, warn};
use std::sync::Arc;
use thiserror::Error;

/// Field state of one entity at flush time, index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub field_names: Vec<String>,
    pub previous: Vec<FieldValue>,
    pub current: Vec<FieldValue>,
}

impl FieldSnapshot {
    pub fn new(field_names: Vec<String>, previous: Vec<FieldValue>, current: Vec<FieldValue>) -> Self {
        Self {
            field_names,
            previous,
            current,
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.field_names.len() == self.previous.len() && self.previous.len() == self.current.len()
    }

    /// Names of the fields whose current value differs from the previous one.
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.field_names
            .iter()
            .zip(self.previous.iter().zip(&self.current))
            .filter(|(_, (previous, current))| previous != current)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_fields().is_empty()
    }
}

/// A change the metadata does not allow. Reported, never raised.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("ILLEGAL MODIFICATION ATTEMPT: {entity}.{field}: {previous} -> {attempted}")]
pub struct MutationViolation {
    pub entity: EntityKey,
    pub field: String,
    pub previous: FieldValue,
    pub attempted: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionResult {
    /// Current state with every illegal change replaced by its previous value.
    pub corrected_state: Vec<FieldValue>,
    pub reverted: bool,
    pub violations: Vec<MutationViolation>,
}

impl CorrectionResult {
    fn unchanged(current: &[FieldValue]) -> Self {
        Self {
            corrected_state: current.to_vec(),
            reverted: false,
            violations: Vec::new(),
        }
    }
}

pub struct ImmutabilityInterceptor {
    registry: Arc<MetadataRegistry>,
}

impl ImmutabilityInterceptor {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Compares both sides of `snapshot` against the mutability rules of the
    /// entity's type. Does not touch `snapshot`.
    pub fn check(&self, entity: &EntityKey, snapshot: &FieldSnapshot) -> CorrectionResult {
        let metadata = match self.registry.get(&entity.entity_type) {
            Some(metadata) if metadata.is_enforced() => metadata,
            _ => return CorrectionResult::unchanged(&snapshot.current),
        };

        if !snapshot.is_aligned() {
            warn!(
                "Misaligned flush snapshot for {}: {} names, {} previous, {} current values; values past the common prefix are treated as immutable",
                entity,
                snapshot.field_names.len(),
                snapshot.previous.len(),
                snapshot.current.len()
            );
        }

        let mut corrected_state = snapshot.current.clone();
        let mut violations = Vec::new();

        for (idx, attempted) in snapshot.current.iter().enumerate() {
            let field = snapshot.field_names.get(idx);
            // A value without a previous counterpart was absent before.
            let previous = snapshot.previous.get(idx).unwrap_or(&FieldValue::Null);
            if previous == attempted {
                continue;
            }

            // Past the aligned prefix no rule can be matched: closed by default.
            let allowed = match field {
                Some(name) if idx < snapshot.previous.len() => {
                    metadata.rule_for(name).allows(previous, attempted)
                }
                _ => false,
            };
            if allowed {
                continue;
            }

            let violation = MutationViolation {
                entity: entity.clone(),
                field: field.cloned().unwrap_or_else(|| format!("#{}", idx)),
                previous: previous.clone(),
                attempted: attempted.clone(),
            };
            error!("{}", violation);

            corrected_state[idx] = previous.clone();
            violations.push(violation);
        }

        CorrectionResult {
            corrected_state,
            reverted: !violations.is_empty(),
            violations,
        }
    }
}

impl FlushInterceptor for ImmutabilityInterceptor {
    fn name(&self) -> &'static str {
        "immutability"
    }

    fn on_flush_dirty(&self, entity: &EntityKey, snapshot: &mut FieldSnapshot) -> bool {
        let result = self.check(entity, snapshot);
        if result.reverted {
            snapshot.current = result.corrected_state;
        }
        result.reverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immutable::EntityMetadata;
    use chrono::{DateTime, FixedOffset, TimeZone};

    fn interceptor() -> ImmutabilityInterceptor {
        let registry = MetadataRegistry::new()
            .with(
                EntityMetadata::immutable("Order")
                    .mutable("note")
                    .mutable_once("shipped_at"),
            )
            .with(EntityMetadata::mutable_entity("Customer"));
        ImmutabilityInterceptor::new(Arc::new(registry))
    }

    fn snapshot(field: &str, previous: FieldValue, current: FieldValue) -> FieldSnapshot {
        FieldSnapshot::new(vec![field.to_string()], vec![previous], vec![current])
    }

    #[test]
    fn test_immutable_field_is_reverted() {
        let ic = interceptor();
        let key = EntityKey::new("Order", "1");
        let result = ic.check(&key, &snapshot("code", "A".into(), "B".into()));

        assert!(result.reverted);
        assert_eq!(result.corrected_state, vec![FieldValue::from("A")]);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(
            result.violations[0].to_string(),
            "ILLEGAL MODIFICATION ATTEMPT: Order[1].code: 'A' -> 'B'"
        );
    }

    #[test]
    fn test_unenforced_types_pass_through() {
        let ic = interceptor();
        for entity_type in ["Customer", "NeverRegistered"] {
            let key = EntityKey::new(entity_type, "1");
            let result = ic.check(&key, &snapshot("code", "A".into(), "B".into()));
            assert!(!result.reverted);
            assert_eq!(result.corrected_state, vec![FieldValue::from("B")]);
        }
    }

    #[test]
    fn test_mutable_once_from_empty() {
        let ic = interceptor();
        let key = EntityKey::new("Order", "1");

        let first = ic.check(&key, &snapshot("shipped_at", FieldValue::Null, "X".into()));
        assert!(!first.reverted);

        let second = ic.check(&key, &snapshot("shipped_at", "X".into(), "Y".into()));
        assert!(second.reverted);
        assert_eq!(second.corrected_state, vec![FieldValue::from("X")]);
    }

    #[test]
    fn test_same_instant_in_other_offset_is_unchanged() {
        let ic = interceptor();
        let key = EntityKey::new("Order", "1");
        let utc: DateTime<FixedOffset> = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .unwrap();
        let cet = utc.with_timezone(&FixedOffset::east_opt(3600).unwrap());

        let result = ic.check(&key, &snapshot("created_at", utc.into(), cet.into()));
        assert!(!result.reverted);
    }

    #[test]
    fn test_on_flush_dirty_rewrites_only_illegal_fields() {
        let ic = interceptor();
        let key = EntityKey::new("Order", "7");
        let mut snap = FieldSnapshot::new(
            vec!["code".into(), "note".into(), "amount".into()],
            vec!["A".into(), "old".into(), 10_i64.into()],
            vec!["B".into(), "new".into(), 10_i64.into()],
        );

        assert!(ic.on_flush_dirty(&key, &mut snap));
        assert_eq!(
            snap.current,
            vec![FieldValue::from("A"), FieldValue::from("new"), FieldValue::from(10_i64)]
        );
    }

    #[test]
    fn test_misaligned_snapshot_reverts_trailing_values() {
        let ic = interceptor();
        let key = EntityKey::new("Order", "1");
        let snap = FieldSnapshot::new(
            vec!["note".into()],
            vec!["old".into(), "x".into(), "same".into()],
            vec!["new".into(), "y".into(), "same".into(), "z".into()],
        );
        assert!(!snap.is_aligned());

        let result = ic.check(&key, &snap);
        assert!(result.reverted);
        assert_eq!(
            result.corrected_state,
            vec![
                FieldValue::from("new"),
                FieldValue::from("x"),
                FieldValue::from("same"),
                FieldValue::Null,
            ]
        );
        let fields: Vec<_> = result.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["#1", "#3"]);
    }

    #[test]
    fn test_named_field_without_previous_value_is_immutable() {
        let ic = interceptor();
        let key = EntityKey::new("Order", "1");
        // "note" is always mutable, but there is nothing to compare it against.
        let snap = FieldSnapshot::new(vec!["note".into()], vec![], vec!["n".into()]);

        let result = ic.check(&key, &snap);
        assert!(result.reverted);
        assert_eq!(result.corrected_state, vec![FieldValue::Null]);
        assert_eq!(result.violations[0].field, "note");
    }

    #[test]
    fn test_dirty_fields() {
        let snap = FieldSnapshot::new(
            vec!["code".into(), "note".into()],
            vec!["A".into(), FieldValue::Null],
            vec!["A".into(), "n".into()],
        );
        assert_eq!(snap.dirty_fields(), vec!["note"]);
        assert!(snap.is_dirty());
    }
}
