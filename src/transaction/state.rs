// ============================================================================
// Transaction State Management
// ============================================================================
//
// Identifiers, lifecycle states and the definition a unit of work is started
// with (read-only flag + propagation mode).
//
// Physical transaction lifecycle:
//   Active ──commit──> Committed
//     │
//     └──rollback──> RolledBack
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a physical transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is open and accepts staged changes
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been rolled back
    RolledBack,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// How a unit of work relates to a transaction that is already open
/// further up the call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the ambient transaction, or begin a new one if there is none.
    #[default]
    Required,

    /// Always begin an independent transaction. The ambient one stays
    /// open and untouched until the inner unit of work completes.
    RequiresNew,

    /// Join the ambient transaction; fail if there is none.
    Mandatory,
}

impl std::fmt::Display for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Propagation::Required => write!(f, "REQUIRED"),
            Propagation::RequiresNew => write!(f, "REQUIRES_NEW"),
            Propagation::Mandatory => write!(f, "MANDATORY"),
        }
    }
}

/// Parameters a transaction is started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionDefinition {
    pub read_only: bool,
    pub propagation: Propagation,
}

impl TransactionDefinition {
    pub fn new(read_only: bool, propagation: Propagation) -> Self {
        Self {
            read_only,
            propagation,
        }
    }

    /// Read-only definition with the default propagation.
    pub fn read_only() -> Self {
        Self::new(true, Propagation::Required)
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }
}

impl From<Propagation> for TransactionDefinition {
    fn from(propagation: Propagation) -> Self {
        Self::new(false, propagation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
        assert_eq!(format!("{}", TransactionId(7)), "txn_7");
    }

    #[test]
    fn test_state_terminal() {
        assert!(TransactionState::Active.is_active());
        assert!(!TransactionState::Active.is_terminal());
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
    }

    #[test]
    fn test_default_definition_is_required_read_write() {
        let definition = TransactionDefinition::default();
        assert_eq!(definition.propagation, Propagation::Required);
        assert!(!definition.read_only);

        let definition: TransactionDefinition = Propagation::RequiresNew.into();
        assert_eq!(definition.propagation, Propagation::RequiresNew);
        assert!(!definition.read_only);

        let definition = TransactionDefinition::read_only().with_propagation(Propagation::Mandatory);
        assert!(definition.read_only);
        assert_eq!(definition.propagation, Propagation::Mandatory);
    }

    #[test]
    fn test_propagation_serde_names() {
        let json = serde_json::to_string(&Propagation::RequiresNew).unwrap();
        assert_eq!(json, "\"REQUIRES_NEW\"");
        let parsed: Propagation = serde_json::from_str("\"MANDATORY\"").unwrap();
        assert_eq!(parsed, Propagation::Mandatory);
    }
}
