// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Declarative transaction demarcation over a pluggable resource:
//
// - `TransactionCoordinator`: handle lifecycle and propagation
// - `ExecutionWrapper`: run-in-transaction for closures, commit/rollback
//   decided by the closure's outcome
// - `InMemoryTransactionManager`: reference resource with staged writes
//
// ============================================================================

pub mod change;
pub mod coordinator;
pub mod manager;
pub mod resource;
pub mod state;
pub mod wrapper;

pub use change::{Change, EntityKey, EntityRecord};
pub use coordinator::{TransactionContext, TransactionCoordinator, TransactionHandle};
pub use manager::{InMemoryTransactionManager, TransactionInfo, TransactionStats};
pub use resource::TransactionalResource;
pub use state::{Propagation, TransactionDefinition, TransactionId, TransactionState};
pub use wrapper::{ExecutionWrapper, TransactionScope};
