// ============================================================================
// txguard Library
// ============================================================================
//
// Transaction demarcation for units of work (propagation, commit/rollback
// decided by the outcome of the work) and flush-time immutability
// enforcement for entities.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod entity;
pub mod flush;
pub mod immutable;
pub mod repository;
pub mod transaction;

// Re-export main types for convenience
pub use self::config::{CoordinatorConfig, ManagerConfig};
pub use self::core::{FieldValue, Result, Retryable, ServiceError, TransactionError};
pub use entity::{Entity, MappingError};
pub use flush::{FlushInterceptor, FlushPipeline};
pub use immutable::{
    CorrectionResult, EntityMetadata, FieldSnapshot, ImmutabilityInterceptor, MetadataRegistry,
    MutabilityRule, MutationViolation,
};
pub use repository::{EntityRepository, RepositoryError, RepositoryResult};
pub use transaction::{
    EntityKey, EntityRecord, ExecutionWrapper, InMemoryTransactionManager, Propagation,
    TransactionContext, TransactionCoordinator, TransactionDefinition, TransactionHandle,
    TransactionId, TransactionScope, TransactionState, TransactionStats, TransactionalResource,
};
