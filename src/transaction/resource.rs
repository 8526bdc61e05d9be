use super::{TransactionDefinition, TransactionId};
use crate::core::Result;
use async_trait::async_trait;

/// The underlying transactional resource the coordinator drives.
///
/// Only physical transactions reach this trait: joining an ambient
/// transaction is decided by the coordinator and never calls `begin`.
/// Implementations must be safe to share between tasks and serialize
/// access to their own internal state.
#[async_trait]
pub trait TransactionalResource: Send + Sync {
    /// Begins a physical transaction.
    ///
    /// Fails with `TransactionError::ResourceUnavailable` when the
    /// resource cannot be acquired.
    async fn begin(&self, definition: &TransactionDefinition) -> Result<TransactionId>;

    async fn commit(&self, id: TransactionId) -> Result<()>;

    async fn rollback(&self, id: TransactionId) -> Result<()>;
}
