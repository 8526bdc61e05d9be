// ============================================================================
// Transactional Execution Wrapper
// ============================================================================
//
// Runs a unit of work inside a transaction: start, run, commit on success,
// roll back on failure (errors and panics alike) and hand the failure back
// to the caller unchanged.
//
// The unit of work receives a `TransactionScope`. Nested units of work are
// started through `scope.executor()` so that they see the enclosing
// transaction as ambient.
//
// ============================================================================

use super::{TransactionContext, TransactionCoordinator, TransactionDefinition, TransactionId};
use crate::core::TransactionError;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// What a unit of work can see of the transaction it runs in.
#[derive(Clone)]
pub struct TransactionScope {
    coordinator: Arc<TransactionCoordinator>,
    context: TransactionContext,
}

impl TransactionScope {
    pub fn transaction_id(&self) -> TransactionId {
        self.context.transaction_id()
    }

    pub fn is_read_only(&self) -> bool {
        self.context.is_read_only()
    }

    pub fn is_new_transaction(&self) -> bool {
        self.context.is_new_transaction()
    }

    pub fn depth(&self) -> usize {
        self.context.depth()
    }

    /// Requests a rollback instead of a commit once the unit of work
    /// returns successfully.
    pub fn set_rollback_only(&self) {
        self.context.set_rollback_only();
    }

    pub fn is_rollback_only(&self) -> bool {
        self.context.is_rollback_only()
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    /// Wrapper whose units of work run with this scope as the ambient
    /// transaction.
    pub fn executor(&self) -> ExecutionWrapper {
        ExecutionWrapper {
            coordinator: self.coordinator.clone(),
            ambient: Some(self.context.clone()),
        }
    }
}

/// Runs units of work in transactions.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use txguard::{
///     ExecutionWrapper, InMemoryTransactionManager, Propagation, TransactionCoordinator,
///     TransactionError,
/// };
///
/// # tokio_test::block_on(async {
/// let manager = Arc::new(InMemoryTransactionManager::new());
/// let executor = ExecutionWrapper::new(Arc::new(TransactionCoordinator::new(manager.clone())));
///
/// let answer: Result<u32, TransactionError> = executor
///     .call(Propagation::Required, |_scope| async { Ok(42) })
///     .await;
///
/// assert_eq!(answer.unwrap(), 42);
/// assert_eq!(manager.stats().await.committed, 1);
/// # });
/// ```
#[derive(Clone)]
pub struct ExecutionWrapper {
    coordinator: Arc<TransactionCoordinator>,
    ambient: Option<TransactionContext>,
}

impl ExecutionWrapper {
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self {
            coordinator,
            ambient: None,
        }
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    /// Runs `work`, which produces nothing.
    pub async fn run<E, F, Fut>(
        &self,
        definition: impl Into<TransactionDefinition>,
        work: F,
    ) -> Result<(), E>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<TransactionError>,
    {
        self.execute(definition.into(), work).await
    }

    /// Runs `work` and returns its result.
    pub async fn call<R, E, F, Fut>(
        &self,
        definition: impl Into<TransactionDefinition>,
        work: F,
    ) -> Result<R, E>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TransactionError>,
    {
        self.execute(definition.into(), work).await
    }

    /// Runs `work` with one input, producing nothing.
    pub async fn run_with<C, E, F, Fut>(
        &self,
        definition: impl Into<TransactionDefinition>,
        input: C,
        work: F,
    ) -> Result<(), E>
    where
        F: FnOnce(TransactionScope, C) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<TransactionError>,
    {
        self.execute(definition.into(), move |scope| work(scope, input))
            .await
    }

    /// Runs `work` with one input and returns its result.
    pub async fn call_with<C, R, E, F, Fut>(
        &self,
        definition: impl Into<TransactionDefinition>,
        input: C,
        work: F,
    ) -> Result<R, E>
    where
        F: FnOnce(TransactionScope, C) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TransactionError>,
    {
        self.execute(definition.into(), move |scope| work(scope, input))
            .await
    }

    /// Runs `work` with two inputs and returns its result.
    pub async fn call_with2<C, D, R, E, F, Fut>(
        &self,
        definition: impl Into<TransactionDefinition>,
        first: C,
        second: D,
        work: F,
    ) -> Result<R, E>
    where
        F: FnOnce(TransactionScope, C, D) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TransactionError>,
    {
        self.execute(definition.into(), move |scope| work(scope, first, second))
            .await
    }

    async fn execute<R, E, F, Fut>(&self, definition: TransactionDefinition, work: F) -> Result<R, E>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TransactionError>,
    {
        let mut handle = self
            .coordinator
            .start_within(self.ambient.as_ref(), definition)
            .await?;

        let scope = TransactionScope {
            coordinator: self.coordinator.clone(),
            context: handle.context().clone(),
        };

        // Deferred call so a panic while building the future is caught too.
        let outcome = AssertUnwindSafe(async move { work(scope).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => {
                if let Err(err) = self.coordinator.commit(&mut handle).await {
                    self.coordinator.rollback_after_failure(&mut handle).await;
                    return Err(err.into());
                }
                Ok(value)
            }
            Ok(Err(err)) => {
                self.coordinator.rollback_after_failure(&mut handle).await;
                Err(err)
            }
            Err(panic) => {
                self.coordinator.rollback_after_failure(&mut handle).await;
                std::panic::resume_unwind(panic)
            }
        }
    }
}
