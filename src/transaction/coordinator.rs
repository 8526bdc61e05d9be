// ============================================================================
// Transaction Coordinator
// ============================================================================
//
// Owns the lifecycle of transaction handles: start (honouring propagation),
// commit (honouring rollback-only), rollback. Commit and rollback are no-ops
// on completed handles so cleanup paths can call them unconditionally.
//
// A handle either owns a physical transaction on the resource
// ("new transaction") or participates in one opened further up the call
// stack. Participants never commit physically; their rollback marks the
// shared physical transaction rollback-only.
//
// ============================================================================

use super::{Propagation, TransactionDefinition, TransactionId, TransactionalResource};
use crate::config::CoordinatorConfig;
use crate::core::{Result, TransactionError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

#[derive(Debug)]
struct PhysicalTransaction {
    id: TransactionId,
    read_only: bool,
    rollback_only: AtomicBool,
    completed: AtomicBool,
}

/// The part of a handle a unit of work and nested starts can see.
///
/// Cloning is cheap; clones share the rollback-only flags of the handle
/// they were taken from.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    physical: Arc<PhysicalTransaction>,
    local_rollback_only: Arc<AtomicBool>,
    new_transaction: bool,
    depth: usize,
}

impl TransactionContext {
    pub fn transaction_id(&self) -> TransactionId {
        self.physical.id
    }

    pub fn is_read_only(&self) -> bool {
        self.physical.read_only
    }

    /// `true` if this handle owns the physical transaction.
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// Nesting level on the call stack, 0 for a top-level handle.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Marks this handle so that a later commit turns into a rollback.
    pub fn set_rollback_only(&self) {
        self.local_rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.local_rollback_only.load(Ordering::SeqCst)
            || self.physical.rollback_only.load(Ordering::SeqCst)
    }

    /// `true` once the physical transaction has been committed or rolled back.
    pub fn is_completed(&self) -> bool {
        self.physical.completed.load(Ordering::SeqCst)
    }
}

/// One unit of work's view of a transaction.
///
/// Owned by the call stack that started it; commit or roll it back through
/// the `TransactionCoordinator` that created it.
#[derive(Debug)]
pub struct TransactionHandle {
    context: TransactionContext,
    propagation: Propagation,
    completed: bool,
}

impl TransactionHandle {
    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.context.transaction_id()
    }

    pub fn is_read_only(&self) -> bool {
        self.context.is_read_only()
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    pub fn is_new_transaction(&self) -> bool {
        self.context.is_new_transaction()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn set_rollback_only(&self) {
        self.context.set_rollback_only();
    }

    pub fn is_rollback_only(&self) -> bool {
        self.context.is_rollback_only()
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if !self.completed && self.context.new_transaction && !self.context.is_completed() {
            // Async rollback is not possible in Drop.
            warn!(
                txn = %self.context.transaction_id(),
                "Transaction handle dropped while still active; transaction left open on the resource"
            );
        }
    }
}

pub struct TransactionCoordinator {
    resource: Arc<dyn TransactionalResource>,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    pub fn new(resource: Arc<dyn TransactionalResource>) -> Self {
        Self::with_config(resource, CoordinatorConfig::default())
    }

    pub fn with_config(resource: Arc<dyn TransactionalResource>, config: CoordinatorConfig) -> Self {
        Self { resource, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Starts a top-level unit of work (no ambient transaction).
    pub async fn start(&self, read_only: bool, propagation: Propagation) -> Result<TransactionHandle> {
        self.start_within(None, TransactionDefinition::new(read_only, propagation))
            .await
    }

    /// Starts a unit of work nested in `ambient`, if any.
    ///
    /// An ambient transaction that has already completed counts as absent.
    pub async fn start_within(
        &self,
        ambient: Option<&TransactionContext>,
        definition: TransactionDefinition,
    ) -> Result<TransactionHandle> {
        let ambient = ambient.filter(|ctx| !ctx.is_completed());
        let depth = ambient.map(|ctx| ctx.depth + 1).unwrap_or(0);
        if depth > self.config.max_nesting_depth {
            return Err(TransactionError::NestingTooDeep {
                depth,
                max: self.config.max_nesting_depth,
            });
        }

        match (definition.propagation, ambient) {
            (Propagation::Required | Propagation::Mandatory, Some(outer)) => {
                trace!(
                    txn = %outer.transaction_id(),
                    propagation = %definition.propagation,
                    "Participating in existing transaction"
                );
                Ok(TransactionHandle {
                    context: TransactionContext {
                        physical: outer.physical.clone(),
                        local_rollback_only: Arc::new(AtomicBool::new(false)),
                        new_transaction: false,
                        depth,
                    },
                    propagation: definition.propagation,
                    completed: false,
                })
            }
            (Propagation::Mandatory, None) => {
                Err(TransactionError::NoAmbientTransaction(Propagation::Mandatory))
            }
            (Propagation::Required | Propagation::RequiresNew, _) => {
                self.begin_new(definition, depth).await
            }
        }
    }

    /// Returns `existing` if it is still open, otherwise starts a new
    /// read-write `Required` transaction.
    pub async fn start_if_required(
        &self,
        existing: Option<TransactionHandle>,
    ) -> Result<TransactionHandle> {
        match existing {
            Some(handle) if !handle.is_completed() => Ok(handle),
            _ => self.start(false, Propagation::Required).await,
        }
    }

    async fn begin_new(&self, definition: TransactionDefinition, depth: usize) -> Result<TransactionHandle> {
        trace!(
            read_only = definition.read_only,
            propagation = %definition.propagation,
            depth,
            "Starting new transaction"
        );
        let id = self.resource.begin(&definition).await?;
        trace!(txn = %id, "Transaction started");

        Ok(TransactionHandle {
            context: TransactionContext {
                physical: Arc::new(PhysicalTransaction {
                    id,
                    read_only: definition.read_only,
                    rollback_only: AtomicBool::new(false),
                    completed: AtomicBool::new(false),
                }),
                local_rollback_only: Arc::new(AtomicBool::new(false)),
                new_transaction: true,
                depth,
            },
            propagation: definition.propagation,
            completed: false,
        })
    }

    /// Commits the handle.
    ///
    /// If the handle is rollback-only a rollback is done instead, without
    /// reporting an error. If the resource fails to commit, the handle stays
    /// open so that a following `rollback` still reaches the resource.
    pub async fn commit(&self, handle: &mut TransactionHandle) -> Result<()> {
        if handle.completed {
            return Ok(());
        }

        if handle.is_rollback_only() {
            trace!(txn = %handle.transaction_id(), "Transaction is set rollback only");
            return self.rollback(handle).await;
        }

        let id = handle.transaction_id();
        if handle.context.new_transaction {
            trace!(txn = %id, "Committing transaction");
            self.resource.commit(id).await?;
            handle.context.physical.completed.store(true, Ordering::SeqCst);
            trace!(txn = %id, "Transaction committed");
        } else {
            trace!(txn = %id, "Participating transaction, commit left to the outer unit of work");
        }

        handle.completed = true;
        Ok(())
    }

    /// Rolls back the handle. The handle counts as completed afterwards
    /// even if the resource reported a failure.
    pub async fn rollback(&self, handle: &mut TransactionHandle) -> Result<()> {
        if handle.completed {
            return Ok(());
        }
        handle.completed = true;

        let id = handle.transaction_id();
        if handle.context.new_transaction {
            trace!(txn = %id, "Rolling back transaction");
            handle.context.physical.completed.store(true, Ordering::SeqCst);
            self.resource.rollback(id).await?;
            trace!(txn = %id, "Transaction rolled back");
        } else if self.config.global_rollback_on_participation_failure {
            debug!(txn = %id, "Participating transaction failed, marking outer transaction rollback-only");
            handle.context.physical.rollback_only.store(true, Ordering::SeqCst);
        } else {
            trace!(txn = %id, "Participating transaction failed, outer transaction left untouched");
        }

        Ok(())
    }

    /// `commit` for an optional handle; `None` is a no-op.
    pub async fn commit_opt(&self, handle: Option<&mut TransactionHandle>) -> Result<()> {
        match handle {
            Some(handle) => self.commit(handle).await,
            None => Ok(()),
        }
    }

    /// `rollback` for an optional handle; `None` is a no-op.
    pub async fn rollback_opt(&self, handle: Option<&mut TransactionHandle>) -> Result<()> {
        match handle {
            Some(handle) => self.rollback(handle).await,
            None => Ok(()),
        }
    }

    /// Rollback on a failure path: a rollback error is logged and swallowed
    /// so that the original failure reaches the caller.
    pub(crate) async fn rollback_after_failure(&self, handle: &mut TransactionHandle) {
        if let Err(err) = self.rollback(handle).await {
            warn!(
                txn = %handle.transaction_id(),
                error = %err,
                "Rollback after failed unit of work did not succeed"
            );
        }
    }
}
