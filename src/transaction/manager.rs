// ============================================================================
// In-Memory Transaction Manager
// ============================================================================
//
// Reference `TransactionalResource`: every physical transaction stages its
// writes in a private change log which is applied to the committed store
// atomically on commit and dropped on rollback.
//
// ============================================================================

use super::{
    Change, EntityKey, EntityRecord, TransactionDefinition, TransactionId, TransactionState,
    TransactionalResource,
};
use crate::config::ManagerConfig;
use crate::core::{Result, TransactionError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug)]
struct ManagedTransaction {
    id: TransactionId,
    state: TransactionState,
    read_only: bool,
    changes: Vec<Change>,
    start_time: Instant,
}

impl ManagedTransaction {
    fn new(id: TransactionId, read_only: bool) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            read_only,
            changes: Vec::new(),
            start_time: Instant::now(),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(TransactionError::NotActive {
                id: self.id,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Latest staged version of `key`: `Some(None)` if staged as deleted,
    /// `None` if this transaction never touched it.
    fn staged(&self, key: &EntityKey) -> Option<Option<&EntityRecord>> {
        self.changes.iter().rev().find(|c| c.key() == key).map(|c| match c {
            Change::Upsert { record, .. } => Some(record),
            Change::Delete { .. } => None,
        })
    }
}

pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub read_only: bool,
    pub change_count: usize,
    pub duration: Duration,
}

/// Counters of the physical transactions handled so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub active: usize,
}

pub struct InMemoryTransactionManager {
    config: ManagerConfig,

    // Open transactions only; entries are removed once they complete.
    transactions: RwLock<HashMap<TransactionId, ManagedTransaction>>,

    committed: RwLock<HashMap<EntityKey, EntityRecord>>,

    available: AtomicBool,

    begun_count: AtomicU64,
    committed_count: AtomicU64,
    rolled_back_count: AtomicU64,
}

impl Default for InMemoryTransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransactionManager {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        Self {
            config,
            transactions: RwLock::new(HashMap::new()),
            committed: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            begun_count: AtomicU64::new(0),
            committed_count: AtomicU64::new(0),
            rolled_back_count: AtomicU64::new(0),
        }
    }

    /// Simulates an outage: while unavailable, `begin` fails with a
    /// retryable `ResourceUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Records a write in the change log of an open transaction.
    pub async fn stage(&self, txn_id: TransactionId, change: Change) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn_id)
            .ok_or(TransactionError::NotFound(txn_id))?;

        transaction.ensure_active()?;
        if transaction.read_only {
            return Err(TransactionError::ReadOnly(txn_id));
        }

        transaction.changes.push(change);
        Ok(())
    }

    /// Reads `key` as seen from `txn_id`: its own staged writes first,
    /// then the committed store. Without a transaction only committed
    /// state is visible.
    pub async fn read(&self, txn_id: Option<TransactionId>, key: &EntityKey) -> Option<EntityRecord> {
        if let Some(txn_id) = txn_id {
            let transactions = self.transactions.read().await;
            if let Some(staged) = transactions.get(&txn_id).and_then(|txn| txn.staged(key)) {
                return staged.cloned();
            }
        }
        self.read_committed(key).await
    }

    pub async fn read_committed(&self, key: &EntityKey) -> Option<EntityRecord> {
        self.committed.read().await.get(key).cloned()
    }

    pub async fn committed_count_of(&self, entity_type: &str) -> usize {
        self.committed
            .read()
            .await
            .keys()
            .filter(|key| key.entity_type == entity_type)
            .count()
    }

    pub async fn is_active(&self, txn_id: TransactionId) -> bool {
        self.transactions.read().await.contains_key(&txn_id)
    }

    pub async fn get_transaction_info(&self, txn_id: TransactionId) -> Option<TransactionInfo> {
        let transactions = self.transactions.read().await;
        transactions.get(&txn_id).map(|txn| TransactionInfo {
            id: txn.id,
            state: txn.state,
            read_only: txn.read_only,
            change_count: txn.changes.len(),
            duration: txn.start_time.elapsed(),
        })
    }

    pub async fn stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.begun_count.load(Ordering::SeqCst),
            committed: self.committed_count.load(Ordering::SeqCst),
            rolled_back: self.rolled_back_count.load(Ordering::SeqCst),
            active: self.transactions.read().await.len(),
        }
    }
}

#[async_trait]
impl TransactionalResource for InMemoryTransactionManager {
    async fn begin(&self, definition: &TransactionDefinition) -> Result<TransactionId> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(TransactionError::unavailable("transactional resource is offline"));
        }

        let mut transactions = self.transactions.write().await;
        if transactions.len() >= self.config.max_active_transactions {
            return Err(TransactionError::unavailable(format!(
                "all {} transaction slots are in use",
                self.config.max_active_transactions
            )));
        }

        let txn_id = TransactionId::new();
        transactions.insert(txn_id, ManagedTransaction::new(txn_id, definition.read_only));
        self.begun_count.fetch_add(1, Ordering::SeqCst);

        Ok(txn_id)
    }

    async fn commit(&self, txn_id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn_id)
            .ok_or(TransactionError::NotFound(txn_id))?;
        transaction.ensure_active()?;
        transaction.state = TransactionState::Committed;

        let changes = std::mem::take(&mut transaction.changes);
        transactions.remove(&txn_id);

        // Still holding the transactions lock: no other commit interleaves.
        let mut committed = self.committed.write().await;
        for change in changes {
            match change {
                Change::Upsert { key, record } => {
                    committed.insert(key, record);
                }
                Change::Delete { key } => {
                    committed.remove(&key);
                }
            }
        }

        self.committed_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn_id)
            .ok_or(TransactionError::NotFound(txn_id))?;
        transaction.ensure_active()?;

        transaction.changes.clear();
        transaction.state = TransactionState::RolledBack;
        transactions.remove(&txn_id);

        self.rolled_back_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
