// ============================================================================
// Entity Repository
// ============================================================================
//
// Typed CRUD over the in-memory transactional resource. Every operation
// runs in the transaction of the `TransactionScope` it is given and sees
// that transaction's own staged writes. Updates go through the flush
// pipeline before they are staged.
//
// ============================================================================

use crate::core::{FieldValue, Retryable, TransactionError};
use crate::entity::{Entity, MappingError};
use crate::flush::FlushPipeline;
use crate::immutable::FieldSnapshot;
use crate::transaction::{
    Change, EntityKey, EntityRecord, InMemoryTransactionManager, TransactionScope,
};
use log::{debug, trace};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("{0} already exists")]
    AlreadyExists(EntityKey),

    #[error("{0} not found")]
    NotFound(EntityKey),
}

impl Retryable for RepositoryError {
    fn is_retryable(&self) -> bool {
        match self {
            RepositoryError::Transaction(err) => err.is_retryable(),
            _ => false,
        }
    }
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

pub struct EntityRepository<E> {
    manager: Arc<InMemoryTransactionManager>,
    pipeline: Arc<FlushPipeline>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityRepository<E> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            pipeline: self.pipeline.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityRepository<E> {
    pub fn new(manager: Arc<InMemoryTransactionManager>, pipeline: Arc<FlushPipeline>) -> Self {
        Self {
            manager,
            pipeline,
            _entity: PhantomData,
        }
    }

    fn key(id: &str) -> EntityKey {
        EntityKey::new(E::entity_type(), id)
    }

    async fn visible(&self, scope: &TransactionScope, key: &EntityKey) -> Option<EntityRecord> {
        self.manager.read(Some(scope.transaction_id()), key).await
    }

    pub async fn find_by_id(&self, scope: &TransactionScope, id: &str) -> RepositoryResult<Option<E>> {
        let start = Instant::now();
        let key = Self::key(id);
        let found = match self.visible(scope, &key).await {
            Some(record) => Some(E::from_record(id, &record)?),
            None => None,
        };
        trace!("Find for {} by id. Runtime: {:?}", key, start.elapsed());
        Ok(found)
    }

    /// Stages a new entity. Fails if one with the same id is visible.
    pub async fn create(&self, scope: &TransactionScope, entity: &E) -> RepositoryResult<()> {
        let key = entity.key();
        if self.visible(scope, &key).await.is_some() {
            return Err(RepositoryError::AlreadyExists(key));
        }

        let record = entity.to_record();
        self.manager
            .stage(scope.transaction_id(), Change::Upsert { key, record })
            .await?;
        Ok(())
    }

    /// Stages the changed fields of an existing entity and returns the
    /// entity as it will be stored, after flush interceptors had their say.
    pub async fn update(&self, scope: &TransactionScope, entity: &E) -> RepositoryResult<E> {
        let key = entity.key();
        let previous = self
            .visible(scope, &key)
            .await
            .ok_or_else(|| RepositoryError::NotFound(key.clone()))?;

        let current = entity.to_record();
        let previous_values = current
            .field_names
            .iter()
            .map(|name| previous.get(name).cloned().unwrap_or(FieldValue::Null))
            .collect();
        let mut snapshot = FieldSnapshot::new(current.field_names, previous_values, current.values);

        if !snapshot.is_dirty() {
            trace!("{} is not dirty, nothing to flush", key);
            let record = EntityRecord::new(snapshot.field_names, snapshot.current);
            return Ok(E::from_record(&key.id, &record)?);
        }

        if self.pipeline.flush_dirty(&key, &mut snapshot) {
            debug!("Update of {} was corrected during flush", key);
        }

        let record = EntityRecord::new(snapshot.field_names, snapshot.current);
        let stored = E::from_record(&key.id, &record)?;
        self.manager
            .stage(scope.transaction_id(), Change::Upsert { key, record })
            .await?;
        Ok(stored)
    }

    pub async fn create_or_update(&self, scope: &TransactionScope, entity: &E) -> RepositoryResult<E> {
        if self.visible(scope, &entity.key()).await.is_some() {
            return self.update(scope, entity).await;
        }

        self.create(scope, entity).await?;
        Ok(E::from_record(&entity.id(), &entity.to_record())?)
    }

    /// Returns `false` if there was nothing to delete.
    pub async fn delete(&self, scope: &TransactionScope, id: &str) -> RepositoryResult<bool> {
        let key = Self::key(id);
        if self.visible(scope, &key).await.is_none() {
            return Ok(false);
        }

        self.manager
            .stage(scope.transaction_id(), Change::Delete { key })
            .await?;
        Ok(true)
    }

    /// Number of committed entities of this type.
    pub async fn count_committed(&self) -> usize {
        self.manager.committed_count_of(E::entity_type()).await
    }
}
