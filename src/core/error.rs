use crate::transaction::{Propagation, TransactionId, TransactionState};
use log::error;
use thiserror::Error;

/// Capability of an error to tell the caller whether repeating the
/// failed request a little later may succeed (e.g. a transient outage).
///
/// The transaction layer never retries on its own; it only carries the
/// marker through unchanged.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transactional resource unavailable: {message}")]
    ResourceUnavailable { message: String, retryable: bool },

    #[error("Transaction {0} not found")]
    NotFound(TransactionId),

    #[error("Transaction {id} is not active (state: {state})")]
    NotActive {
        id: TransactionId,
        state: TransactionState,
    },

    #[error("Propagation {0} requires an existing transaction")]
    NoAmbientTransaction(Propagation),

    #[error("Transaction nesting depth {depth} exceeds the configured maximum of {max}")]
    NestingTooDeep { depth: usize, max: usize },

    #[error("Transaction {0} is read-only")]
    ReadOnly(TransactionId),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransactionError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            message: message.into(),
            retryable: true,
        }
    }
}

impl Retryable for TransactionError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransactionError::ResourceUnavailable {
                retryable: true,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, TransactionError>;

/// General purpose service failure carrying an optional cause and the
/// retryable marker.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ServiceError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    retryable: bool,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            retryable: false,
        }
    }

    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
            retryable: false,
        }
    }

    /// Logs the cause at error level and wraps it.
    ///
    /// The resulting message is `"<message>: <cause>"`.
    pub fn logged<E>(message: &str, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let msg = format!("{}: {}", message, cause);
        error!("{}", msg);
        Self::with_source(msg, cause)
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Retryable for ServiceError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<TransactionError> for ServiceError {
    fn from(err: TransactionError) -> Self {
        let retryable = err.is_retryable();
        Self::with_source(err.to_string(), err).retryable(retryable)
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            source: Some(err.into()),
            retryable: false,
        }
    }
}
