use crate::core::{Result, TransactionError};
use serde::Deserialize;

/// Transaction coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum nesting depth of transaction handles on one call stack
    pub max_nesting_depth: usize,

    /// Rolling back a participating (joined) handle marks the shared
    /// physical transaction rollback-only
    pub global_rollback_on_participation_failure: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 32,
            global_rollback_on_participation_failure: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum nesting depth
    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Set whether a failed participant dooms the outer transaction
    pub fn global_rollback_on_participation_failure(mut self, enabled: bool) -> Self {
        self.global_rollback_on_participation_failure = enabled;
        self
    }

    /// Parse from a JSON document; missing keys keep their defaults.
    ///
    /// ```ignore
    /// let config = CoordinatorConfig::from_json(r#"{"max_nesting_depth": 8}"#)?;
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| invalid_config("coordinator", e))
    }
}

/// Configuration of the in-memory transactional resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Maximum number of simultaneously open physical transactions
    pub max_active_transactions: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_active_transactions: 64,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum open transactions
    pub fn max_active_transactions(mut self, max: usize) -> Self {
        self.max_active_transactions = max;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| invalid_config("manager", e))
    }
}

fn invalid_config(kind: &str, err: serde_json::Error) -> TransactionError {
    TransactionError::InvalidConfig(format!("{}: {}", kind, err))
}
