pub mod error;
pub mod value;

pub use error::{Result, Retryable, ServiceError, TransactionError};
pub use value::FieldValue;
