pub mod interceptor;
pub mod metadata;

pub use interceptor::{CorrectionResult, FieldSnapshot, ImmutabilityInterceptor, MutationViolation};
pub use metadata::{EntityMetadata, MetadataRegistry, MutabilityRule};
