use crate::immutable::FieldSnapshot;
use crate::transaction::EntityKey;
use log::debug;

/// Hook invoked once per dirty entity while its changes are written.
///
/// Interceptors run inside the flush and must not block or fail; they may
/// only rewrite `snapshot.current`.
pub trait FlushInterceptor: Send + Sync {
    /// Name for debugging
    fn name(&self) -> &'static str;

    /// Returns `true` if `snapshot.current` was modified.
    fn on_flush_dirty(&self, entity: &EntityKey, snapshot: &mut FieldSnapshot) -> bool;
}

/// Ordered set of flush interceptors. Every interceptor sees the state left
/// by the previous one.
pub struct FlushPipeline {
    interceptors: Vec<Box<dyn FlushInterceptor>>,
}

impl FlushPipeline {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    pub fn register(&mut self, interceptor: Box<dyn FlushInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn with_interceptor(mut self, interceptor: Box<dyn FlushInterceptor>) -> Self {
        self.register(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Runs all interceptors; `true` if any of them rewrote the snapshot.
    pub fn flush_dirty(&self, entity: &EntityKey, snapshot: &mut FieldSnapshot) -> bool {
        let mut modified = false;
        for interceptor in &self.interceptors {
            if interceptor.on_flush_dirty(entity, snapshot) {
                debug!("Flush interceptor '{}' corrected {}", interceptor.name(), entity);
                modified = true;
            }
        }
        modified
    }
}

impl Default for FlushPipeline {
    fn default() -> Self {
        Self::new()
    }
}
