//! Global entity ID assignment.

use crate::parser::schema::EntityId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic ID source shared by every accumulator of one reconstruction run
///
/// Cloning the generator shares the counter, so accumulators running on
/// different threads never hand out the same ID.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next_id: Arc<AtomicU64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Take the next unused ID
    pub fn next_id(&self) -> EntityId {
        EntityId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
