//! Per-isolate call stack tracking.
//!
//! Each isolate gets its own LIFO stack of open calls. Arguments and return
//! values attach to the stack top; a new call becomes a child of the stack
//! top, or a top-level call of the current execution when the stack is empty.
//!
//! Example: `getContext` opened, then `fillText` opened, then two returns
//! leave `fillText` as the only child of `getContext`.

use crate::parser::schema::EntityId;

/// Stack discipline violations. The offending event is dropped and the
/// stack is left exactly as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackViolation {
    /// Argument record with no open call
    OrphanArg,
    /// Return record with no open call
    OrphanRet,
}

/// LIFO stack of open calls for one isolate
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<EntityId>,
}

impl CallStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Open a call on top of the stack
    pub fn push(&mut self, call: EntityId) {
        self.frames.push(call);
    }

    /// Innermost open call
    pub fn top(&self) -> Option<EntityId> {
        self.frames.last().copied()
    }

    /// Target for an argument record
    pub fn arg_target(&self) -> Result<EntityId, StackViolation> {
        self.top().ok_or(StackViolation::OrphanArg)
    }

    /// Close the innermost call for a return record
    pub fn pop_for_return(&mut self) -> Result<EntityId, StackViolation> {
        self.frames.pop().ok_or(StackViolation::OrphanRet)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Remove every open call, innermost first
    pub fn drain_open(&mut self) -> Vec<EntityId> {
        let mut open = std::mem::take(&mut self.frames);
        open.reverse();
        open
    }
}
