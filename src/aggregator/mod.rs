//! Reconstruction of the isolate/script/execution/call tree.
//!
//! This module turns classified lines into a [`Trace`](crate::parser::Trace):
//! - Per-isolate call stacks (nesting, arguments, returns)
//! - Execution boundaries and script/isolate routing
//! - Parallel per-isolate reconstruction
//! - Summary metrics

pub mod accumulator;
pub mod builder;
pub mod call_stack;
pub mod ids;
pub mod metrics;
pub mod parallel;

// Re-export main types and functions
pub use accumulator::{reconstruct, reconstruct_str, TraceAccumulator};
pub use builder::CallParent;
pub use call_stack::{CallStack, StackViolation};
pub use ids::IdGenerator;
pub use metrics::{summarize, ApiUsage, TraceSummary};
pub use parallel::{partition_by_isolate, reconstruct_parallel};
