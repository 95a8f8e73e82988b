//! Record classification and the reconstructed trace model.
//!
//! This module handles:
//! - Classifying raw instrumentation records into typed lines
//! - Defining the isolate/script/execution/call data model

pub mod classifier;
pub mod line;
pub mod schema;

// Re-export main types
pub use classifier::{classify_lines, LineClassifier, PipeClassifier};
pub use line::{
    CallRecord, ControlEvent, ControlRecord, Line, LineKind, LineType, RecordKind, ValueRecord,
};
pub use schema::{
    Arg, Call, CallState, EntityId, Execution, ExecutionKind, ExecutionState, IgnoredCounts,
    Isolate, OpenWpmResults, Script, Trace,
};
