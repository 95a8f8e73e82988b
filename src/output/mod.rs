//! Output writers for reconstructed traces.
//!
//! This module handles:
//! - Flattening a trace to `{id, parent, children}` records and rebuilding it
//! - Writing and reading versioned JSON trace documents

pub mod flat;
pub mod json;

// Re-export main functions
pub use flat::{flatten, rebuild, FlatRecord, RecordBody};
pub use json::{
    document_to_string, document_to_trace, read_document, to_document, validate_path,
    write_document, TraceDocument,
};
