//! JSON trace document writer.
//!
//! Writes a trace as a versioned document of flat records, ready for a
//! document store, and reads such documents back.

use super::flat::{flatten, rebuild, FlatRecord};
use crate::parser::schema::Trace;
use crate::utils::config::{RECORD_FORMAT_VERSION, SCHEMA_VERSION};
use crate::utils::error::OutputError;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Top-level document written to JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceDocument {
    /// Schema version for compatibility checking
    pub version: String,

    /// Raw record format the trace was classified from
    pub format_version: u32,

    /// Log file the trace was reconstructed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Timestamp when the document was generated
    pub generated_at: String,

    pub stored_calls: usize,
    pub ignored_calls: usize,

    /// One record per entity, ordered by ID
    pub records: Vec<FlatRecord>,
}

/// Wrap a trace into a document
///
/// **Public** - used by commands before writing
pub fn to_document(trace: &Trace, source: Option<&str>) -> TraceDocument {
    TraceDocument {
        version: SCHEMA_VERSION.to_string(),
        format_version: RECORD_FORMAT_VERSION,
        source: source.map(str::to_string),
        generated_at: Utc::now().to_rfc3339(),
        stored_calls: trace.stored_calls(),
        ignored_calls: trace.ignored_calls(),
        records: flatten(trace),
    }
}

/// Rebuild the trace held by a document
///
/// # Errors
/// * `OutputError::UnsupportedVersion` - different major schema version
/// * `OutputError::Rebuild` - records do not form a consistent tree
pub fn document_to_trace(document: &TraceDocument) -> Result<Trace, OutputError> {
    if major_version(&document.version) != major_version(SCHEMA_VERSION) {
        return Err(OutputError::UnsupportedVersion(document.version.clone()));
    }
    Ok(rebuild(&document.records)?)
}

/// **Private** - leading component of a dotted version string
fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Write a trace document to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_document(
    document: &TraceDocument,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing trace to: {}", output_path.display());

    validate_path(output_path)?;

    // Create parent directories if needed
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, document).map_err(OutputError::SerializationFailed)?;

    info!(
        "Trace written successfully ({} records, {} bytes)",
        document.records.len(),
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Serialize a document to a compact JSON string
pub fn document_to_string(document: &TraceDocument) -> Result<String, OutputError> {
    serde_json::to_string(document).map_err(OutputError::SerializationFailed)
}

/// Validate that output path is writable
///
/// **Public** - also used by commands for early argument checks
pub fn validate_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    // Check if we're trying to overwrite a directory
    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

/// **Private** - file size in bytes, 0 if unavailable
fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a trace document from a JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_document(input_path: impl AsRef<Path>) -> Result<TraceDocument, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading trace document from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let document: TraceDocument =
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Document loaded: version {}, {} records",
        document.version,
        document.records.len()
    );

    Ok(document)
}
