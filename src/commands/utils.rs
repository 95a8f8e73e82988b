use crate::aggregator::summarize;
use crate::output::{document_to_trace, read_document};
use crate::utils::config::{RECORD_FORMAT_VERSION, SCHEMA_VERSION};
use anyhow::{Context, Result};
use std::path::Path;

/// Validate a trace JSON file by rebuilding its tree
pub fn validate_trace_file(file_path: &Path) -> Result<()> {
    println!("Validating trace: {}", file_path.display());

    let document = read_document(file_path)
        .with_context(|| format!("Cannot load {}", file_path.display()))?;
    let trace = document_to_trace(&document).context("Trace records are inconsistent")?;
    let summary = summarize(&trace);

    println!("✓ Valid trace JSON");
    println!("  Version: {}", document.version);
    println!("  Record format: v{}", document.format_version);
    if let Some(source) = &document.source {
        println!("  Source: {}", source);
    }
    println!("  Generated: {}", document.generated_at);
    println!("  Records: {}", document.records.len());
    println!("  Isolates: {}", summary.isolates);
    println!("  Scripts: {}", summary.scripts);
    println!("  Executions: {}", summary.executions);
    println!("  Calls: {} stored, {} ignored", trace.stored_calls(), trace.ignored_calls());

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("JS Trace Document Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!("Record Format: v{}", RECORD_FORMAT_VERSION);
    println!();

    if show_details {
        println!("Document Structure:");
        println!("  version: string          - Schema version (e.g., '1.0.0')");
        println!("  format_version: number   - Raw record format the trace came from");
        println!("  source: string?          - Log file the trace was built from");
        println!("  generated_at: string     - ISO 8601 timestamp");
        println!("  stored_calls: number     - Calls kept in the tree");
        println!("  ignored_calls: number    - Events dropped during reconstruction");
        println!("  records: array           - One record per entity");
        println!("    id: number             - Unique entity ID");
        println!("    parent: number?        - Parent entity ID (absent on the root)");
        println!("    children: number[]     - Child entity IDs in order");
        println!("    kind: string           - trace | isolate | script | execution | call");
        println!();
        println!("Kind-specific Fields:");
        println!("  isolate:   name");
        println!("  script:    script_id, base_url?, openwpm_results?");
        println!("  execution: isolate, script_id, timestamp?, closed_at?, execution_kind, state");
        println!("  call:      execution, type, class, func, args[], ret?, state, line_num");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("JS Trace v{}", env!("CARGO_PKG_VERSION"));
    println!("Document Schema: v{}", SCHEMA_VERSION);
    println!("Record Format: v{}", RECORD_FORMAT_VERSION);
    println!();
    println!("Reconstructs JavaScript API call traces from instrumented browser logs.");
}
