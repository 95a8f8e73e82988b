//! Reconstruct command implementation.
//!
//! The reconstruct command:
//! 1. Streams the raw instrumentation log
//! 2. Classifies each record
//! 3. Rebuilds the isolate/script/execution/call tree
//! 4. Calculates summary metrics
//! 5. Writes the JSON trace document

use super::models::ReconstructArgs;
use crate::aggregator::{reconstruct_parallel, summarize, TraceAccumulator};
use crate::output::{to_document, validate_path, write_document};
use crate::parser::classifier::{LineClassifier, PipeClassifier};
use crate::parser::schema::Trace;
use anyhow::{Context, Result};
use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

/// Execute the reconstruct command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Input file cannot be opened or read
/// * Output file cannot be written
///
/// Malformed records never fail the command; they show up in the
/// ignored-call counters of the written document.
pub fn execute_reconstruct(args: ReconstructArgs) -> Result<Trace> {
    let start_time = Instant::now();
    let classifier = PipeClassifier::new();

    info!("Reconstructing trace from: {}", args.input.display());
    debug!("Record format version {}", classifier.format_version());

    // Steps 1-3: read, classify, rebuild
    let trace = if args.parallel {
        info!("Step 1/3: Classifying records...");
        let lines = read_lines(&args.input)
            .context("Failed to read instrumentation log")?
            .iter()
            .enumerate()
            .map(|(index, raw)| classifier.classify(raw, index + 1))
            .collect();

        info!("Step 2/3: Rebuilding isolates in parallel...");
        reconstruct_parallel(lines)
    } else {
        info!("Step 1/3: Streaming records...");
        let mut acc = TraceAccumulator::new();
        stream_lines(&args.input, |raw, line_num| {
            acc.ingest_raw(&classifier, raw, line_num)
        })
        .context("Failed to read instrumentation log")?;

        info!("Step 2/3: Closing open calls and executions...");
        acc.into_trace()
    };

    let summary = summarize(&trace);
    info!("{}", summary.one_line());

    // Step 3: Write output
    info!("Step 3/3: Writing trace document...");
    let source = args.input.to_string_lossy();
    let document = to_document(&trace, Some(&*source));
    write_document(&document, &args.output_json).context("Failed to write trace JSON")?;

    info!("✓ Trace written to: {}", args.output_json.display());

    if args.print_summary {
        println!("\n{}", "=".repeat(80));
        println!("TRACE SUMMARY");
        println!("{}", "=".repeat(80));
        println!("Source: {}", args.input.display());
        println!("{}", summary.render(args.top_apis));
        println!("{}", "=".repeat(80));
    }

    let elapsed = start_time.elapsed();
    info!("Reconstruction completed in {:.2}s", elapsed.as_secs_f64());

    Ok(trace)
}

/// Feed each line of a file to `handle`, numbering lines from 1.
///
/// Invalid UTF-8 is replaced rather than rejected; the classifier decides
/// what the record is worth.
///
/// **Private** - internal helper for execute_reconstruct
fn stream_lines(path: &Path, mut handle: impl FnMut(&str, usize)) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut line_num = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Read error in {} after line {}", path.display(), line_num))?;
        if read == 0 {
            break;
        }
        line_num += 1;
        handle(&String::from_utf8_lossy(&buf), line_num);
    }

    debug!("Read {} lines from {}", line_num, path.display());
    Ok(line_num)
}

/// **Private** - collect every line of a file
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    stream_lines(path, |raw, _| lines.push(raw.to_string()))?;
    Ok(lines)
}

/// Validate reconstruct arguments
///
/// **Public** - can be called before execute_reconstruct for early validation
pub fn validate_args(args: &ReconstructArgs) -> Result<()> {
    if args.input.as_os_str().is_empty() {
        anyhow::bail!("Input path cannot be empty");
    }

    if !args.input.is_file() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    validate_path(&args.output_json).context("Invalid output path")?;

    if args.top_apis == 0 {
        anyhow::bail!("top_apis must be greater than 0");
    }

    if args.top_apis > 1000 {
        anyhow::bail!("top_apis is too large (max 1000)");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn log_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_validate_args_valid() {
        let input = log_file(b"");
        let args = ReconstructArgs {
            input: input.path().to_path_buf(),
            ..Default::default()
        };

        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_validate_args_empty_input() {
        let args = ReconstructArgs::default();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_missing_input() {
        let args = ReconstructArgs {
            input: "/nonexistent/trace.log".into(),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_top_apis_zero() {
        let input = log_file(b"");
        let args = ReconstructArgs {
            input: input.path().to_path_buf(),
            top_apis: 0,
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_top_apis_too_large() {
        let input = log_file(b"");
        let args = ReconstructArgs {
            input: input.path().to_path_buf(),
            top_apis: 2000,
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_stream_lines_tolerates_invalid_utf8() {
        let input = log_file(b"CTRL|I1|script|S1\nARG|I1|string|\xff\xfe\nlast");
        let mut seen = Vec::new();
        let count = stream_lines(input.path(), |raw, n| seen.push((n, raw.to_string()))).unwrap();

        assert_eq!(count, 3);
        assert_eq!(seen[0], (1, "CTRL|I1|script|S1\n".to_string()));
        assert!(seen[1].1.starts_with("ARG|I1|string|"));
        assert_eq!(seen[2], (3, "last".to_string()));
    }
}
