//! JS Trace
//!
//! Reconstructs hierarchical JavaScript API call traces from the flat,
//! interleaved records an instrumented browser writes to its log.
//!
//! Records are classified into typed lines, routed per isolate, and
//! assembled into a tree of isolates, scripts, executions and calls that
//! can be written as flat `{id, parent, children}` JSON records.
//!
//! ## Getting Started
//!
//! ```bash
//! jstrace reconstruct --input chrome_debug.log --output trace.json --summary
//! ```
//!
//! As a library:
//!
//! ```no_run
//! use jstrace::aggregator::TraceAccumulator;
//! use jstrace::parser::PipeClassifier;
//!
//! let classifier = PipeClassifier::new();
//! let mut acc = TraceAccumulator::new();
//! for (i, raw) in std::io::stdin().lines().map_while(Result::ok).enumerate() {
//!     acc.ingest_raw(&classifier, &raw, i + 1);
//! }
//! let trace = acc.finalize();
//! println!("{} calls stored", trace.stored_calls());
//! ```

pub mod aggregator;
pub mod commands;
pub mod output;
pub mod parser;
pub mod utils;
