//! Parallel reconstruction, one worker per isolate.
//!
//! Call-stack correctness only needs each isolate's lines in emission order,
//! so the input is partitioned by isolate and every partition is rebuilt on
//! a rayon worker. All workers share one [`IdGenerator`], and the partial
//! traces are merged into a single root at the end.

use super::accumulator::TraceAccumulator;
use super::ids::IdGenerator;
use crate::parser::line::{Line, LineKind};
use crate::parser::schema::Trace;
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Split lines by the isolate they name, preserving per-isolate order.
///
/// Lines naming no isolate (malformed or unknown records) form their own
/// partition under `None` so they are still counted. `Other` lines carry no
/// information and are dropped.
pub fn partition_by_isolate(lines: Vec<Line>) -> Vec<(Option<String>, Vec<Line>)> {
    let mut partitions: BTreeMap<Option<String>, Vec<Line>> = BTreeMap::new();

    for line in lines {
        if line.kind == LineKind::Other {
            continue;
        }
        let key = line.isolate().map(str::to_string);
        partitions.entry(key).or_default().push(line);
    }

    partitions.into_iter().collect()
}

/// Reconstruct a trace with one rayon task per isolate
///
/// **Public** - produces the same tree shape and counters as sequential
/// reconstruction; only the numeric IDs differ
pub fn reconstruct_parallel(lines: Vec<Line>) -> Trace {
    let ids = IdGenerator::new();
    let mut root = Trace::new(&ids);

    let partitions = partition_by_isolate(lines);
    debug!("Reconstructing {} isolate partitions in parallel", partitions.len());

    let partial: Vec<Trace> = partitions
        .into_par_iter()
        .map(|(_, lines)| {
            let mut acc = TraceAccumulator::with_ids(ids.clone());
            for line in &lines {
                acc.ingest_line(line);
            }
            acc.into_trace()
        })
        .collect();

    for trace in partial {
        root.merge(trace);
    }

    root
}
