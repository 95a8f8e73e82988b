//! Summary metrics over a reconstructed trace.
//!
//! Gives a quick view of what a page did: how many isolates, scripts and
//! executions were seen, how deep calls nested, and which APIs were hit most.

use crate::parser::schema::{EntityId, Trace};
use log::debug;
use std::collections::HashMap;

/// Number of calls made to one `Class.function`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUsage {
    pub api: String,
    pub count: usize,
}

/// Aggregate statistics of a trace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub isolates: usize,
    pub scripts: usize,
    pub executions: usize,
    pub calls: usize,
    pub top_level_calls: usize,
    pub stored_calls: usize,
    pub ignored_calls: usize,

    /// Deepest nesting level (top-level calls are depth 1)
    pub max_depth: usize,

    /// APIs sorted by call count (descending), ties broken by name
    pub api_usage: Vec<ApiUsage>,
}

/// Calculate summary statistics for a trace
///
/// **Public** - main entry point for metrics calculation
pub fn summarize(trace: &Trace) -> TraceSummary {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for call in trace.calls() {
        *counts.entry(call.api_name()).or_insert(0) += 1;
    }

    let mut api_usage: Vec<ApiUsage> = counts
        .into_iter()
        .map(|(api, count)| ApiUsage { api, count })
        .collect();
    api_usage.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.api.cmp(&b.api)));

    let top_level: Vec<EntityId> = trace
        .executions()
        .flat_map(|exec| exec.children.iter().copied())
        .collect();

    let summary = TraceSummary {
        isolates: trace.isolate_count(),
        scripts: trace.script_count(),
        executions: trace.execution_count(),
        calls: trace.call_count(),
        top_level_calls: top_level.len(),
        stored_calls: trace.stored_calls(),
        ignored_calls: trace.ignored_calls(),
        max_depth: max_depth(trace, &top_level),
        api_usage,
    };

    debug!("Trace summary: {}", summary.one_line());
    summary
}

/// Deepest call nesting (iterative; traced pages can nest arbitrarily deep)
///
/// **Private** - internal helper for summarize
fn max_depth(trace: &Trace, top_level: &[EntityId]) -> usize {
    let mut deepest = 0;
    let mut pending: Vec<(EntityId, usize)> = top_level.iter().map(|id| (*id, 1)).collect();

    while let Some((id, depth)) = pending.pop() {
        deepest = deepest.max(depth);
        if let Some(call) = trace.call(id) {
            pending.extend(call.children.iter().map(|child| (*child, depth + 1)));
        }
    }

    deepest
}

impl TraceSummary {
    /// Human-readable one-line summary
    ///
    /// **Public** - for logging and debugging
    pub fn one_line(&self) -> String {
        format!(
            "Isolates: {} | Scripts: {} | Executions: {} | Calls: {} stored, {} ignored | Max depth: {}",
            self.isolates,
            self.scripts,
            self.executions,
            self.stored_calls,
            self.ignored_calls,
            self.max_depth
        )
    }

    /// Multi-line text report listing the `top_n` most used APIs
    pub fn render(&self, top_n: usize) -> String {
        let mut out = String::new();
        out.push_str(&format!("Isolates:        {}\n", self.isolates));
        out.push_str(&format!("Scripts:         {}\n", self.scripts));
        out.push_str(&format!("Executions:      {}\n", self.executions));
        out.push_str(&format!(
            "Calls:           {} ({} top-level)\n",
            self.calls, self.top_level_calls
        ));
        out.push_str(&format!("Stored calls:    {}\n", self.stored_calls));
        out.push_str(&format!("Ignored events:  {}\n", self.ignored_calls));
        out.push_str(&format!("Max call depth:  {}\n", self.max_depth));

        if self.api_usage.is_empty() {
            return out;
        }

        out.push_str(&format!("\nTop {} APIs:\n", top_n.min(self.api_usage.len())));
        for (i, usage) in self.api_usage.iter().take(top_n).enumerate() {
            out.push_str(&format!("{:>3}. {:>6}  {}\n", i + 1, usage.count, usage.api));
        }
        out
    }
}
