//! Trace accumulator: routes classified lines into the trace tree.
//!
//! The accumulator owns the trace being built plus, per isolate, the call
//! stack, the current script and the open execution. Lines must be ingested
//! in the order the engine emitted them for each isolate; lines for
//! different isolates may interleave freely.
//!
//! Bad input never aborts a run. Offending events are dropped and counted
//! in the trace's ignore counters, and the call stack is left as it was.

use super::builder::CallParent;
use super::call_stack::{CallStack, StackViolation};
use super::ids::IdGenerator;
use crate::parser::classifier::LineClassifier;
use crate::parser::line::{
    CallRecord, ControlEvent, ControlRecord, Line, LineKind, RecordKind, ValueRecord,
};
use crate::parser::schema::{EntityId, ExecutionKind, ExecutionState, Trace};
use log::{debug, info, warn};
use std::collections::HashMap;

/// Reconstruction state of one isolate
#[derive(Debug, Clone, Default)]
struct IsolateState {
    stack: CallStack,
    current_script: Option<EntityId>,
    open_execution: Option<EntityId>,
    last_timestamp: Option<String>,
}

/// Incremental builder of a [`Trace`] from classified lines
#[derive(Debug, Clone)]
pub struct TraceAccumulator {
    ids: IdGenerator,
    trace: Trace,
    states: HashMap<String, IsolateState>,
}

impl TraceAccumulator {
    pub fn new() -> Self {
        Self::with_ids(IdGenerator::new())
    }

    /// Accumulator drawing IDs from a shared generator
    pub fn with_ids(ids: IdGenerator) -> Self {
        let trace = Trace::new(&ids);
        Self {
            ids,
            trace,
            states: HashMap::new(),
        }
    }

    /// The trace built so far
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Depth of an isolate's stack of open calls
    pub fn open_depth(&self, isolate: &str) -> usize {
        self.states.get(isolate).map_or(0, |s| s.stack.depth())
    }

    /// Consume one classified line
    pub fn ingest_line(&mut self, line: &Line) {
        match &line.kind {
            LineKind::Call(rec) => self.on_call(line, rec),
            LineKind::Arg(rec) => self.on_arg(line, rec),
            LineKind::Ret(rec) => self.on_ret(line, rec),
            LineKind::Control(rec) => self.on_control(line, rec),
            LineKind::Other => {}
            LineKind::Unknown { detail, .. } => {
                debug!("Line {}: ignoring unknown record: {}", line.line_num, detail);
                self.trace.ignored.unknown += 1;
            }
            LineKind::Error {
                attempted, error, ..
            } => {
                warn!(
                    "Line {}: malformed {:?} record: {}",
                    line.line_num, attempted, error
                );
                if *attempted == RecordKind::Call {
                    self.trace.calls_seen += 1;
                    self.trace.ignored.calls += 1;
                } else {
                    self.trace.ignored.malformed += 1;
                }
            }
        }
    }

    /// Classify and consume one raw record
    pub fn ingest_raw<C: LineClassifier + ?Sized>(
        &mut self,
        classifier: &C,
        raw: &str,
        line_num: usize,
    ) {
        let line = classifier.classify(raw, line_num);
        self.ingest_line(&line);
    }

    /// Close everything still open and return a snapshot of the trace.
    ///
    /// Open calls are closed implicitly (they stay counted as stored) and
    /// open executions are closed with the last timestamp seen for their
    /// isolate. Calling this again without new input returns an identical
    /// trace.
    pub fn finalize(&mut self) -> Trace {
        let mut names: Vec<String> = self.states.keys().cloned().collect();
        names.sort();

        for name in names {
            let Some(state) = self.states.get_mut(&name) else {
                continue;
            };

            let open_calls = state.stack.drain_open();
            if !open_calls.is_empty() {
                debug!(
                    "Isolate {}: closing {} unreturned calls",
                    name,
                    open_calls.len()
                );
            }
            for call in open_calls {
                self.trace.close_call_implicitly(call);
            }

            if let Some(exec) = state.open_execution.take() {
                let ts = state.last_timestamp.clone();
                self.trace
                    .close_execution(exec, ts, ExecutionState::ImplicitlyClosed);
            }
        }

        info!(
            "Reconstructed {} isolates, {} scripts, {} executions ({} stored calls, {} ignored)",
            self.trace.isolate_count(),
            self.trace.script_count(),
            self.trace.execution_count(),
            self.trace.stored_calls(),
            self.trace.ignored_calls()
        );

        self.trace.clone()
    }

    /// Finalize and take ownership of the trace
    pub fn into_trace(mut self) -> Trace {
        self.finalize();
        self.trace
    }

    /// Look up (or create) the state and tree node of an isolate
    ///
    /// **Private** - every well-formed record creates its isolate on first sight
    fn touch_isolate(&mut self, line: &Line, isolate: &str) -> EntityId {
        let id = self.trace.ensure_isolate(&self.ids, isolate);
        let state = self.states.entry(isolate.to_string()).or_default();
        if let Some(ts) = &line.timestamp {
            state.last_timestamp = Some(ts.clone());
        }
        id
    }

    fn on_call(&mut self, line: &Line, rec: &CallRecord) {
        self.trace.calls_seen += 1;
        self.touch_isolate(line, &rec.isolate);

        let Some(state) = self.states.get_mut(&rec.isolate) else {
            return;
        };

        let parent = match state.stack.top() {
            Some(top) => CallParent::Call(top),
            None => {
                let exec = match state.open_execution {
                    Some(exec) => Some(exec),
                    None => state.current_script.and_then(|script| {
                        let kind = match self.trace.script_by_id(script) {
                            Some(s) if s.children.is_empty() => ExecutionKind::Load,
                            _ => ExecutionKind::Continuation,
                        };
                        let ts = line
                            .timestamp
                            .clone()
                            .or_else(|| state.last_timestamp.clone());
                        self.trace.open_execution(&self.ids, script, kind, ts)
                    }),
                };

                let Some(exec) = exec else {
                    warn!(
                        "Line {}: call {}.{} in isolate {} has no script to attach to",
                        line.line_num, rec.class, rec.function, rec.isolate
                    );
                    self.trace.ignored.calls += 1;
                    return;
                };
                state.open_execution = Some(exec);
                CallParent::Execution(exec)
            }
        };

        match self.trace.add_call(&self.ids, parent, rec, line.line_num) {
            Some(id) => {
                state.stack.push(id);
                self.trace.stored_calls += 1;
            }
            None => {
                warn!(
                    "Line {}: could not attach call {}.{} to {:?}",
                    line.line_num, rec.class, rec.function, parent
                );
                self.trace.ignored.calls += 1;
            }
        }
    }

    fn on_arg(&mut self, line: &Line, rec: &ValueRecord) {
        self.touch_isolate(line, &rec.isolate);
        let target = self
            .states
            .get(&rec.isolate)
            .map_or(Err(StackViolation::OrphanArg), |s| s.stack.arg_target());

        match target {
            Ok(call) => {
                if !self.trace.push_arg(call, rec.value.clone()) {
                    warn!("Line {}: call {} was already closed", line.line_num, call);
                }
            }
            Err(violation) => self.record_violation(line, &rec.isolate, violation),
        }
    }

    fn on_ret(&mut self, line: &Line, rec: &ValueRecord) {
        self.touch_isolate(line, &rec.isolate);
        let popped = self
            .states
            .get_mut(&rec.isolate)
            .map_or(Err(StackViolation::OrphanRet), |s| s.stack.pop_for_return());

        match popped {
            Ok(call) => {
                if !self.trace.set_return(call, rec.value.clone()) {
                    warn!("Line {}: call {} was already closed", line.line_num, call);
                }
            }
            Err(violation) => self.record_violation(line, &rec.isolate, violation),
        }
    }

    fn record_violation(&mut self, line: &Line, isolate: &str, violation: StackViolation) {
        warn!(
            "Line {}: {:?} in isolate {} (no open call)",
            line.line_num, violation, isolate
        );
        match violation {
            StackViolation::OrphanArg => self.trace.ignored.orphan_args += 1,
            StackViolation::OrphanRet => self.trace.ignored.orphan_rets += 1,
        }
    }

    fn on_control(&mut self, line: &Line, rec: &ControlRecord) {
        let isolate = self.touch_isolate(line, &rec.isolate);

        let script = match rec.script_id.as_deref() {
            // End markers name a script but never create one
            Some(script_id) if rec.event.is_end() => self
                .trace
                .script(&rec.isolate, script_id)
                .map(|script| script.id),
            Some(script_id) => {
                self.trace
                    .ensure_script(&self.ids, isolate, script_id, rec.base_url.as_deref())
            }
            None if rec.event.requires_script() => {
                warn!(
                    "Line {}: {} event without a script id",
                    line.line_num, rec.event
                );
                self.trace.ignored.malformed += 1;
                return;
            }
            None => None,
        };

        let Some(state) = self.states.get_mut(&rec.isolate) else {
            return;
        };
        let ts = line.timestamp.clone().or_else(|| state.last_timestamp.clone());

        match rec.event {
            ControlEvent::IsolateCreated => {
                debug!("Isolate {} created", rec.isolate);
            }
            ControlEvent::ScriptLoaded => {
                if state.current_script != script {
                    if let Some(exec) = state.open_execution.take() {
                        self.trace.close_execution(exec, ts, ExecutionState::Ended);
                    }
                    state.current_script = script;
                }
            }
            ControlEvent::Begin | ControlEvent::CallbackBegin => {
                if let Some(exec) = state.open_execution.take() {
                    self.trace
                        .close_execution(exec, ts.clone(), ExecutionState::Ended);
                }
                if !state.stack.is_empty() {
                    debug!(
                        "Line {}: {} while {} calls are open in isolate {}",
                        line.line_num,
                        rec.event,
                        state.stack.depth(),
                        rec.isolate
                    );
                }
                state.current_script = script;
                let kind = if rec.event.is_callback() {
                    ExecutionKind::Callback
                } else {
                    ExecutionKind::Load
                };
                state.open_execution =
                    script.and_then(|s| self.trace.open_execution(&self.ids, s, kind, ts));
            }
            ControlEvent::End | ControlEvent::CallbackEnd => {
                let Some(exec) = state.open_execution else {
                    debug!(
                        "Line {}: {} with no open execution in isolate {}",
                        line.line_num, rec.event, rec.isolate
                    );
                    return;
                };

                let matches = self.trace.execution(exec).is_some_and(|open| {
                    let same_script = rec.script_id.is_none() || script == Some(open.parent);
                    let same_kind = match open.kind {
                        ExecutionKind::Load => !rec.event.is_callback(),
                        ExecutionKind::Callback => rec.event.is_callback(),
                        ExecutionKind::Continuation => true,
                    };
                    same_script && same_kind
                });

                if matches {
                    state.open_execution = None;
                    self.trace.close_execution(exec, ts, ExecutionState::Ended);
                } else {
                    debug!(
                        "Line {}: {} does not match open execution {} in isolate {}",
                        line.line_num, rec.event, exec, rec.isolate
                    );
                    self.trace.ignored.malformed += 1;
                }
            }
        }
    }
}

impl Default for TraceAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconstruct a trace from an ordered sequence of classified lines
///
/// **Public** - main entry point for sequential reconstruction
pub fn reconstruct<'a, I>(lines: I) -> Trace
where
    I: IntoIterator<Item = &'a Line>,
{
    let mut acc = TraceAccumulator::new();
    for line in lines {
        acc.ingest_line(line);
    }
    acc.into_trace()
}

/// Classify and reconstruct a whole raw log
///
/// **Public** - convenience wrapper over classifier + accumulator
pub fn reconstruct_str<C: LineClassifier + ?Sized>(classifier: &C, input: &str) -> Trace {
    let mut acc = TraceAccumulator::new();
    for (index, raw) in input.lines().enumerate() {
        acc.ingest_raw(classifier, raw, index + 1);
    }
    acc.into_trace()
}
