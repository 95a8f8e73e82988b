//! Reconstructed trace data model.
//!
//! Every entity (trace root, isolate, script, execution, call) carries a
//! globally unique [`EntityId`]. Parent/child relationships are stored as IDs
//! into flat, ID-indexed containers owned by the [`Trace`], so the tree can be
//! serialized as a flat collection of `{id, parent, children}` records and
//! rebuilt without walking nested containers.

use crate::utils::error::AnnotateError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Globally unique identifier assigned to every entity of a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single argument or return value, flattened to its engine type tag
/// and a string rendering of the value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arg {
    #[serde(rename = "type")]
    pub arg_type: String,

    #[serde(rename = "val")]
    pub value: String,
}

impl Arg {
    pub fn new(arg_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            arg_type: arg_type.into(),
            value: value.into(),
        }
    }
}

/// Lifecycle of an intercepted call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// On its isolate's stack, still accepting arguments and children
    Open,
    /// A return record was seen
    Returned,
    /// Still open when the input ended
    ImplicitlyClosed,
}

/// A single intercepted API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub id: EntityId,

    /// Enclosing call, or the owning execution for top-level calls
    pub parent: EntityId,

    /// Execution this call (or its top-level ancestor) belongs to
    pub execution: EntityId,

    /// Nested calls made while this call was executing, in call order
    pub children: Vec<EntityId>,

    pub call_type: String,
    pub class: String,
    pub function: String,
    pub args: Vec<Arg>,
    pub ret: Arg,
    pub state: CallState,

    /// Line number of the record that opened this call
    pub line_num: usize,
}

impl Call {
    /// True when the call has no enclosing call within its execution
    pub fn is_top_level(&self) -> bool {
        self.parent == self.execution
    }

    /// `Class.function` label used in summaries
    pub fn api_name(&self) -> String {
        format!("{}.{}", self.class, self.function)
    }
}

/// How an execution was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    /// Initial run of the script
    Load,
    /// Re-entry through a callback
    Callback,
    /// Opened implicitly by a call after an earlier execution of the same script closed
    Continuation,
}

/// Lifecycle of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Open,
    /// Closed by an end marker or a switch to another script
    Ended,
    /// Still open when the input ended
    ImplicitlyClosed,
}

/// One run of a script: its initial load or one callback re-entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub id: EntityId,

    /// Owning script entity
    pub parent: EntityId,

    /// Top-level calls, in call order
    pub children: Vec<EntityId>,

    pub isolate: String,
    pub script_id: String,
    pub timestamp: Option<String>,
    pub closed_at: Option<String>,
    pub kind: ExecutionKind,
    pub state: ExecutionState,
}

/// Fingerprinting capability flags attached by a post-processing step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenWpmResults {
    #[serde(default, skip_serializing_if = "is_false")]
    pub canvas: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub canvas_font: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub web_rtc: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub audio: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub battery: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl OpenWpmResults {
    /// Whether any capability flag is set
    pub fn any(&self) -> bool {
        self.canvas || self.canvas_font || self.web_rtc || self.audio || self.battery
    }
}

/// One loaded script, identified by an engine ID unique only within its isolate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub id: EntityId,

    /// Owning isolate entity
    pub parent: EntityId,

    /// Executions, in the order they were opened
    pub children: Vec<EntityId>,

    pub script_id: String,
    pub base_url: Option<String>,
    pub openwpm: Option<OpenWpmResults>,
}

/// One JavaScript execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isolate {
    pub id: EntityId,

    /// Trace root
    pub parent: EntityId,

    /// Scripts, in the order they were first referenced
    pub children: Vec<EntityId>,

    pub name: String,

    /// Engine script ID -> script entity
    pub scripts: HashMap<String, EntityId>,
}

/// Events discarded during reconstruction, by cause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredCounts {
    /// Call records that were malformed or had no script to attach to
    pub calls: usize,

    /// Argument records with no open call on their isolate's stack
    pub orphan_args: usize,

    /// Return records with no open call on their isolate's stack
    pub orphan_rets: usize,

    /// Malformed argument, return and control records
    pub malformed: usize,

    /// Records matching a tag but not a known schema
    pub unknown: usize,
}

impl IgnoredCounts {
    pub fn total(&self) -> usize {
        self.calls + self.orphan_args + self.orphan_rets + self.malformed + self.unknown
    }

    pub(crate) fn absorb(&mut self, other: &IgnoredCounts) {
        self.calls += other.calls;
        self.orphan_args += other.orphan_args;
        self.orphan_rets += other.orphan_rets;
        self.malformed += other.malformed;
        self.unknown += other.unknown;
    }
}

/// A full reconstructed trace: the root of all isolates, scripts,
/// executions and calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub(crate) id: EntityId,

    /// Isolates in the order they were first referenced
    pub(crate) children: Vec<EntityId>,

    /// Isolate name -> isolate entity
    pub(crate) isolate_index: HashMap<String, EntityId>,

    pub(crate) isolates: BTreeMap<EntityId, Isolate>,
    pub(crate) scripts: BTreeMap<EntityId, Script>,
    pub(crate) executions: BTreeMap<EntityId, Execution>,
    pub(crate) calls: BTreeMap<EntityId, Call>,

    pub(crate) stored_calls: usize,
    pub(crate) calls_seen: usize,
    pub(crate) ignored: IgnoredCounts,
}

impl Trace {
    pub(crate) fn with_root(id: EntityId) -> Self {
        Self {
            id,
            children: Vec::new(),
            isolate_index: HashMap::new(),
            isolates: BTreeMap::new(),
            scripts: BTreeMap::new(),
            executions: BTreeMap::new(),
            calls: BTreeMap::new(),
            stored_calls: 0,
            calls_seen: 0,
            ignored: IgnoredCounts::default(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Isolate entity IDs, in first-reference order
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Calls successfully folded into the tree
    pub fn stored_calls(&self) -> usize {
        self.stored_calls
    }

    /// All discarded events, across every cause
    pub fn ignored_calls(&self) -> usize {
        self.ignored.total()
    }

    pub fn ignored(&self) -> &IgnoredCounts {
        &self.ignored
    }

    /// Call events seen, well-formed or not
    pub fn calls_seen(&self) -> usize {
        self.calls_seen
    }

    pub fn isolate(&self, name: &str) -> Option<&Isolate> {
        self.isolate_index
            .get(name)
            .and_then(|id| self.isolates.get(id))
    }

    pub fn isolate_by_id(&self, id: EntityId) -> Option<&Isolate> {
        self.isolates.get(&id)
    }

    /// Isolates in first-reference order
    pub fn isolates(&self) -> impl Iterator<Item = &Isolate> + '_ {
        self.children.iter().filter_map(|id| self.isolates.get(id))
    }

    /// Look up a script by isolate name and engine script ID
    pub fn script(&self, isolate: &str, script_id: &str) -> Option<&Script> {
        self.isolate(isolate)
            .and_then(|iso| iso.scripts.get(script_id))
            .and_then(|id| self.scripts.get(id))
    }

    pub fn script_by_id(&self, id: EntityId) -> Option<&Script> {
        self.scripts.get(&id)
    }

    pub fn scripts_of<'a>(&'a self, isolate: &'a Isolate) -> impl Iterator<Item = &'a Script> + 'a {
        isolate.children.iter().filter_map(|id| self.scripts.get(id))
    }

    pub fn execution(&self, id: EntityId) -> Option<&Execution> {
        self.executions.get(&id)
    }

    pub fn executions_of<'a>(&'a self, script: &'a Script) -> impl Iterator<Item = &'a Execution> + 'a {
        script.children.iter().filter_map(|id| self.executions.get(id))
    }

    pub fn call(&self, id: EntityId) -> Option<&Call> {
        self.calls.get(&id)
    }

    /// Top-level calls of an execution, in call order
    pub fn top_level_calls<'a>(&'a self, execution: &'a Execution) -> impl Iterator<Item = &'a Call> + 'a {
        execution.children.iter().filter_map(|id| self.calls.get(id))
    }

    /// Nested calls of a call, in call order
    pub fn children_of<'a>(&'a self, call: &'a Call) -> impl Iterator<Item = &'a Call> + 'a {
        call.children.iter().filter_map(|id| self.calls.get(id))
    }

    /// All calls, ordered by ID
    pub fn calls(&self) -> impl Iterator<Item = &Call> + '_ {
        self.calls.values()
    }

    /// All executions, ordered by ID
    pub fn executions(&self) -> impl Iterator<Item = &Execution> + '_ {
        self.executions.values()
    }

    /// All scripts, ordered by ID
    pub fn scripts(&self) -> impl Iterator<Item = &Script> + '_ {
        self.scripts.values()
    }

    pub fn isolate_count(&self) -> usize {
        self.isolates.len()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Attach fingerprinting results to a completed script.
    ///
    /// Only the annotation is replaced; the script's executions are untouched.
    pub fn annotate_script(
        &mut self,
        script: EntityId,
        results: OpenWpmResults,
    ) -> Result<(), AnnotateError> {
        let entry = self
            .scripts
            .get_mut(&script)
            .ok_or(AnnotateError::UnknownScript(script))?;
        entry.openwpm = Some(results);
        Ok(())
    }
}
