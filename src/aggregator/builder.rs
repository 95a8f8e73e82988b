//! Tree construction: isolates, scripts, executions and calls.
//!
//! Every entity gets a fresh global ID when it is created and is linked in
//! both directions (parent -> children, child -> parent) at the same time.
//! IDs are never reused or reassigned.

use super::ids::IdGenerator;
use crate::parser::line::CallRecord;
use crate::parser::schema::{
    Arg, Call, CallState, EntityId, Execution, ExecutionKind, ExecutionState, Isolate, Script,
    Trace,
};
use log::debug;
use std::collections::HashMap;

/// Where a new call is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallParent {
    /// Top-level call of an execution
    Execution(EntityId),
    /// Nested call made while another call was open
    Call(EntityId),
}

impl Trace {
    /// Create an empty trace whose root takes the next ID
    pub fn new(ids: &IdGenerator) -> Self {
        Self::with_root(ids.next_id())
    }

    /// Look up an isolate by name, creating it on first reference
    pub(crate) fn ensure_isolate(&mut self, ids: &IdGenerator, name: &str) -> EntityId {
        if let Some(id) = self.isolate_index.get(name) {
            return *id;
        }

        let id = ids.next_id();
        debug!("New isolate {} ({})", name, id);
        self.isolates.insert(
            id,
            Isolate {
                id,
                parent: self.id,
                children: Vec::new(),
                name: name.to_string(),
                scripts: HashMap::new(),
            },
        );
        self.isolate_index.insert(name.to_string(), id);
        self.children.push(id);
        id
    }

    /// Look up a script by `(isolate, script id)`, creating it on first reference.
    ///
    /// The base URL is recorded from the first reference that supplies one.
    pub(crate) fn ensure_script(
        &mut self,
        ids: &IdGenerator,
        isolate: EntityId,
        script_id: &str,
        base_url: Option<&str>,
    ) -> Option<EntityId> {
        let owner = self.isolates.get_mut(&isolate)?;

        if let Some(id) = owner.scripts.get(script_id).copied() {
            if let (Some(script), Some(url)) = (self.scripts.get_mut(&id), base_url) {
                if script.base_url.is_none() {
                    script.base_url = Some(url.to_string());
                }
            }
            return Some(id);
        }

        let id = ids.next_id();
        debug!("New script {} in isolate {} ({})", script_id, owner.name, id);
        owner.scripts.insert(script_id.to_string(), id);
        owner.children.push(id);
        self.scripts.insert(
            id,
            Script {
                id,
                parent: isolate,
                children: Vec::new(),
                script_id: script_id.to_string(),
                base_url: base_url.map(str::to_string),
                openwpm: None,
            },
        );
        Some(id)
    }

    /// Open a new execution under a script
    pub(crate) fn open_execution(
        &mut self,
        ids: &IdGenerator,
        script: EntityId,
        kind: ExecutionKind,
        timestamp: Option<String>,
    ) -> Option<EntityId> {
        let owner = self.scripts.get_mut(&script)?;
        let isolate = self.isolates.get(&owner.parent)?.name.clone();

        let id = ids.next_id();
        debug!(
            "Opening {:?} execution {} for script {} in isolate {}",
            kind, id, owner.script_id, isolate
        );
        owner.children.push(id);
        self.executions.insert(
            id,
            Execution {
                id,
                parent: script,
                children: Vec::new(),
                isolate,
                script_id: owner.script_id.clone(),
                timestamp,
                closed_at: None,
                kind,
                state: ExecutionState::Open,
            },
        );
        Some(id)
    }

    /// Close an open execution. Already-closed executions are left alone.
    pub(crate) fn close_execution(
        &mut self,
        execution: EntityId,
        timestamp: Option<String>,
        state: ExecutionState,
    ) {
        if let Some(exec) = self.executions.get_mut(&execution) {
            if exec.state == ExecutionState::Open {
                exec.state = state;
                exec.closed_at = timestamp;
            }
        }
    }

    /// Create a call and link it under its parent.
    ///
    /// Returns `None` when the parent does not exist or is a call that is no
    /// longer open.
    pub(crate) fn add_call(
        &mut self,
        ids: &IdGenerator,
        parent: CallParent,
        record: &CallRecord,
        line_num: usize,
    ) -> Option<EntityId> {
        let (parent_id, execution) = match parent {
            CallParent::Execution(exec) => (exec, self.executions.get(&exec)?.id),
            CallParent::Call(call) => {
                let enclosing = self.calls.get(&call)?;
                if enclosing.state != CallState::Open {
                    return None;
                }
                (call, enclosing.execution)
            }
        };

        let id = ids.next_id();
        match parent {
            CallParent::Execution(exec) => self.executions.get_mut(&exec)?.children.push(id),
            CallParent::Call(call) => self.calls.get_mut(&call)?.children.push(id),
        }

        self.calls.insert(
            id,
            Call {
                id,
                parent: parent_id,
                execution,
                children: Vec::new(),
                call_type: record.call_type.clone(),
                class: record.class.clone(),
                function: record.function.clone(),
                args: Vec::new(),
                ret: Arg::default(),
                state: CallState::Open,
                line_num,
            },
        );
        Some(id)
    }

    pub(crate) fn push_arg(&mut self, call: EntityId, arg: Arg) -> bool {
        match self.calls.get_mut(&call) {
            Some(c) if c.state == CallState::Open => {
                c.args.push(arg);
                true
            }
            _ => false,
        }
    }

    /// Record a call's return value, closing it
    pub(crate) fn set_return(&mut self, call: EntityId, ret: Arg) -> bool {
        match self.calls.get_mut(&call) {
            Some(c) if c.state == CallState::Open => {
                c.ret = ret;
                c.state = CallState::Returned;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn close_call_implicitly(&mut self, call: EntityId) {
        if let Some(c) = self.calls.get_mut(&call) {
            if c.state == CallState::Open {
                c.state = CallState::ImplicitlyClosed;
            }
        }
    }

    /// Fold another trace into this one.
    ///
    /// Both traces must have drawn their IDs from the same [`IdGenerator`].
    /// The other trace's root is discarded. Isolates with the same name are
    /// unified, and so are scripts with the same ID inside them; their
    /// executions are appended in order.
    pub fn merge(&mut self, other: Trace) {
        let Trace {
            children: other_children,
            mut isolates,
            mut scripts,
            executions,
            calls,
            stored_calls,
            calls_seen,
            ignored,
            ..
        } = other;

        self.stored_calls += stored_calls;
        self.calls_seen += calls_seen;
        self.ignored.absorb(&ignored);
        self.executions.extend(executions);
        self.calls.extend(calls);

        for isolate_id in other_children {
            let Some(mut isolate) = isolates.remove(&isolate_id) else {
                continue;
            };

            let Some(target_id) = self.isolate_index.get(&isolate.name).copied() else {
                isolate.parent = self.id;
                for script_id in &isolate.children {
                    if let Some(script) = scripts.remove(script_id) {
                        self.scripts.insert(script.id, script);
                    }
                }
                self.isolate_index.insert(isolate.name.clone(), isolate.id);
                self.children.push(isolate.id);
                self.isolates.insert(isolate.id, isolate);
                continue;
            };

            debug!("Merging isolate {} into {}", isolate.name, target_id);
            for script_id in isolate.children {
                let Some(script) = scripts.remove(&script_id) else {
                    continue;
                };
                self.merge_script(target_id, script);
            }
        }
    }

    /// Attach a script from another trace to one of this trace's isolates
    ///
    /// **Private** - internal helper for merge
    fn merge_script(&mut self, isolate: EntityId, mut script: Script) {
        let Some(target) = self.isolates.get_mut(&isolate) else {
            return;
        };

        match target.scripts.get(&script.script_id).copied() {
            Some(existing) => {
                for exec in &script.children {
                    if let Some(e) = self.executions.get_mut(exec) {
                        e.parent = existing;
                    }
                }
                if let Some(existing) = self.scripts.get_mut(&existing) {
                    existing.children.extend(script.children);
                    if existing.base_url.is_none() {
                        existing.base_url = script.base_url;
                    }
                    if existing.openwpm.is_none() {
                        existing.openwpm = script.openwpm;
                    }
                }
            }
            None => {
                script.parent = isolate;
                target.scripts.insert(script.script_id.clone(), script.id);
                target.children.push(script.id);
                self.scripts.insert(script.id, script);
            }
        }
    }
}
