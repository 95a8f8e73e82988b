//! Flat `{id, parent, children}` record form of a trace.
//!
//! Storage backends keep one record per entity; the tree is recovered from
//! the ID links alone, without nested containers. [`rebuild`] checks every
//! link in both directions before accepting the records.

use crate::parser::schema::{
    Arg, Call, CallState, EntityId, Execution, ExecutionKind, ExecutionState, IgnoredCounts,
    Isolate, OpenWpmResults, Script, Trace,
};
use crate::utils::error::RebuildError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One entity of a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub id: EntityId,

    /// Absent only for the trace root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityId>,

    #[serde(default)]
    pub children: Vec<EntityId>,

    #[serde(flatten)]
    pub body: RecordBody,
}

/// Entity-specific fields, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    Trace {
        stored_calls: usize,
        calls_seen: usize,
        ignored: IgnoredCounts,
    },
    Isolate {
        name: String,
    },
    Script {
        script_id: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        openwpm_results: Option<OpenWpmResults>,
    },
    Execution {
        isolate: String,
        script_id: String,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        closed_at: Option<String>,
        execution_kind: ExecutionKind,
        state: ExecutionState,
    },
    Call {
        execution: EntityId,
        #[serde(rename = "type")]
        call_type: String,
        class: String,
        #[serde(rename = "func")]
        function: String,
        args: Vec<Arg>,
        ret: Arg,
        state: CallState,
        line_num: usize,
    },
}

impl RecordBody {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Trace { .. } => "trace",
            Self::Isolate { .. } => "isolate",
            Self::Script { .. } => "script",
            Self::Execution { .. } => "execution",
            Self::Call { .. } => "call",
        }
    }

    /// Whether `child` may appear in this record's children
    fn accepts_child(&self, child: &RecordBody) -> bool {
        matches!(
            (self, child),
            (Self::Trace { .. }, Self::Isolate { .. })
                | (Self::Isolate { .. }, Self::Script { .. })
                | (Self::Script { .. }, Self::Execution { .. })
                | (Self::Execution { .. }, Self::Call { .. })
                | (Self::Call { .. }, Self::Call { .. })
        )
    }
}

/// Flatten a trace into one record per entity, ordered by ID
///
/// **Public** - input for the storage layer
pub fn flatten(trace: &Trace) -> Vec<FlatRecord> {
    let mut records = Vec::with_capacity(
        1 + trace.isolate_count() + trace.script_count() + trace.execution_count() + trace.call_count(),
    );

    records.push(FlatRecord {
        id: trace.id(),
        parent: None,
        children: trace.children().to_vec(),
        body: RecordBody::Trace {
            stored_calls: trace.stored_calls(),
            calls_seen: trace.calls_seen(),
            ignored: *trace.ignored(),
        },
    });

    records.extend(trace.isolates.values().map(|iso| FlatRecord {
        id: iso.id,
        parent: Some(iso.parent),
        children: iso.children.clone(),
        body: RecordBody::Isolate {
            name: iso.name.clone(),
        },
    }));

    records.extend(trace.scripts().map(|script| FlatRecord {
        id: script.id,
        parent: Some(script.parent),
        children: script.children.clone(),
        body: RecordBody::Script {
            script_id: script.script_id.clone(),
            base_url: script.base_url.clone(),
            openwpm_results: script.openwpm,
        },
    }));

    records.extend(trace.executions().map(|exec| FlatRecord {
        id: exec.id,
        parent: Some(exec.parent),
        children: exec.children.clone(),
        body: RecordBody::Execution {
            isolate: exec.isolate.clone(),
            script_id: exec.script_id.clone(),
            timestamp: exec.timestamp.clone(),
            closed_at: exec.closed_at.clone(),
            execution_kind: exec.kind,
            state: exec.state,
        },
    }));

    records.extend(trace.calls().map(|call| FlatRecord {
        id: call.id,
        parent: Some(call.parent),
        children: call.children.clone(),
        body: RecordBody::Call {
            execution: call.execution,
            call_type: call.call_type.clone(),
            class: call.class.clone(),
            function: call.function.clone(),
            args: call.args.clone(),
            ret: call.ret.clone(),
            state: call.state,
            line_num: call.line_num,
        },
    }));

    records.sort_by_key(|r| r.id);
    records
}

/// Rebuild a trace from flat records
///
/// **Public** - inverse of [`flatten`]
///
/// # Errors
/// * `RebuildError::DuplicateId` - two records share an ID
/// * `RebuildError::MissingRoot` / `MultipleRoots` - not exactly one trace record
/// * `RebuildError::DanglingChild` / `DanglingParent` - a link names no record
/// * `RebuildError::ParentMismatch` / `NotListed` - the two directions of a link disagree
/// * `RebuildError::KindMismatch` - e.g. a script listed under an execution
/// * `RebuildError::ExecutionMismatch` - a call names an execution it does not descend from
/// * `RebuildError::Unreachable` - a record hangs off a cycle detached from the root
pub fn rebuild(records: &[FlatRecord]) -> Result<Trace, RebuildError> {
    let mut by_id: HashMap<EntityId, &FlatRecord> = HashMap::with_capacity(records.len());
    for record in records {
        if by_id.insert(record.id, record).is_some() {
            return Err(RebuildError::DuplicateId(record.id));
        }
    }

    let root = find_root(records)?;
    check_links(records, &by_id)?;
    check_reachable(records, root, &by_id)?;

    let mut trace = Trace::with_root(root.id);
    trace.children = root.children.clone();
    if let RecordBody::Trace {
        stored_calls,
        calls_seen,
        ignored,
    } = &root.body
    {
        trace.stored_calls = *stored_calls;
        trace.calls_seen = *calls_seen;
        trace.ignored = *ignored;
    }

    for record in records {
        // Non-root parents were checked by check_links
        let Some(parent) = record.parent else {
            continue;
        };
        let id = record.id;
        let children = record.children.clone();

        match &record.body {
            RecordBody::Trace { .. } => {}
            RecordBody::Isolate { name } => {
                trace.isolates.insert(
                    id,
                    Isolate {
                        id,
                        parent,
                        children,
                        name: name.clone(),
                        scripts: HashMap::new(),
                    },
                );
            }
            RecordBody::Script {
                script_id,
                base_url,
                openwpm_results,
            } => {
                trace.scripts.insert(
                    id,
                    Script {
                        id,
                        parent,
                        children,
                        script_id: script_id.clone(),
                        base_url: base_url.clone(),
                        openwpm: *openwpm_results,
                    },
                );
            }
            RecordBody::Execution {
                isolate,
                script_id,
                timestamp,
                closed_at,
                execution_kind,
                state,
            } => {
                trace.executions.insert(
                    id,
                    Execution {
                        id,
                        parent,
                        children,
                        isolate: isolate.clone(),
                        script_id: script_id.clone(),
                        timestamp: timestamp.clone(),
                        closed_at: closed_at.clone(),
                        kind: *execution_kind,
                        state: *state,
                    },
                );
            }
            RecordBody::Call {
                execution,
                call_type,
                class,
                function,
                args,
                ret,
                state,
                line_num,
            } => {
                trace.calls.insert(
                    id,
                    Call {
                        id,
                        parent,
                        execution: *execution,
                        children,
                        call_type: call_type.clone(),
                        class: class.clone(),
                        function: function.clone(),
                        args: args.clone(),
                        ret: ret.clone(),
                        state: *state,
                        line_num: *line_num,
                    },
                );
            }
        }
    }

    for script in trace.scripts.values() {
        if let Some(isolate) = trace.isolates.get_mut(&script.parent) {
            isolate.scripts.insert(script.script_id.clone(), script.id);
        }
    }
    for isolate in trace.isolates.values() {
        trace.isolate_index.insert(isolate.name.clone(), isolate.id);
    }

    Ok(trace)
}

/// **Private** - exactly one trace record must exist
fn find_root(records: &[FlatRecord]) -> Result<&FlatRecord, RebuildError> {
    let mut roots = records
        .iter()
        .filter(|r| matches!(r.body, RecordBody::Trace { .. }));

    let root = roots.next().ok_or(RebuildError::MissingRoot)?;
    if let Some(other) = roots.next() {
        return Err(RebuildError::MultipleRoots(root.id, other.id));
    }
    Ok(root)
}

/// Verify every parent and child link, in both directions
///
/// **Private** - internal validation for rebuild
fn check_links(
    records: &[FlatRecord],
    by_id: &HashMap<EntityId, &FlatRecord>,
) -> Result<(), RebuildError> {
    for record in records {
        for child_id in &record.children {
            let child = by_id.get(child_id).ok_or(RebuildError::DanglingChild {
                parent: record.id,
                child: *child_id,
            })?;
            if !record.body.accepts_child(&child.body) {
                return Err(RebuildError::KindMismatch(record.id));
            }
            match child.parent {
                Some(actual) if actual == record.id => {}
                Some(actual) => {
                    return Err(RebuildError::ParentMismatch {
                        child: *child_id,
                        listed: record.id,
                        actual,
                    })
                }
                None => return Err(RebuildError::MissingParent(*child_id)),
            }
        }

        if matches!(record.body, RecordBody::Trace { .. }) {
            continue;
        }

        let parent_id = record.parent.ok_or(RebuildError::MissingParent(record.id))?;
        let parent = by_id.get(&parent_id).ok_or(RebuildError::DanglingParent {
            child: record.id,
            parent: parent_id,
        })?;
        if !parent.children.contains(&record.id) {
            return Err(RebuildError::NotListed {
                child: record.id,
                parent: parent_id,
            });
        }

        // A call inherits its execution from the execution or call above it
        if let RecordBody::Call { execution, .. } = &record.body {
            let inherited = match &parent.body {
                RecordBody::Execution { .. } => Some(parent_id),
                RecordBody::Call { execution, .. } => Some(*execution),
                _ => None,
            };
            if inherited != Some(*execution) {
                return Err(RebuildError::ExecutionMismatch {
                    call: record.id,
                    execution: *execution,
                });
            }
        }
    }
    Ok(())
}

/// Walk the tree from the root; every record must be visited
///
/// **Private** - rejects detached parent/child cycles
fn check_reachable(
    records: &[FlatRecord],
    root: &FlatRecord,
    by_id: &HashMap<EntityId, &FlatRecord>,
) -> Result<(), RebuildError> {
    let mut visited: HashSet<EntityId> = HashSet::with_capacity(records.len());
    let mut pending = vec![root.id];

    while let Some(id) = pending.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(record) = by_id.get(&id) {
            pending.extend(record.children.iter().copied());
        }
    }

    match records.iter().find(|r| !visited.contains(&r.id)) {
        Some(detached) => Err(RebuildError::Unreachable(detached.id)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::accumulator::reconstruct_str;
    use crate::parser::classifier::PipeClassifier;
    use pretty_assertions::assert_eq;

    fn sample() -> Trace {
        reconstruct_str(
            &PipeClassifier::new(),
            "CTRL|I1|script|S1|https://example.com/a.js\n\
             CALL|I1|Function|Canvas|getContext\n\
             ARG|I1|string|2d\n\
             CALL|I1|Function|CanvasRenderingContext2D|fillText\n\
             RET|I1|undefined|\n\
             RET|I1|object|[Context]\n\
             CTRL|I1|cb_begin|S1\n\
             CALL|I1|Getter|Navigator|userAgent\n",
        )
    }

    #[test]
    fn test_flatten_rebuild_round_trip() {
        let trace = sample();
        let records = flatten(&trace);
        assert_eq!(records.len(), 1 + 1 + 1 + 2 + 3);

        let rebuilt = rebuild(&records).unwrap();
        assert_eq!(rebuilt, trace);
    }

    #[test]
    fn test_records_survive_json() {
        let records = flatten(&sample());
        let json = serde_json::to_string(&records).unwrap();
        let parsed: Vec<FlatRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_call_record_shape() {
        let records = flatten(&sample());
        let call = records
            .iter()
            .find(|r| matches!(&r.body, RecordBody::Call { function, .. } if function == "getContext"))
            .unwrap();
        let json = serde_json::to_value(call).unwrap();

        assert_eq!(json["kind"], "call");
        assert_eq!(json["class"], "Canvas");
        assert_eq!(json["func"], "getContext");
        assert_eq!(json["args"][0]["val"], "2d");
        assert_eq!(json["children"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_rebuild_rejects_duplicate_ids() {
        let mut records = flatten(&sample());
        let copy = records[1].clone();
        records.push(copy);
        assert!(matches!(rebuild(&records), Err(RebuildError::DuplicateId(_))));
    }

    #[test]
    fn test_rebuild_rejects_dangling_child() {
        let mut records = flatten(&sample());
        records[0].children.push(EntityId(999));
        assert_eq!(
            rebuild(&records),
            Err(RebuildError::DanglingChild {
                parent: records[0].id,
                child: EntityId(999)
            })
        );
    }

    #[test]
    fn test_rebuild_rejects_missing_root() {
        let records: Vec<FlatRecord> = flatten(&sample()).into_iter().skip(1).collect();
        assert_eq!(rebuild(&records), Err(RebuildError::MissingRoot));
    }

    #[test]
    fn test_rebuild_rejects_unlisted_child() {
        let mut records = flatten(&sample());
        // Drop the isolate from the root's children but keep its parent link
        records[0].children.clear();
        assert!(matches!(
            rebuild(&records),
            Err(RebuildError::NotListed { .. })
        ));
    }

    fn call_record(records: &[FlatRecord], function_name: &str) -> FlatRecord {
        records
            .iter()
            .find(|r| matches!(&r.body, RecordBody::Call { function, .. } if function == function_name))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_rebuild_rejects_detached_cycle() {
        let mut records = flatten(&sample());
        let template = call_record(&records, "fillText");

        // Two calls naming each other as parent and child, unreachable from the root
        let mut first = template.clone();
        let mut second = template;
        first.id = EntityId(900);
        first.parent = Some(EntityId(901));
        first.children = vec![EntityId(901)];
        second.id = EntityId(901);
        second.parent = Some(EntityId(900));
        second.children = vec![EntityId(900)];
        for record in [&mut first, &mut second] {
            if let RecordBody::Call { execution, .. } = &mut record.body {
                *execution = EntityId(900);
            }
        }
        records.push(first);
        records.push(second);

        assert_eq!(rebuild(&records), Err(RebuildError::Unreachable(EntityId(900))));
    }

    #[test]
    fn test_rebuild_rejects_wrong_execution() {
        let mut records = flatten(&sample());
        let nested = call_record(&records, "fillText").id;
        let root = records[0].id;

        for record in records.iter_mut().filter(|r| r.id == nested) {
            if let RecordBody::Call { execution, .. } = &mut record.body {
                *execution = root;
            }
        }

        assert_eq!(
            rebuild(&records),
            Err(RebuildError::ExecutionMismatch {
                call: nested,
                execution: root
            })
        );
    }
}
