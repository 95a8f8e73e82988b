use jstrace::aggregator::{
    reconstruct, reconstruct_parallel, reconstruct_str, summarize, TraceAccumulator,
};
use jstrace::parser::{
    classify_lines, Arg, Call, CallRecord, CallState, ControlEvent, ControlRecord, ExecutionKind,
    ExecutionState, Line, LineKind, PipeClassifier, Trace,
};
use pretty_assertions::assert_eq;

fn run(input: &str) -> Trace {
    reconstruct_str(&PipeClassifier::new(), input)
}

/// ID-free rendering of the tree, one line per entity
fn shape(trace: &Trace) -> Vec<String> {
    fn call_lines(trace: &Trace, call: &Call, depth: usize, out: &mut Vec<String>) {
        out.push(format!(
            "{}{} args={:?} ret={}:{} {:?}",
            "  ".repeat(depth),
            call.api_name(),
            call.args,
            call.ret.arg_type,
            call.ret.value,
            call.state
        ));
        for child in trace.children_of(call) {
            call_lines(trace, child, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    let mut isolates: Vec<_> = trace.isolates().collect();
    isolates.sort_by(|a, b| a.name.cmp(&b.name));
    for isolate in isolates {
        out.push(format!("isolate {}", isolate.name));
        for script in trace.scripts_of(isolate) {
            out.push(format!(" script {} {:?}", script.script_id, script.base_url));
            for exec in trace.executions_of(script) {
                out.push(format!(
                    "  execution {:?} {:?} {:?}..{:?}",
                    exec.kind, exec.state, exec.timestamp, exec.closed_at
                ));
                for call in trace.top_level_calls(exec) {
                    call_lines(trace, call, 3, &mut out);
                }
            }
        }
    }
    out
}

#[test]
fn test_nested_canvas_calls() {
    let trace = run("CTRL|I1|script|S1\n\
         CALL|I1|Function|Canvas|getContext\n\
         ARG|I1|string|2d\n\
         CALL|I1|Function|CanvasRenderingContext2D|fillText\n\
         ARG|I1|string|hi\n\
         RET|I1|undefined|\n\
         RET|I1|object|[Context]\n");

    assert_eq!(trace.stored_calls(), 2);
    assert_eq!(trace.ignored_calls(), 0);

    let exec = trace.executions().next().unwrap();
    let top: Vec<_> = trace.top_level_calls(exec).collect();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].function, "getContext");
    assert_eq!(top[0].args, vec![Arg::new("string", "2d")]);
    assert_eq!(top[0].ret, Arg::new("object", "[Context]"));
    assert!(top[0].is_top_level());

    let nested: Vec<_> = trace.children_of(top[0]).collect();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].class, "CanvasRenderingContext2D");
    assert_eq!(nested[0].args, vec![Arg::new("string", "hi")]);
    assert_eq!(nested[0].ret.arg_type, "undefined");
    assert_eq!(nested[0].parent, top[0].id);
    assert_eq!(nested[0].execution, exec.id);
    assert!(!nested[0].is_top_level());
}

#[test]
fn test_ret_on_empty_stack() {
    let trace = run("RET|I2|undefined|\n");

    assert_eq!(trace.ignored_calls(), 1);
    assert_eq!(trace.call_count(), 0);
    assert!(trace.isolate("I2").is_some());
}

#[test]
fn test_callback_opens_second_execution() {
    let trace = run("CTRL|I1|begin|S7|https://example.com/s7.js\n\
         CALL|I1|Function|Navigator|userAgent\n\
         RET|I1|string|Mozilla\n\
         CTRL|I1|end|S7\n\
         CTRL|I1|cb_begin|S7\n\
         CALL|I1|Function|Screen|width\n\
         RET|I1|number|1920\n\
         CTRL|I1|cb_end|S7\n");

    let script = trace.script("I1", "S7").unwrap();
    let executions: Vec<_> = trace.executions_of(script).collect();
    assert_eq!(executions.len(), 2);

    assert_eq!(executions[0].kind, ExecutionKind::Load);
    assert_eq!(executions[1].kind, ExecutionKind::Callback);
    assert!(executions
        .iter()
        .all(|exec| exec.state == ExecutionState::Ended));

    let first: Vec<_> = trace.top_level_calls(executions[0]).collect();
    let second: Vec<_> = trace.top_level_calls(executions[1]).collect();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].function, "userAgent");
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].function, "width");
}

#[test]
fn test_call_after_end_opens_continuation() {
    let trace = run("CTRL|I1|begin|S1\n\
         CALL|I1|Function|A|a\n\
         RET|I1|undefined|\n\
         CTRL|I1|end|S1\n\
         CALL|I1|Function|B|b\n\
         RET|I1|undefined|\n");

    let script = trace.script("I1", "S1").unwrap();
    let kinds: Vec<_> = trace.executions_of(script).map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ExecutionKind::Load, ExecutionKind::Continuation]);
}

#[test]
fn test_orphan_arg_does_not_corrupt_isolate() {
    let trace = run("CTRL|I1|script|S1\n\
         ARG|I1|string|lost\n\
         CALL|I1|Function|Canvas|toDataURL\n\
         ARG|I1|string|image/png\n\
         RET|I1|string|data:\n");

    assert_eq!(trace.ignored().orphan_args, 1);
    assert_eq!(trace.stored_calls(), 1);

    let call = trace.calls().next().unwrap();
    assert_eq!(call.args, vec![Arg::new("string", "image/png")]);
    assert_eq!(call.state, CallState::Returned);
}

#[test]
fn test_counter_invariant_holds_on_noisy_input() {
    let input = "banner\n\
         CALL|I9|Function|X|noScript\n\
         CTRL|I1|script|S1\n\
         CALL|I1|Function|Canvas\n\
         CALL|I1|Function|Canvas|getContext\n\
         RET|I1|object|\n\
         RET|I1|object|\n\
         ARG|I3|string|x\n\
         CTRL|I1|teleport|S1\n\
         CALL||Function|X|y\n\
         CALL|I1|Function|Canvas|toBlob\n";
    let trace = run(input);

    assert_eq!(trace.calls_seen(), 5);
    assert_eq!(trace.stored_calls(), 2);
    assert_eq!(trace.ignored().calls, 3);
    assert_eq!(trace.stored_calls() + trace.ignored().calls, trace.calls_seen());
    assert_eq!(trace.ignored().orphan_rets, 1);
    assert_eq!(trace.ignored().orphan_args, 1);
    assert_eq!(trace.ignored().unknown, 1);
    assert_eq!(trace.ignored_calls(), trace.ignored().total());
}

#[test]
fn test_arguments_kept_in_order_at_every_depth() {
    let mut input = String::from("CTRL|I1|script|S1\n");
    for depth in 0..6 {
        input.push_str(&format!("CALL|I1|Function|C{depth}|f\n"));
        for arg in 0..depth {
            input.push_str(&format!("ARG|I1|number|{depth}.{arg}\n"));
        }
    }
    for depth in (0..6).rev() {
        input.push_str(&format!("RET|I1|number|{depth}\n"));
    }

    let trace = run(&input);
    assert_eq!(trace.stored_calls(), 6);

    for call in trace.calls() {
        let depth: usize = call.class[1..].parse().unwrap();
        let expected: Vec<_> = (0..depth)
            .map(|arg| Arg::new("number", format!("{depth}.{arg}")))
            .collect();
        assert_eq!(call.args, expected);
        assert_eq!(call.ret, Arg::new("number", depth.to_string()));
    }
    assert_eq!(summarize(&trace).max_depth, 6);
}

#[test]
fn test_finalize_twice_is_identical() {
    let classifier = PipeClassifier::new();
    let mut acc = TraceAccumulator::new();
    for (i, raw) in [
        "CTRL|I1|begin|S1",
        "CALL|I1|Function|OfflineAudioContext|startRendering",
        "CALL|I1|Function|AudioBuffer|getChannelData",
    ]
    .iter()
    .enumerate()
    {
        acc.ingest_raw(&classifier, raw, i + 1);
    }

    let first = acc.finalize();
    let second = acc.finalize();
    assert_eq!(first, second);
    assert!(first
        .calls()
        .all(|call| call.state == CallState::ImplicitlyClosed));
}

#[test]
fn test_timestamps_from_log_prefix() {
    let trace = run("[1:1:0101/120000.000001:INFO:v8.cc(1)] CTRL|I1|begin|S1\n\
         [1:1:0101/120000.000002:INFO:v8.cc(1)] CALL|I1|Function|A|a\n\
         [1:1:0101/120000.000003:INFO:v8.cc(1)] RET|I1|undefined|\n");

    let exec = trace.executions().next().unwrap();
    assert_eq!(exec.timestamp.as_deref(), Some("0101/120000.000001"));
    assert_eq!(exec.closed_at.as_deref(), Some("0101/120000.000003"));
    assert_eq!(exec.state, ExecutionState::ImplicitlyClosed);
}

#[test]
fn test_interleaved_isolates_are_independent() {
    let trace = run("CTRL|A|script|1\n\
         CTRL|B|script|1\n\
         CALL|A|Function|Canvas|getContext\n\
         CALL|B|Function|Navigator|getBattery\n\
         ARG|A|string|2d\n\
         RET|B|object|[Promise]\n\
         RET|A|object|[Context]\n");

    assert_eq!(trace.isolate_count(), 2);
    assert_eq!(trace.script_count(), 2);
    assert_eq!(trace.stored_calls(), 2);
    assert!(trace.calls().all(|call| call.is_top_level()));

    let battery = trace
        .calls()
        .find(|call| call.function == "getBattery")
        .unwrap();
    assert!(battery.args.is_empty());
    assert_eq!(battery.ret.value, "[Promise]");
}

#[test]
fn test_parallel_matches_sequential_shape() {
    let input = "CTRL|A|begin|1|https://a.example/x.js\n\
         CTRL|B|script|4\n\
         CALL|A|Function|Canvas|getContext\n\
         CALL|B|Function|Navigator|getBattery\n\
         ARG|A|string|2d\n\
         CALL|A|Function|CanvasRenderingContext2D|fillText\n\
         RET|B|object|[Promise]\n\
         RET|A|undefined|\n\
         RET|A|object|[Context]\n\
         CTRL|A|end|1\n\
         CTRL|A|cb_begin|1\n\
         CALL|A|Function|Screen|width\n\
         RET|C|undefined|\n\
         [1:1:0101/120000.000009:INFO:x.cc(1)] noise\n";
    let lines = classify_lines(&PipeClassifier::new(), input);

    let sequential = reconstruct(&lines);
    let parallel = reconstruct_parallel(lines);

    assert_eq!(shape(&parallel), shape(&sequential));
    assert_eq!(parallel.stored_calls(), sequential.stored_calls());
    assert_eq!(parallel.ignored(), sequential.ignored());
    assert_eq!(parallel.calls_seen(), sequential.calls_seen());
}

#[test]
fn test_end_marker_for_other_script_is_ignored() {
    let trace = run("CTRL|I1|begin|S1\n\
         CALL|I1|Function|A|a\n\
         RET|I1|undefined|\n\
         CTRL|I1|cb_end|S2\n\
         CALL|I1|Function|B|b\n\
         RET|I1|undefined|\n");

    assert_eq!(trace.script_count(), 1);
    assert!(trace.script("I1", "S2").is_none());
    assert_eq!(trace.ignored().malformed, 1);

    let script = trace.script("I1", "S1").unwrap();
    let executions: Vec<_> = trace.executions_of(script).collect();
    assert_eq!(executions.len(), 1);
    let names: Vec<_> = trace
        .top_level_calls(executions[0])
        .map(|call| call.function.as_str())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_end_marker_of_wrong_kind_is_ignored() {
    let trace = run("CTRL|I1|cb_begin|S1\n\
         CALL|I1|Function|A|a\n\
         RET|I1|undefined|\n\
         CTRL|I1|end|S1\n\
         CTRL|I1|cb_end|S1\n");

    let exec = trace.executions().next().unwrap();
    assert_eq!(trace.execution_count(), 1);
    assert_eq!(exec.kind, ExecutionKind::Callback);
    assert_eq!(exec.state, ExecutionState::Ended);
    assert_eq!(trace.ignored().malformed, 1);
}

#[test]
fn test_implicit_close_ignores_other_isolates_timestamps() {
    let lines = vec![
        Line::new(1, LineKind::Other).with_timestamp("T9"),
        Line::new(
            2,
            LineKind::Control(ControlRecord {
                isolate: "A".to_string(),
                event: ControlEvent::Begin,
                script_id: Some("1".to_string()),
                base_url: None,
            }),
        ),
        Line::new(
            3,
            LineKind::Call(CallRecord {
                isolate: "B".to_string(),
                call_type: "Function".to_string(),
                class: "X".to_string(),
                function: "x".to_string(),
            }),
        )
        .with_timestamp("T10"),
        Line::new(
            4,
            LineKind::Call(CallRecord {
                isolate: "A".to_string(),
                call_type: "Function".to_string(),
                class: "X".to_string(),
                function: "x".to_string(),
            }),
        ),
    ];

    let sequential = reconstruct(&lines);
    let parallel = reconstruct_parallel(lines);

    let exec = sequential.executions().next().unwrap();
    assert_eq!(exec.state, ExecutionState::ImplicitlyClosed);
    assert_eq!(exec.timestamp, None);
    assert_eq!(exec.closed_at, None);
    assert_eq!(shape(&parallel), shape(&sequential));
}
