use jstrace::commands::{execute_reconstruct, validate_args, validate_trace_file, ReconstructArgs};
use jstrace::output::{document_to_trace, read_document};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

const LOG: &str = "DevTools listening on ws://127.0.0.1:9222/devtools\n\
    [7:7:1016/101500.000001:INFO:api_trace.cc(10)] CTRL|0x1|script|3|https://a.example/x.js\n\
    [7:7:1016/101500.000002:INFO:api_trace.cc(10)] CALL|0x1|Function|Canvas|getContext\n\
    [7:7:1016/101500.000003:INFO:api_trace.cc(10)] ARG|0x1|string|2d\n\
    [7:9:1016/101500.000004:INFO:api_trace.cc(10)] CTRL|0x2|script|3\n\
    [7:9:1016/101500.000005:INFO:api_trace.cc(10)] CALL|0x2|Function|Navigator|getBattery\n\
    [7:7:1016/101500.000006:INFO:api_trace.cc(10)] RET|0x1|object|[Context]\n\
    [7:9:1016/101500.000007:INFO:api_trace.cc(10)] RET|0x2|object|[Promise]\n\
    [7:9:1016/101500.000008:INFO:api_trace.cc(10)] RET|0x2|undefined|\n";

fn log_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(LOG.as_bytes()).unwrap();
    file
}

fn args_for(input: &NamedTempFile, output: PathBuf, parallel: bool) -> ReconstructArgs {
    ReconstructArgs {
        input: input.path().to_path_buf(),
        output_json: output,
        print_summary: true,
        parallel,
        ..Default::default()
    }
}

#[test]
fn test_reconstruct_writes_document() {
    let input = log_file();
    let temp_dir = tempfile::tempdir().unwrap();
    let output = temp_dir.path().join("out/trace.json");

    let args = args_for(&input, output.clone(), false);
    validate_args(&args).unwrap();
    let trace = execute_reconstruct(args).unwrap();

    assert_eq!(trace.stored_calls(), 2);
    assert_eq!(trace.ignored_calls(), 1);

    let document = read_document(&output).unwrap();
    assert_eq!(document.stored_calls, 2);
    assert_eq!(document_to_trace(&document).unwrap(), trace);
    assert!(validate_trace_file(&output).is_ok());
}

#[test]
fn test_parallel_reconstruct_counts_match() {
    let input = log_file();
    let temp_dir = tempfile::tempdir().unwrap();

    let sequential =
        execute_reconstruct(args_for(&input, temp_dir.path().join("seq.json"), false)).unwrap();
    let parallel =
        execute_reconstruct(args_for(&input, temp_dir.path().join("par.json"), true)).unwrap();

    assert_eq!(parallel.stored_calls(), sequential.stored_calls());
    assert_eq!(parallel.ignored(), sequential.ignored());
    assert_eq!(parallel.isolate_count(), 2);
    assert_eq!(parallel.script_count(), 2);
}

#[test]
fn test_reconstruct_missing_input_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let args = ReconstructArgs {
        input: temp_dir.path().join("absent.log"),
        output_json: temp_dir.path().join("trace.json"),
        ..Default::default()
    };

    assert!(validate_args(&args).is_err());
    assert!(execute_reconstruct(args).is_err());
}

#[test]
fn test_validate_args_output_is_directory() {
    let input = log_file();
    let temp_dir = tempfile::tempdir().unwrap();
    let args = args_for(&input, temp_dir.path().to_path_buf(), false);

    assert!(validate_args(&args).is_err());
}

#[test]
fn test_validate_rejects_non_trace_json() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(br#"{"version": "1.0.0"}"#).unwrap();

    assert!(validate_trace_file(file.path()).is_err());
}
