//! Line classifier for raw instrumentation records.
//!
//! Converts one raw log record into a typed [`Line`]. The record schema is
//! owned by a [`LineClassifier`] implementation and versioned independently
//! of the reconstruction logic; [`PipeClassifier`] handles format version 1:
//!
//! ```text
//! [pid:tid:MMDD/HHMMSS.ffffff:LEVEL:src(n)] CALL|<isolate>|<call type>|<class>|<function>
//! ARG|<isolate>|<type>|<value>
//! RET|<isolate>|<type>|<value>
//! CTRL|<isolate>|<event>|<script id>|<base url>
//! ```
//!
//! The bracketed Chromium log prefix is optional. Classification never fails:
//! anything that cannot be read becomes an `Other`, `Unknown` or `Error` line.

use super::line::{
    CallRecord, ControlEvent, ControlRecord, Line, LineKind, RecordKind, ValueRecord,
};
use super::schema::Arg;
use crate::utils::config::{
    FIELD_DELIMITER, LOG_PREFIX_TIMESTAMP_INDEX, RECORD_FORMAT_VERSION, TAG_ARG, TAG_CALL,
    TAG_CONTROL, TAG_RET,
};
use crate::utils::error::LineError;

/// A raw record schema
///
/// Implementations must be pure: the same input always yields the same line.
pub trait LineClassifier: Send + Sync {
    /// Version of the record format this classifier understands
    fn format_version(&self) -> u32;

    /// Classify one raw record
    fn classify(&self, raw: &str, line_num: usize) -> Line;
}

/// Classifier for the `|`-delimited record format
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeClassifier;

impl PipeClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl LineClassifier for PipeClassifier {
    fn format_version(&self) -> u32 {
        RECORD_FORMAT_VERSION
    }

    fn classify(&self, raw: &str, line_num: usize) -> Line {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let (timestamp, body) = split_log_prefix(raw);

        let kind = classify_body(body);
        Line {
            line_num,
            timestamp,
            kind,
        }
    }
}

/// Classify every line of a raw log, numbering lines from 1
///
/// **Public** - convenience entry point for whole-file input
pub fn classify_lines<C: LineClassifier + ?Sized>(classifier: &C, input: &str) -> Vec<Line> {
    input
        .lines()
        .enumerate()
        .map(|(index, raw)| classifier.classify(raw, index + 1))
        .collect()
}

/// Strip an optional `[...] ` Chromium log prefix, returning its timestamp
///
/// **Private** - internal helper for classify
fn split_log_prefix(raw: &str) -> (Option<String>, &str) {
    let Some(rest) = raw.strip_prefix('[') else {
        return (None, raw);
    };
    let Some((prefix, body)) = rest.split_once(']') else {
        return (None, raw);
    };

    let timestamp = prefix
        .split(':')
        .nth(LOG_PREFIX_TIMESTAMP_INDEX)
        .filter(|ts| !ts.is_empty())
        .map(str::to_string);

    (timestamp, body.trim_start())
}

/// Classify a record body (prefix already removed)
///
/// **Private** - internal helper for classify
fn classify_body(body: &str) -> LineKind {
    let (tag, rest) = match body.split_once(FIELD_DELIMITER) {
        Some((tag, rest)) => (tag.trim(), Some(rest)),
        None => (body.trim(), None),
    };

    let kind = match tag {
        TAG_CALL => RecordKind::Call,
        TAG_ARG => RecordKind::Arg,
        TAG_RET => RecordKind::Ret,
        TAG_CONTROL => RecordKind::Control,
        _ => return LineKind::Other,
    };

    let fields: Vec<&str> = match (kind, rest) {
        (_, None) => Vec::new(),
        (RecordKind::Call, Some(rest)) | (RecordKind::Control, Some(rest)) => {
            rest.splitn(4, FIELD_DELIMITER).collect()
        }
        // Values are engine-serialized and may contain the delimiter
        (RecordKind::Arg, Some(rest)) | (RecordKind::Ret, Some(rest)) => {
            rest.splitn(3, FIELD_DELIMITER).collect()
        }
    };

    let result = match kind {
        RecordKind::Call => parse_call(&fields).map(LineKind::Call),
        RecordKind::Arg => parse_value(&fields).map(LineKind::Arg),
        RecordKind::Ret => parse_value(&fields).map(LineKind::Ret),
        RecordKind::Control => return parse_control(&fields),
    };

    result.unwrap_or_else(|error| LineKind::Error {
        attempted: kind,
        isolate: isolate_field(&fields),
        error,
    })
}

/// **Private** - isolate name of a record, when it has a non-empty one
fn isolate_field(fields: &[&str]) -> Option<String> {
    fields
        .first()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

/// **Private** - enforce a minimum field count and a non-empty isolate
fn check_fields(fields: &[&str], expected: usize) -> Result<String, LineError> {
    if fields.len() < expected {
        return Err(LineError::MissingFields {
            expected,
            found: fields.len(),
        });
    }
    isolate_field(fields).ok_or(LineError::EmptyIsolate)
}

/// **Private** - a required, trimmed, non-empty field
fn required(field: &str, name: &'static str) -> Result<String, LineError> {
    let field = field.trim();
    if field.is_empty() {
        Err(LineError::EmptyField(name))
    } else {
        Ok(field.to_string())
    }
}

fn parse_call(fields: &[&str]) -> Result<CallRecord, LineError> {
    let isolate = check_fields(fields, 4)?;
    Ok(CallRecord {
        isolate,
        call_type: required(fields[1], "call_type")?,
        class: required(fields[2], "class")?,
        function: required(fields[3], "function")?,
    })
}

fn parse_value(fields: &[&str]) -> Result<ValueRecord, LineError> {
    let isolate = check_fields(fields, 3)?;
    let arg_type = required(fields[1], "type")?;
    Ok(ValueRecord {
        isolate,
        value: Arg::new(arg_type, fields[2]),
    })
}

/// Unrecognised control events classify as `Unknown`, not `Error`
fn parse_control(fields: &[&str]) -> LineKind {
    let fail = |error| LineKind::Error {
        attempted: RecordKind::Control,
        isolate: isolate_field(fields),
        error,
    };

    let isolate = match check_fields(fields, 2) {
        Ok(isolate) => isolate,
        Err(e) => return fail(e),
    };

    let name = fields[1].trim();
    let Some(event) = ControlEvent::from_name(name) else {
        return LineKind::Unknown {
            isolate: Some(isolate),
            detail: format!("unknown control event '{}'", name),
        };
    };

    let optional = |index: usize| {
        fields
            .get(index)
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
    };
    let script_id = optional(2);
    let base_url = optional(3);

    if event.requires_script() && script_id.is_none() {
        return fail(LineError::MissingScriptId(event.name().to_string()));
    }

    LineKind::Control(ControlRecord {
        isolate,
        event,
        script_id,
        base_url,
    })
}
