//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.
//!
//! Nothing raised while reconstructing a trace is fatal: bad records are
//! described by [`LineError`] and counted, never propagated.

use crate::parser::schema::EntityId;
use thiserror::Error;

/// Why a raw record was classified as an error line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("expected at least {expected} fields, found {found}")]
    MissingFields { expected: usize, found: usize },

    #[error("empty isolate identifier")]
    EmptyIsolate,

    #[error("empty required field: {0}")]
    EmptyField(&'static str),

    #[error("control event '{0}' requires a script id")]
    MissingScriptId(String),
}

/// Errors that can occur while rebuilding a trace from flat records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RebuildError {
    #[error("no trace root record")]
    MissingRoot,

    #[error("more than one trace root record ({0} and {1})")]
    MultipleRoots(EntityId, EntityId),

    #[error("duplicate record id {0}")]
    DuplicateId(EntityId),

    #[error("record {parent} lists unknown child {child}")]
    DanglingChild { parent: EntityId, child: EntityId },

    #[error("record {0} has no parent")]
    MissingParent(EntityId),

    #[error("record {child} names unknown parent {parent}")]
    DanglingParent { child: EntityId, parent: EntityId },

    #[error("record {child} is listed under {listed} but names {actual} as parent")]
    ParentMismatch {
        child: EntityId,
        listed: EntityId,
        actual: EntityId,
    },

    #[error("record {child} names {parent} as parent but is not among its children")]
    NotListed { child: EntityId, parent: EntityId },

    #[error("record {0} has a child of the wrong kind")]
    KindMismatch(EntityId),

    #[error("call {call} names execution {execution}, which is not its ancestor")]
    ExecutionMismatch { call: EntityId, execution: EntityId },

    #[error("record {0} is not reachable from the trace root")]
    Unreachable(EntityId),
}

/// Errors returned by the post-reconstruction annotation hook
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotateError {
    #[error("no script with id {0}")]
    UnknownScript(EntityId),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("Unsupported schema version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid trace document: {0}")]
    Rebuild(#[from] RebuildError),
}
