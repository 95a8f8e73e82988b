//! Classified instrumentation records.
//!
//! A [`Line`] is the typed form of one raw log record. Each record kind has
//! its own variant so the reconstruction engine can match exhaustively.

use super::schema::Arg;
use crate::utils::config::{
    EVENT_BEGIN, EVENT_CALLBACK_BEGIN, EVENT_CALLBACK_END, EVENT_END, EVENT_ISOLATE, EVENT_SCRIPT,
};
use crate::utils::error::LineError;
use std::fmt;

/// Kind of record a raw line claimed to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Call,
    Arg,
    Ret,
    Control,
}

/// Coarse classification tag of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineType {
    Call,
    Arg,
    Ret,
    Control,
    Other,
    Unknown,
    Error,
}

/// Structural event carried by a control record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlEvent {
    /// A new isolate came into existence
    IsolateCreated,
    /// A script was loaded into, or associated with, the isolate
    ScriptLoaded,
    /// Start of a script's initial run
    Begin,
    /// End of a script's initial run
    End,
    /// Start of a callback re-entry
    CallbackBegin,
    /// End of a callback re-entry
    CallbackEnd,
}

impl ControlEvent {
    /// Parse the event name of a control record
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            EVENT_ISOLATE => Some(Self::IsolateCreated),
            EVENT_SCRIPT => Some(Self::ScriptLoaded),
            EVENT_BEGIN => Some(Self::Begin),
            EVENT_END => Some(Self::End),
            EVENT_CALLBACK_BEGIN => Some(Self::CallbackBegin),
            EVENT_CALLBACK_END => Some(Self::CallbackEnd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IsolateCreated => EVENT_ISOLATE,
            Self::ScriptLoaded => EVENT_SCRIPT,
            Self::Begin => EVENT_BEGIN,
            Self::End => EVENT_END,
            Self::CallbackBegin => EVENT_CALLBACK_BEGIN,
            Self::CallbackEnd => EVENT_CALLBACK_END,
        }
    }

    pub fn is_begin(&self) -> bool {
        matches!(self, Self::Begin | Self::CallbackBegin)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::End | Self::CallbackEnd)
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, Self::CallbackBegin | Self::CallbackEnd)
    }

    /// Events that must name the script they refer to
    pub fn requires_script(&self) -> bool {
        matches!(self, Self::ScriptLoaded | Self::Begin | Self::CallbackBegin)
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An API call entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub isolate: String,
    pub call_type: String,
    pub class: String,
    pub function: String,
}

/// An argument or return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
    pub isolate: String,
    pub value: Arg,
}

/// A structural event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub isolate: String,
    pub event: ControlEvent,
    pub script_id: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Call(CallRecord),
    Arg(ValueRecord),
    Ret(ValueRecord),
    Control(ControlRecord),

    /// Harmless noise: blank lines, banners, unrelated log output
    Other,

    /// Matched a record tag but not a known schema
    Unknown {
        isolate: Option<String>,
        detail: String,
    },

    /// Matched a record tag but failed a structural check
    Error {
        attempted: RecordKind,
        isolate: Option<String>,
        error: LineError,
    },
}

/// One classified record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub line_num: usize,
    pub timestamp: Option<String>,
    pub kind: LineKind,
}

impl Line {
    pub fn new(line_num: usize, kind: LineKind) -> Self {
        Self {
            line_num,
            timestamp: None,
            kind,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn line_type(&self) -> LineType {
        match &self.kind {
            LineKind::Call(_) => LineType::Call,
            LineKind::Arg(_) => LineType::Arg,
            LineKind::Ret(_) => LineType::Ret,
            LineKind::Control(_) => LineType::Control,
            LineKind::Other => LineType::Other,
            LineKind::Unknown { .. } => LineType::Unknown,
            LineKind::Error { .. } => LineType::Error,
        }
    }

    /// Isolate the record names, if it names one
    pub fn isolate(&self) -> Option<&str> {
        match &self.kind {
            LineKind::Call(rec) => Some(&rec.isolate),
            LineKind::Arg(rec) | LineKind::Ret(rec) => Some(&rec.isolate),
            LineKind::Control(rec) => Some(&rec.isolate),
            LineKind::Other => None,
            LineKind::Unknown { isolate, .. } | LineKind::Error { isolate, .. } => {
                isolate.as_deref()
            }
        }
    }
}
