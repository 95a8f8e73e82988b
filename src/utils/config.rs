//! Configuration and constants for the reconstruction engine and CLI.

/// Current output schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Version of the raw record format understood by the default classifier
pub const RECORD_FORMAT_VERSION: u32 = 1;

/// Separator between fields of a raw record
pub const FIELD_DELIMITER: char = '|';

// Record tags (first field after the optional log prefix)
pub const TAG_CALL: &str = "CALL";
pub const TAG_ARG: &str = "ARG";
pub const TAG_RET: &str = "RET";
pub const TAG_CONTROL: &str = "CTRL";

// Control event names (second field of a CTRL record)
pub const EVENT_ISOLATE: &str = "isolate";
pub const EVENT_SCRIPT: &str = "script";
pub const EVENT_BEGIN: &str = "begin";
pub const EVENT_END: &str = "end";
pub const EVENT_CALLBACK_BEGIN: &str = "cb_begin";
pub const EVENT_CALLBACK_END: &str = "cb_end";

/// Index of the timestamp inside a Chromium log prefix
/// (`pid:tid:timestamp:level:source`)
pub const LOG_PREFIX_TIMESTAMP_INDEX: usize = 2;

/// Default number of APIs listed in the text summary
pub const DEFAULT_TOP_APIS: usize = 10;
