use std::path::PathBuf;
use crate::utils::config::DEFAULT_TOP_APIS;

/// Arguments for the reconstruct command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct ReconstructArgs {
    /// Raw instrumentation log to read
    pub input: PathBuf,

    /// Output path for the JSON trace document
    pub output_json: PathBuf,

    /// Print text summary to stdout
    pub print_summary: bool,

    /// Number of APIs listed in the summary
    pub top_apis: usize,

    /// Rebuild isolates on a rayon worker pool
    pub parallel: bool,
}

impl Default for ReconstructArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_json: PathBuf::from("trace.json"),
            print_summary: false,
            top_apis: DEFAULT_TOP_APIS,
            parallel: false,
        }
    }
}
