//! JS Trace CLI
//!
//! Rebuilds isolate/script/execution/call trees from instrumented
//! browser logs and writes them as flat JSON records.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use jstrace::commands::{
    display_schema, display_version, execute_reconstruct, validate_args, validate_trace_file,
    ReconstructArgs,
};
use jstrace::utils::config::DEFAULT_TOP_APIS;

/// JS Trace - JavaScript API call trace reconstruction
#[derive(Parser, Debug)]
#[command(name = "jstrace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconstruct a trace from an instrumentation log
    Reconstruct {
        /// Instrumentation log to read
        #[arg(short, long, env = "JSTRACE_INPUT")]
        input: PathBuf,

        /// Output path for the JSON trace
        #[arg(short, long, default_value = "trace.json")]
        output: PathBuf,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,

        /// Number of most used APIs listed in the summary
        #[arg(long, default_value_t = DEFAULT_TOP_APIS)]
        top_apis: usize,

        /// Rebuild isolates on a thread pool
        #[arg(long)]
        parallel: bool,
    },

    /// Validate a trace JSON file
    Validate {
        /// Path to trace JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Reconstruct {
            input,
            output,
            summary,
            top_apis,
            parallel,
        } => {
            let args = ReconstructArgs {
                input,
                output_json: output,
                print_summary: summary,
                top_apis,
                parallel,
            };

            // Validate args first
            validate_args(&args)?;

            execute_reconstruct(args)?;
        }

        Commands::Validate { file } => {
            validate_trace_file(&file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
