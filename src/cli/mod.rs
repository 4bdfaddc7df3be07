//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// threadport - move comment data between hosting systems
#[derive(Parser, Debug)]
#[command(name = "tport", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.threadport/data/threadport.db)
    #[arg(long, global = true, env = "TPORT_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import records from a payload of job options
    Import(ImportArgs),

    /// Export records as a single blob
    Export(ExportArgs),

    /// Stage a file for a later import and print its path
    Upload {
        /// File to stage
        file: PathBuf,
    },

    /// List available formats
    Formats,

    /// Show record counts in the store
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Job options as a JSON object, e.g. '{"format":"native","site":"blog","file":"/tmp/x"}'
    #[arg(long, conflicts_with = "payload_file", required_unless_present = "payload_file")]
    pub payload: Option<String>,

    /// Read the JSON options payload from a file
    #[arg(long, value_name = "PATH")]
    pub payload_file: Option<PathBuf>,

    /// Consent to overwriting existing records without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Render progress as HTML (for a browser reading the stream)
    #[arg(long)]
    pub html: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Only export this site (default: everything)
    #[arg(long)]
    pub site: Option<String>,

    /// Output format (default: native, or `default_format` from config)
    #[arg(long)]
    pub format: Option<String>,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
