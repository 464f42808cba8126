use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};

pub mod validators;

pub use validators::{MAX_HISTORY_LIMIT, validate_csv_file, validate_history_limit};

/// Top-level CLI entry point.
#[derive(Debug, Default, Parser)]
#[command(
    name = "jernih",
    version,
    author,
    about = "Jernih text cleansing service for Indonesian social-media posts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the Jernih HTTP server.
    Serve(ServeArgs),
    /// Cleanse a single text and print the result.
    CleanseText(CleanseTextArgs),
    /// Cleanse one column of a CSV file.
    CleanseFile(CleanseFileArgs),
    /// Show recently recorded processing results.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs;

/// Cleanse free text. Reads standard input line by line when no text is given.
#[derive(Debug, Args)]
pub struct CleanseTextArgs {
    /// Text to cleanse.
    #[arg(value_name = "TEXT")]
    pub text: Option<String>,
}

/// Cleanse the target column of a CSV file and write the table back out.
#[derive(Debug, Args)]
pub struct CleanseFileArgs {
    /// CSV file to process (Latin-1 encoded, header row required).
    #[arg(value_name = "CSV", value_parser = validate_csv_file)]
    pub input: PathBuf,
    /// Column to cleanse; defaults to `pipeline.target_field`.
    #[arg(long)]
    pub column: Option<String>,
    /// Write the cleansed CSV here instead of standard output.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// List records from the processing history store.
#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Maximum number of records, newest first.
    #[arg(long, default_value_t = 20, value_parser = validate_history_limit)]
    pub limit: usize,
    /// Output rendering (human-readable text or JSON lines).
    #[arg(long, value_enum, default_value_t = HistoryFormat::Text)]
    pub format: HistoryFormat,
}

/// How to render history output.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HistoryFormat {
    Text,
    Json,
}
