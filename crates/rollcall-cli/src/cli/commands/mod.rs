//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod helpers;
mod match_cmd;
mod process;
mod reference;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use rollcall::config::Settings;

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Extract and classify attendee credentials from signin sheets")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the batch pipeline over a directory of PDFs and page images
    Process {
        /// Input directory (default: paths.input_dir from config)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Number of OCR extraction workers (default: extraction.ocr_workers)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Stop the job after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Never ask the AI endpoint to classify pages
        #[arg(long)]
        no_ai_fallback: bool,
        /// Print the final job status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that external tools, the AI key and reference data are available
    Check,

    /// Classify a single credential string against the reference data
    Match {
        /// Credential text as written on the sheet
        credential: String,
        /// Organization (sponsor company) id
        #[arg(long, default_value = "1")]
        org: u32,
        /// Venue state; omit to consider every credential of the organization
        #[arg(long)]
        state: Option<String>,
    },

    /// Manage the SQLite reference database
    Reference {
        #[command(subcommand)]
        command: ReferenceCommands,
    },
}

#[derive(Subcommand)]
enum ReferenceCommands {
    /// Create an empty reference database
    Init {
        /// Database path (default: paths.reference, or the data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Load a JSON/TOML/YAML reference file into the database, replacing its contents
    Import {
        /// Reference file to load
        file: PathBuf,
        /// Database path (default: paths.reference, or the data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Process {
            input,
            workers,
            timeout,
            no_ai_fallback,
            json,
        } => {
            let options = process::ProcessOptions {
                input,
                workers,
                timeout,
                no_ai_fallback,
                json,
            };
            process::cmd_process(settings, options).await
        }
        Commands::Check => check::cmd_check(&settings).await,
        Commands::Match {
            credential,
            org,
            state,
        } => match_cmd::cmd_match(&settings, &credential, org, state.as_deref()).await,
        Commands::Reference { command } => match command {
            ReferenceCommands::Init { db } => reference::cmd_reference_init(&settings, db).await,
            ReferenceCommands::Import { file, db } => {
                reference::cmd_reference_import(&settings, &file, db).await
            }
        },
    }
}
