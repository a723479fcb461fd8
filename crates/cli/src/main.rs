mod commands;
mod loader;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// QTI response processing engine.
#[derive(Parser)]
#[command(name = "qti", version, about = "QTI response processing engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an interchange document and summarise its declarations and rules
    Check {
        /// Path to the interchange JSON document
        document: PathBuf,
    },

    /// Run template, response and outcome processing over a document
    Process {
        /// Path to the interchange JSON document
        document: PathBuf,
        /// Candidate responses as a JSON object of identifier to value
        #[arg(long)]
        responses: Option<PathBuf>,
        /// Engine configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seed for random expressions; overrides the config file
        #[arg(long)]
        seed: Option<u64>,
        /// Print the rule trace of each processing run
        #[arg(long)]
        trace: bool,
    },
}

fn main() {
    // RUST_LOG controls engine logging; warnings only by default
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { document } => {
            commands::check::cmd_check(&document, cli.output, cli.quiet);
        }
        Commands::Process {
            document,
            responses,
            config,
            seed,
            trace,
        } => {
            let options = commands::process::ProcessOptions {
                responses,
                config,
                seed,
                trace,
            };
            commands::process::cmd_process(&document, &options, cli.output, cli.quiet);
        }
    }
}

/// Report an error message in the appropriate format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
