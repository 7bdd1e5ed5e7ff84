mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Grade submissions locally and inspect test inputs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a source file against a problem from the catalog
    Grade {
        /// Problem id (e.g., two-sum, valid-palindrome)
        #[arg(short, long)]
        problem: String,

        /// Language (javascript, python, java, cpp)
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,

        /// Problem catalog (defaults to ARBITER_PROBLEMS_PATH or config/problems.json)
        #[arg(long)]
        problems: Option<PathBuf>,

        /// Per-case timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the verdict as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List gradable languages and their default entry points
    Languages,

    /// Show how a test-case input string decodes into arguments
    Decode {
        /// Raw input, e.g. '[2,7,11,15],9'
        input: String,

        /// Fail on malformed input instead of falling back to one string argument
        #[arg(long, default_value = "false")]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so that stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade {
            problem,
            language,
            file,
            problems,
            timeout_ms,
            json,
        } => {
            let accepted = commands::grade(
                &problem,
                &language,
                &file,
                problems.as_deref(),
                timeout_ms,
                json,
            )
            .await?;
            if !accepted {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Languages => {
            commands::list_languages()?;
        }
        Commands::Decode { input, strict } => {
            commands::decode_input(&input, strict)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
