mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codegrade")]
#[command(about = "Codegrade CLI - Evaluate Python submissions for correctness, complexity, style and security", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full evaluation and print the report as JSON
    Evaluate {
        /// Problem definition file (problem_<id>.json)
        #[arg(short, long)]
        problem: PathBuf,

        /// Submission source file
        #[arg(short, long)]
        code: PathBuf,

        /// Evaluator config (defaults to $CODEGRADE_CONFIG or config/evaluator.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pretty-print the JSON report
        #[arg(long, default_value = "false")]
        pretty: bool,
    },

    /// Static analysis only (complexity, style, security); nothing is executed
    Analyze {
        /// Submission source file
        #[arg(short, long)]
        code: PathBuf,

        /// Evaluator config (defaults to $CODEGRADE_CONFIG or config/evaluator.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List problems in a directory
    Problems {
        /// Problems directory (defaults to $PROBLEMS_DIR or ./problems)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Initialize a new evaluator workspace
    Init {
        /// Project path
        #[arg(short, long, default_value = ".")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            problem,
            code,
            config,
            pretty,
        } => {
            commands::evaluate(&problem, &code, config.as_deref(), pretty).await?;
        }
        Commands::Analyze { code, config } => {
            commands::analyze(&code, config.as_deref())?;
        }
        Commands::Problems { dir } => {
            commands::list_problems(dir.as_deref())?;
        }
        Commands::Init { path } => {
            commands::init_project(&path)?;
        }
    }

    Ok(())
}
