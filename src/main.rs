mod cli;
mod config;
mod generator;
mod logging;
mod patch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "llmpatch")]
#[command(about = "Apply LLM-proposed SEARCH/REPLACE edits safely, with bounded correction rounds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a backend for edits and apply them
    Edit {
        /// What to change
        #[arg(required = true, trailing_var_arg = true)]
        request: Vec<String>,

        /// Files to show the backend and allow it to edit
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,

        /// Backend to use (overrides defaults.backend)
        #[arg(long)]
        backend: Option<String>,

        /// Also include project modules the files import
        #[arg(long)]
        related: bool,
    },

    /// Check a saved response without writing anything
    Check {
        /// Response file (reads stdin when omitted)
        response: Option<PathBuf>,

        /// Files blocks without a FILE: line may target
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,

        /// Also include project modules the files import
        #[arg(long)]
        related: bool,
    },

    /// Check backend availability
    Doctor,

    /// List configured backends
    Backends,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Edit { .. } => "edit",
            Commands::Check { .. } => "check",
            Commands::Doctor => "doctor",
            Commands::Backends => "backends",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let root = match &cli.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let config = config::LlmPatchConfig::load(Some(&root))?;

    // Only edits leave a log file behind unless one is asked for
    let log_file = match (cli.log_file.clone(), config.log_file()) {
        (Some(path), _) | (None, Some(path)) => Some(path),
        (None, None) if matches!(cli.command, Commands::Edit { .. }) => {
            logging::default_log_path(cli.command.name()).ok()
        }
        (None, None) => None,
    };
    logging::init_logging(cli.debug, cli.quiet || cli.json, log_file)?;

    let mode = cli::OutputMode::from_flags(cli.json, cli.quiet);
    let handler = cli::create_handler(mode, cli.debug);

    let code = match cli.command {
        Commands::Edit {
            request,
            files,
            backend,
            related,
        } => {
            let request = request.join(" ");
            cli::edit(
                &request,
                &files,
                backend.as_deref(),
                related,
                &root,
                &config,
                &*handler,
            )
            .await?
        }

        Commands::Check {
            response,
            files,
            related,
        } => {
            let response = cli::read_response(response.as_deref())?;
            cli::check(&response, &files, related, &root, &config, &*handler)?
        }

        Commands::Doctor => cli::doctor(&config, &*handler).await,

        Commands::Backends => {
            cli::list_backends(&config, &*handler);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
