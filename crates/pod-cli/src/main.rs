//! # pod
//!
//! Package dependency manager for a source-based ecosystem. This is
//! the binary entry point: it parses the command line, sets up logging
//! and the command context, and dispatches to the command handlers.

use clap::{Parser, Subcommand};
use pod_cli::commands::{self, CommandContext};
use pod_core::error::PodResult;
use tracing::debug;

/// Package dependency manager
#[derive(Parser)]
#[command(name = "pod", version, about = "Package dependency manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and materialize dependencies
    Get,
    /// Upgrade all dependencies, or only the named ones
    Upgrade {
        /// Packages to force to latest (all when omitted)
        packages: Vec<String>,
    },
    /// Show the solved dependency graph
    Deps,
    /// Discard the cache staging area
    Clean,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(error) = runtime.block_on(run(cli)) {
        let output = pod_cli::output::OutputHandler::new();
        output.error(&error.to_string());
        if let pod_core::error::PodError::NoVersionAvailable { chain, .. } = &error {
            for line in chain {
                output.line(&format!("  because {line}"));
            }
        }
        if let Some(suggestion) = error.suggestion() {
            output.info(suggestion);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> PodResult<()> {
    let ctx = CommandContext::new()?;
    debug!(cwd = %ctx.cwd, cache = %ctx.cache_root, "starting");

    match cli.command {
        Commands::Get => commands::get(&ctx).await,
        Commands::Upgrade { packages } => commands::upgrade(packages, &ctx).await,
        Commands::Deps => commands::deps(&ctx).await,
        Commands::Clean => commands::clean(&ctx).await,
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "pod={level},pod_core={level},pod_cache={level},pod_source={level},pod_solver={level},pod_cli={level}"
                ))
            }),
        )
        .with_target(false)
        .init();
}
