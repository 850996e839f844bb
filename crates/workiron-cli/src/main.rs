//! WorkIron CLI entry point.

use clap::Parser;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use workiron_cli::cli::{Cli, Commands};
use workiron_cli::commands::{self, Context};
use workiron_cli::repl::Repl;

fn main() {
    // Load .env.local from the working and config directories
    workiron_core::load_env_files();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    // Default layout only; an explicit --state-dir is created on demand
    if cli.state_dir.is_none() {
        if let Err(e) = workiron_core::ensure_all_dirs() {
            warn!(error = %e, "failed to create state directories");
        }
    }

    let state_dir = cli.state_dir();
    let result = Context::from_cli(&cli).and_then(|ctx| match cli.command {
        Some(Commands::Chat) | None => run_repl(&state_dir, &ctx),
        Some(cmd) => commands::execute(cmd, &ctx),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_repl(state_dir: &std::path::Path, ctx: &Context) -> commands::Result<()> {
    std::fs::create_dir_all(state_dir)?;

    let session = ctx.open_session(true)?;
    let mut repl = Repl::new(session, state_dir)?;
    repl.run()?;
    Ok(())
}
