#[macro_use]
extern crate log;

use clap::Parser;
use overseer::supervisor::Supervisor;
use overseer::{Result, config, env, logger, server};
use std::path::PathBuf;

/// Run a configured set of programs as supervised daemons.
#[derive(Debug, Parser)]
#[clap(name = "overseerd", version)]
struct Cli {
    /// Path to the configuration file; default locations are searched when
    /// omitted
    #[clap(short = 'c', long)]
    configuration: Option<PathBuf>,

    /// Stay in the foreground instead of daemonizing
    #[clap(short = 'n', long)]
    nodaemon: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.nodaemon {
        logger::init(None);
    } else {
        logger::init_file(&env::OVERSEER_LOG_FILE);
    }

    // a configuration error is fatal before any child spawns
    let settings = config::load(cli.configuration.as_deref())?;

    #[cfg(unix)]
    if !cli.nodaemon {
        overseer::daemonize::daemonize()?;
    }

    serve(settings)
}

#[tokio::main]
async fn serve(settings: config::Settings) -> Result<()> {
    info!(
        "overseerd {} starting with pid {}",
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );
    let port = settings.port;
    let supervisor = Supervisor::new(settings);
    server::serve(supervisor, port).await?;
    info!("overseerd shut down");
    Ok(())
}
