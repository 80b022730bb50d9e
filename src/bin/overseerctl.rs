use clap::Parser;
use overseer::{Result, config, ctl, logger};
use std::path::PathBuf;

/// Control programs run by overseerd from the command line.
#[derive(Debug, Parser)]
#[clap(name = "overseerctl", version)]
struct Cli {
    /// Log protocol traffic to stderr
    #[clap(short = 'd', long)]
    debug: bool,

    /// Path to the configuration file, used only to locate the control port
    #[clap(short = 'c', long)]
    configuration: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    logger::init(Some(level));
    let port = config::server_port(cli.configuration.as_deref());
    ctl::run(port).await
}
