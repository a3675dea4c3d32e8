#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use mailer::Mailer;
use mailer_common::logging;

/// Deliver templated email requests from a message queue
#[derive(Parser, Debug)]
#[command(name = "mailer", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Path to the configuration file
    #[arg(short = 'c', long = "config", default_value = "./mailer.json")]
    config: PathBuf,

    /// Print version information and exit
    #[arg(short = 'v', long = "version", action = ArgAction::SetTrue)]
    version: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("mailer {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    logging::init();

    let mailer = Mailer::load(&cli.config)?;
    mailer.run().await?;

    Ok(())
}
