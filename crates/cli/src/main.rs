//! Main entry point for the rplay CLI
//!
//! Inspects captures with the demultiplexers and plays them through a
//! playback session.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
