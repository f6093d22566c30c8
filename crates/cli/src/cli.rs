//! Command-line definitions

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use rplay::demux_core::ContainerKind;
use rplay::infra_common::{parse_log_level, setup_logging, LoggingConfig};

use crate::commands;

/// Inspect and play live stream captures
#[derive(Parser, Debug)]
#[command(name = "rplay", author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RPLAY_LOG_LEVEL")]
    pub log_level: String,

    /// Write logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the frames and events a container yields
    Demux(DemuxArgs),
    /// Feed a capture through a playback session and print released frames
    Play(PlayArgs),
}

/// Input selection shared by every command
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Capture file
    pub file: PathBuf,

    /// Container format; guessed from the file extension when absent
    #[arg(short, long)]
    pub container: Option<ContainerKind>,

    /// Bytes handed to the demuxer per push
    #[arg(long, default_value_t = 4096)]
    pub chunk_size: usize,

    /// Print one JSON object per line
    #[arg(long)]
    pub json: bool,
}

impl InputArgs {
    /// Container named on the command line or implied by the extension
    pub fn container(&self) -> anyhow::Result<ContainerKind> {
        if let Some(kind) = self.container {
            return Ok(kind);
        }
        let extension = self
            .file
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| anyhow!("cannot guess the container of {}; pass --container", self.file.display()))?;
        extension
            .parse()
            .with_context(|| format!("cannot guess the container of {}; pass --container", self.file.display()))
    }

    /// Whole capture
    pub fn read(&self) -> anyhow::Result<Vec<u8>> {
        if self.chunk_size == 0 {
            return Err(anyhow!("--chunk-size must be positive"));
        }
        fs::read(&self.file).with_context(|| format!("failed to read {}", self.file.display()))
    }
}

/// Arguments of `rplay demux`
#[derive(Args, Debug)]
pub struct DemuxArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Nominal frame rate for streams without timing
    #[arg(long)]
    pub fps: Option<f64>,
}

/// Arguments of `rplay play`
#[derive(Args, Debug)]
pub struct PlayArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Session configuration file (TOML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Release frames as soon as they are in bounds
    #[arg(long)]
    pub continuous: bool,

    /// Target buffer delay in milliseconds
    #[arg(long)]
    pub buffer_ms: Option<u64>,

    /// Extra delay tolerated before dropping
    #[arg(long)]
    pub margin_ms: Option<u64>,

    /// Playback rate
    #[arg(long)]
    pub rate: Option<f64>,

    /// Emit Annex-B video payloads
    #[arg(long)]
    pub annex_b: bool,

    /// Pause between pushes to imitate network arrival
    #[arg(long, default_value_t = 0)]
    pub chunk_interval_ms: u64,

    /// Time the buffer may keep playing after the last push before the rest is flushed
    #[arg(long, default_value_t = 0)]
    pub linger_ms: u64,
}

impl Cli {
    /// Run the selected command
    pub async fn execute(self) -> anyhow::Result<()> {
        let level = parse_log_level(&self.log_level)?;
        let mut logging = LoggingConfig::new(level, "rplay");
        if self.log_json {
            logging = logging.with_json();
        }
        setup_logging(logging)?;

        match self.command {
            Commands::Demux(args) => commands::demux::execute(&args),
            Commands::Play(args) => commands::play::execute(&args).await,
        }
    }
}
