//! Play command - Feed a capture through a playback session

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rplay::codec_core::NalFormat;
use rplay::infra_common::load_config;
use rplay::media_core::{BufferMode, SessionConfig, SessionHandle, SessionOutput, SystemClock};
use tracing::{info, warn};

use super::{print_event, FrameLine, Summary};
use crate::cli::PlayArgs;

/// Execute play command
pub async fn execute(args: &PlayArgs) -> anyhow::Result<()> {
    let config = session_config(args)?;
    let data = args.input.read()?;
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let summary = play(config, &data, args, interrupt).await?;
    summary.print(args.input.json);
    Ok(())
}

/// Configuration file first, then command-line overrides
pub fn session_config(args: &PlayArgs) -> anyhow::Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => load_config::<SessionConfig>(path)?,
        None => SessionConfig::default(),
    };
    if args.config.is_none() || args.input.container.is_some() {
        config.container_kind = args.input.container()?;
    }
    if args.continuous {
        config.buffer_mode = BufferMode::Continuous;
    }
    if let Some(ms) = args.buffer_ms {
        config.video_buffer_ms = ms;
    }
    if let Some(ms) = args.margin_ms {
        config.video_buffer_delay_ms = ms;
    }
    if let Some(rate) = args.rate {
        config.playback_rate = rate;
    }
    if args.annex_b {
        config.nal_format = NalFormat::AnnexB;
    }
    config.validate()?;
    Ok(config)
}

async fn play(
    config: SessionConfig,
    data: &[u8],
    args: &PlayArgs,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<Summary> {
    let json = args.input.json;
    info!(
        "Playing {} as {} ({:?}, buffer {} ms)",
        args.input.file.display(),
        config.container_kind,
        config.buffer_mode,
        config.video_buffer_ms
    );
    let (handle, mut outputs) = SessionHandle::spawn(config, Arc::new(SystemClock::new()))?;

    let started = Instant::now();
    let consumer = tokio::spawn(async move {
        let mut summary = Summary::default();
        while let Some(output) = outputs.recv().await {
            match output {
                SessionOutput::Frame(frame) => {
                    summary.frame(&frame);
                    FrameLine::new(&frame, Some(started.elapsed().as_millis() as u64)).print(json);
                }
                SessionOutput::Event(event) => {
                    summary.event(event.name());
                    print_event(event.name(), &format!("{:?}", event), json);
                }
            }
        }
        summary
    });

    let feed = async {
        for chunk in data.chunks(args.input.chunk_size) {
            handle.push(chunk.to_vec()).await?;
            if args.chunk_interval_ms > 0 {
                tokio::time::sleep(Duration::from_millis(args.chunk_interval_ms)).await;
            }
        }
        if args.linger_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.linger_ms)).await;
        }
        handle.finish().await
    };

    tokio::select! {
        fed = feed => fed?,
        _ = interrupt => {
            warn!("Interrupted, stopping without draining the buffer");
            handle.abort();
        }
    }
    handle.close().await?;
    handle.join().await?;
    Ok(consumer.await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use rplay::demux_core::ContainerKind;
    use rplay_demux_core::testing;

    fn args(extra: &[&str]) -> PlayArgs {
        let mut argv = vec!["rplay", "play"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Play(args) => args,
            Commands::Demux(_) => unreachable!(),
        }
    }

    #[test]
    fn test_overrides_apply_on_defaults() {
        let config = session_config(&args(&["live.ts", "--continuous", "--buffer-ms", "200", "--annex-b"])).unwrap();
        assert_eq!(config.container_kind, ContainerKind::Ts);
        assert_eq!(config.buffer_mode, BufferMode::Continuous);
        assert_eq!(config.video_buffer_ms, 200);
        assert_eq!(config.nal_format, NalFormat::AnnexB);
        assert!(session_config(&args(&["live.ts", "--rate", "0"])).is_err());
    }

    #[test]
    fn test_config_file_keeps_its_container() {
        let path = std::env::temp_dir().join(format!("rplay-cli-play-{}.toml", std::process::id()));
        std::fs::write(&path, "container_kind = \"fmp4\"\nvideo_buffer_ms = 900\n").unwrap();
        let config = session_config(&args(&["dump.bin", "--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.container_kind, ContainerKind::Fmp4);
        assert_eq!(config.video_buffer_ms, 900);

        let config = session_config(&args(&["dump.bin", "--config", path.to_str().unwrap(), "-c", "flv"])).unwrap();
        assert_eq!(config.container_kind, ContainerKind::Flv);
    }

    #[tokio::test]
    async fn test_play_releases_every_frame() {
        let args = args(&["capture.flv", "--continuous", "--chunk-size", "100"]);
        let config = session_config(&args).unwrap();
        let summary = play(config, &testing::flv_av_stream(3), &args, std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.video_frames, 4);
        assert_eq!(summary.audio_frames, 6);
        assert_eq!(summary.events["video_configured"], 1);
    }
}
