//! Demux command - List raw demultiplexer output

use rplay::codec_core::EncodedFrame;
use rplay::demux_core::{DemuxEvent, DemuxerFactory, DemuxerOptions, FrameSink};
use tracing::info;

use super::{print_event, FrameLine, Summary};
use crate::cli::DemuxArgs;

struct Printer {
    json: bool,
    quiet: bool,
    summary: Summary,
}

impl FrameSink for Printer {
    fn on_frame(&mut self, frame: EncodedFrame) {
        self.summary.frame(&frame);
        if !self.quiet {
            FrameLine::new(&frame, None).print(self.json);
        }
    }

    fn on_event(&mut self, event: DemuxEvent) {
        let (name, detail) = describe(&event);
        self.summary.event(name);
        if !self.quiet {
            print_event(name, &detail, self.json);
        }
    }
}

/// Short name and readable detail of a demuxer event
pub fn describe(event: &DemuxEvent) -> (&'static str, String) {
    match event {
        DemuxEvent::TrackInfo(tracks) => (
            "tracks",
            format!("audio: {}, video: {}", tracks.has_audio, tracks.has_video),
        ),
        DemuxEvent::VideoConfig(config) => ("video_config", config.describe()),
        DemuxEvent::AudioConfig(config) => (
            "audio_config",
            format!("{} {} Hz, {} channels", config.codec.name(), config.sample_rate, config.channels),
        ),
        DemuxEvent::Metadata(metadata) => ("metadata", format!("{:?}", metadata)),
        DemuxEvent::Warning(warning) => ("warning", warning.clone()),
    }
}

/// Execute demux command
pub fn execute(args: &DemuxArgs) -> anyhow::Result<()> {
    let summary = run(args, false)?;
    summary.print(args.input.json);
    Ok(())
}

fn run(args: &DemuxArgs, quiet: bool) -> anyhow::Result<Summary> {
    let kind = args.input.container()?;
    let data = args.input.read()?;
    let mut options = DemuxerOptions::default();
    if let Some(fps) = args.fps {
        options.nominal_fps = fps;
    }
    let mut demuxer = DemuxerFactory::create(kind, &options)?;
    info!("Demuxing {} ({} bytes) as {}", args.input.file.display(), data.len(), kind);

    let mut printer = Printer {
        json: args.input.json,
        quiet,
        summary: Summary::default(),
    };
    for chunk in data.chunks(args.input.chunk_size) {
        demuxer.feed(chunk, &mut printer)?;
    }
    demuxer.flush(&mut printer)?;
    Ok(printer.summary)
}
