//! Demultiplexer contract shared by every container format

use std::sync::Arc;

use rplay_codec_core::{AudioConfig, EncodedFrame, MediaType, VideoConfig};

use crate::error::Result;
use crate::factory::ContainerKind;

/// Which elementary streams a container announced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackInfo {
    /// An audio track is present
    pub has_audio: bool,
    /// A video track is present
    pub has_video: bool,
}

impl TrackInfo {
    /// Media type that anchors the playback clock: video when present
    pub fn clock_media(&self) -> MediaType {
        if self.has_video || !self.has_audio {
            MediaType::Video
        } else {
            MediaType::Audio
        }
    }
}

/// Informational stream properties from an FLV `onMetaData` script tag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetadata {
    /// Announced duration in seconds (0 for live streams)
    pub duration: Option<f64>,
    /// Video width
    pub width: Option<f64>,
    /// Video height
    pub height: Option<f64>,
    /// Nominal frame rate
    pub frame_rate: Option<f64>,
    /// Flash video codec id
    pub video_codec_id: Option<f64>,
    /// Flash audio codec id
    pub audio_codec_id: Option<f64>,
    /// Audio sample rate in Hz
    pub audio_sample_rate: Option<f64>,
    /// Encoder name
    pub encoder: Option<String>,
}

/// Out-of-band notifications produced alongside frames
#[derive(Debug, Clone, PartialEq)]
pub enum DemuxEvent {
    /// The container announced its elementary streams
    TrackInfo(TrackInfo),
    /// A new video configuration is in effect
    VideoConfig(Arc<VideoConfig>),
    /// A new audio configuration is in effect
    AudioConfig(Arc<AudioConfig>),
    /// Stream metadata was decoded
    Metadata(StreamMetadata),
    /// A malformed unit was skipped
    Warning(String),
}

/// Receiver for demultiplexed output
pub trait FrameSink {
    /// A complete access unit
    fn on_frame(&mut self, frame: EncodedFrame);

    /// A configuration change or diagnostic
    fn on_event(&mut self, event: DemuxEvent);
}

/// Incremental container parser.
///
/// Implementations accept arbitrary chunking: feeding the same bytes split at
/// any points yields the same frames and events in the same order.
pub trait Demuxer: Send {
    /// Container format handled by this demuxer
    fn kind(&self) -> ContainerKind;

    /// Append a chunk and report every unit it completes
    fn feed(&mut self, chunk: &[u8], sink: &mut dyn FrameSink) -> Result<()>;

    /// End of stream: report units that only the end of input terminates
    fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<()>;

    /// Drop carry-over bytes and expect a new container stream.
    ///
    /// With `full` set, cached parameter sets and configurations are
    /// forgotten as well.
    fn reset(&mut self, full: bool);

    /// Number of carry-over bytes currently held
    fn buffered_len(&self) -> usize;
}

/// Sink that records everything it receives
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    /// Frames in emission order
    pub frames: Vec<EncodedFrame>,
    /// Events in emission order
    pub events: Vec<DemuxEvent>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Video frames only
    pub fn video_frames(&self) -> impl Iterator<Item = &EncodedFrame> {
        self.frames.iter().filter(|f| f.is_video())
    }

    /// Audio frames only
    pub fn audio_frames(&self) -> impl Iterator<Item = &EncodedFrame> {
        self.frames.iter().filter(|f| !f.is_video())
    }

    /// Warning messages
    pub fn warnings(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DemuxEvent::Warning(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The most recent video configuration
    pub fn video_config(&self) -> Option<&Arc<VideoConfig>> {
        self.events.iter().rev().find_map(|e| match e {
            DemuxEvent::VideoConfig(config) => Some(config),
            _ => None,
        })
    }

    /// The most recent audio configuration
    pub fn audio_config(&self) -> Option<&Arc<AudioConfig>> {
        self.events.iter().rev().find_map(|e| match e {
            DemuxEvent::AudioConfig(config) => Some(config),
            _ => None,
        })
    }
}

impl FrameSink for CollectingSink {
    fn on_frame(&mut self, frame: EncodedFrame) {
        self.frames.push(frame);
    }

    fn on_event(&mut self, event: DemuxEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_media_prefers_video() {
        let both = TrackInfo {
            has_audio: true,
            has_video: true,
        };
        assert_eq!(both.clock_media(), MediaType::Video);
        let audio_only = TrackInfo {
            has_audio: true,
            has_video: false,
        };
        assert_eq!(audio_only.clock_media(), MediaType::Audio);
        assert_eq!(TrackInfo::default().clock_media(), MediaType::Video);
    }

    #[test]
    fn test_collecting_sink_filters() {
        let mut sink = CollectingSink::new();
        sink.on_event(DemuxEvent::Warning("bad tag".into()));
        sink.on_event(DemuxEvent::TrackInfo(TrackInfo::default()));
        assert_eq!(sink.warnings(), vec!["bad tag"]);
        assert!(sink.video_config().is_none());
    }
}
