//! Session diagnostics and output

use std::sync::Arc;

use rplay_codec_core::{AudioConfig, EncodedFrame, MediaType, VideoConfig};
use rplay_demux_core::{StreamMetadata, TrackInfo};

use crate::buffer::SchedulerSignal;

/// Non-fatal notifications from a playback session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The container announced its tracks
    TracksAnnounced(TrackInfo),
    /// A video configuration was detected
    VideoConfigured(Arc<VideoConfig>),
    /// An audio configuration was detected
    AudioConfigured(Arc<AudioConfig>),
    /// Stream metadata was decoded
    Metadata(StreamMetadata),
    /// Playout delay passed the drop threshold
    NetworkDelayExceeded { delay_ms: u64, limit_ms: u64 },
    /// A timestamp regression reset the playback clock
    TimestampAnomaly {
        media_type: MediaType,
        previous_dts: u64,
        dts: u64,
    },
    /// Catch-up dropping started
    DroppingEngaged { delay_ms: u64 },
    /// The queue bound discarded frames
    QueueOverflow { dropped: usize },
    /// Decryption is configured but unusable; frames pass through
    CryptoMisconfigured { reason: String },
    /// The demuxer skipped a malformed unit
    DemuxWarning(String),
}

impl SessionEvent {
    /// Short name for logs and counters
    pub fn name(&self) -> &'static str {
        match self {
            Self::TracksAnnounced(_) => "tracks_announced",
            Self::VideoConfigured(_) => "video_configured",
            Self::AudioConfigured(_) => "audio_configured",
            Self::Metadata(_) => "metadata",
            Self::NetworkDelayExceeded { .. } => "network_delay_exceeded",
            Self::TimestampAnomaly { .. } => "timestamp_anomaly",
            Self::DroppingEngaged { .. } => "dropping_engaged",
            Self::QueueOverflow { .. } => "queue_overflow",
            Self::CryptoMisconfigured { .. } => "crypto_misconfigured",
            Self::DemuxWarning(_) => "demux_warning",
        }
    }
}

impl From<SchedulerSignal> for SessionEvent {
    fn from(signal: SchedulerSignal) -> Self {
        match signal {
            SchedulerSignal::NetworkDelayExceeded { delay_ms, limit_ms } => {
                Self::NetworkDelayExceeded { delay_ms, limit_ms }
            }
            SchedulerSignal::DroppingEngaged { delay_ms } => Self::DroppingEngaged { delay_ms },
            SchedulerSignal::TimestampAnomaly {
                media_type,
                previous_dts,
                dts,
            } => Self::TimestampAnomaly {
                media_type,
                previous_dts,
                dts,
            },
            SchedulerSignal::QueueOverflow { dropped } => Self::QueueOverflow { dropped },
        }
    }
}

/// What a session hands to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    /// A frame released to the decode stage
    Frame(EncodedFrame),
    /// A diagnostic
    Event(SessionEvent),
}

impl SessionOutput {
    /// The frame, if this is one
    pub fn frame(&self) -> Option<&EncodedFrame> {
        match self {
            Self::Frame(frame) => Some(frame),
            Self::Event(_) => None,
        }
    }

    /// The event, if this is one
    pub fn event(&self) -> Option<&SessionEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Frame(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_conversion() {
        let event = SessionEvent::from(SchedulerSignal::QueueOverflow { dropped: 3 });
        assert_eq!(event, SessionEvent::QueueOverflow { dropped: 3 });
        assert_eq!(event.name(), "queue_overflow");
        let output = SessionOutput::Event(event);
        assert!(output.frame().is_none());
        assert_eq!(output.event().map(SessionEvent::name), Some("queue_overflow"));
    }
}
