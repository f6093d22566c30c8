//! Session configuration and live updates

use rplay_codec_core::{NalFormat, VideoCodec};
use rplay_demux_core::{ContainerKind, DemuxerOptions};
use serde::{Deserialize, Serialize};

use crate::buffer::{BufferMode, SchedulerConfig, DEFAULT_TICK_INTERVAL_MS};
use crate::error::{Error, Result};
use crate::security::CryptoConfig;

/// Everything a playback session needs at start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Container format of the pushed bytes
    pub container_kind: ContainerKind,
    /// Target playout delay in milliseconds
    pub video_buffer_ms: u64,
    /// Extra delay tolerated before catch-up dropping
    pub video_buffer_delay_ms: u64,
    /// Playback speed multiplier
    pub playback_rate: f64,
    /// Withhold video until the first keyframe
    pub check_first_keyframe: bool,
    /// Discard GOPs that restart the timestamp sequence
    pub drop_same_timestamp_gop: bool,
    /// Release evaluation mode
    pub buffer_mode: BufferMode,
    /// Buffered-mode tick period in milliseconds
    pub tick_interval_ms: u64,
    /// NAL framing of released H.264/H.265 payloads
    pub nal_format: NalFormat,
    /// Codec of a naked flow; detected when unset
    pub naked_flow_codec: Option<VideoCodec>,
    /// Frame rate assumed for naked flow and MPEG-4 visual streams
    pub naked_flow_fps: f64,
    /// Queue bound in frames
    pub max_queued_frames: usize,
    /// Queue bound in payload bytes
    pub max_queued_bytes: usize,
    /// Frames evaluated per tick at most
    pub max_drain_per_tick: usize,
    /// Capacity of the command and output channels of a spawned session
    pub channel_capacity: usize,
    /// Payload decryption
    pub crypto: CryptoConfig,
    /// fMP4 transport descrambling key, hex encoded
    #[serde(with = "hex_key")]
    pub descrambler_key: Option<Vec<u8>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        let demux = DemuxerOptions::default();
        Self {
            container_kind: ContainerKind::default(),
            video_buffer_ms: scheduler.buffer_ms,
            video_buffer_delay_ms: scheduler.delay_margin_ms,
            playback_rate: scheduler.playback_rate,
            check_first_keyframe: scheduler.check_first_keyframe,
            drop_same_timestamp_gop: scheduler.drop_same_timestamp_gop,
            buffer_mode: scheduler.mode,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            nal_format: NalFormat::default(),
            naked_flow_codec: demux.naked_flow_codec,
            naked_flow_fps: demux.nominal_fps,
            max_queued_frames: scheduler.max_queued_frames,
            max_queued_bytes: scheduler.max_queued_bytes,
            max_drain_per_tick: scheduler.max_drain_per_tick,
            channel_capacity: 256,
            crypto: CryptoConfig::default(),
            descrambler_key: None,
        }
    }
}

impl SessionConfig {
    /// Create a configuration for `kind` with defaults elsewhere
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            container_kind: kind,
            ..Default::default()
        }
    }

    /// Set the playout delay and drop margin
    pub fn with_buffer(mut self, buffer_ms: u64, delay_margin_ms: u64) -> Self {
        self.video_buffer_ms = buffer_ms;
        self.video_buffer_delay_ms = delay_margin_ms;
        self
    }

    /// Set the playback rate
    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }

    /// Set the buffer mode
    pub fn with_buffer_mode(mut self, mode: BufferMode) -> Self {
        self.buffer_mode = mode;
        self
    }

    /// Enable or disable first-keyframe gating
    pub fn with_check_first_keyframe(mut self, enabled: bool) -> Self {
        self.check_first_keyframe = enabled;
        self
    }

    /// Enable or disable duplicate-timestamp GOP protection
    pub fn with_drop_same_timestamp_gop(mut self, enabled: bool) -> Self {
        self.drop_same_timestamp_gop = enabled;
        self
    }

    /// Set payload decryption
    pub fn with_crypto(mut self, crypto: CryptoConfig) -> Self {
        self.crypto = crypto;
        self
    }

    /// Set the NAL framing of released video
    pub fn with_nal_format(mut self, format: NalFormat) -> Self {
        self.nal_format = format;
        self
    }

    /// Set naked flow codec and frame rate
    pub fn with_naked_flow(mut self, codec: Option<VideoCodec>, fps: f64) -> Self {
        self.naked_flow_codec = codec;
        self.naked_flow_fps = fps;
        self
    }

    /// Set the queue bounds
    pub fn with_queue_limits(mut self, max_frames: usize, max_bytes: usize) -> Self {
        self.max_queued_frames = max_frames;
        self.max_queued_bytes = max_bytes;
        self
    }

    /// Set the buffered-mode tick period
    pub fn with_tick_interval(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    /// Check value ranges. Crypto material is not checked here; a bad key
    /// surfaces as a diagnostic once the session runs.
    pub fn validate(&self) -> Result<()> {
        validate_rate(self.playback_rate)?;
        if self.tick_interval_ms == 0 {
            return Err(Error::invalid_config("tick_interval_ms must be positive"));
        }
        if !self.naked_flow_fps.is_finite() || self.naked_flow_fps <= 0.0 {
            return Err(Error::invalid_config(format!(
                "naked_flow_fps must be positive, got {}",
                self.naked_flow_fps
            )));
        }
        if self.max_queued_frames == 0 || self.max_queued_bytes == 0 {
            return Err(Error::invalid_config("queue bounds must be positive"));
        }
        if self.max_drain_per_tick == 0 {
            return Err(Error::invalid_config("max_drain_per_tick must be positive"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::invalid_config("channel_capacity must be positive"));
        }
        Ok(())
    }

    /// Scheduler settings derived from this configuration
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            mode: self.buffer_mode,
            buffer_ms: self.video_buffer_ms,
            delay_margin_ms: self.video_buffer_delay_ms,
            playback_rate: self.playback_rate,
            check_first_keyframe: self.check_first_keyframe,
            drop_same_timestamp_gop: self.drop_same_timestamp_gop,
            max_queued_frames: self.max_queued_frames,
            max_queued_bytes: self.max_queued_bytes,
            max_drain_per_tick: self.max_drain_per_tick,
        }
    }

    /// Demuxer options derived from this configuration
    pub fn demuxer_options(&self) -> DemuxerOptions {
        DemuxerOptions {
            naked_flow_codec: self.naked_flow_codec,
            nominal_fps: self.naked_flow_fps,
            descrambler_key: self.descrambler_key.clone(),
        }
    }

    /// Apply a live update
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<()> {
        match *update {
            ConfigUpdate::PlaybackRate(rate) => {
                validate_rate(rate)?;
                self.playback_rate = rate;
            }
            ConfigUpdate::VideoBufferMs(ms) => self.video_buffer_ms = ms,
            ConfigUpdate::VideoBufferDelayMs(ms) => self.video_buffer_delay_ms = ms,
            ConfigUpdate::DropSameTimestampGop(enabled) => self.drop_same_timestamp_gop = enabled,
            ConfigUpdate::CheckFirstKeyframe(enabled) => self.check_first_keyframe = enabled,
        }
        Ok(())
    }
}

fn validate_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_config(format!("playback_rate must be positive, got {rate}")))
    }
}

/// Settings that can change while a session runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "key", content = "value")]
pub enum ConfigUpdate {
    /// New playback rate; clears the buffer
    PlaybackRate(f64),
    /// New playout delay
    VideoBufferMs(u64),
    /// New drop margin
    VideoBufferDelayMs(u64),
    /// Toggle duplicate-timestamp GOP protection
    DropSameTimestampGop(bool),
    /// Toggle first-keyframe gating
    CheckFirstKeyframe(bool),
}

impl ConfigUpdate {
    /// Parse a `key = value` pair as sent by a control surface
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        let value = value.trim();
        let number = |name: &str| {
            value
                .parse::<u64>()
                .map_err(|_| Error::invalid_config(format!("{name}: '{value}' is not a whole number")))
        };
        let flag = |name: &str| match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::invalid_config(format!("{name}: '{value}' is not a boolean"))),
        };
        match key.trim() {
            "playback_rate" => value
                .parse::<f64>()
                .map(Self::PlaybackRate)
                .map_err(|_| Error::invalid_config(format!("playback_rate: '{value}' is not a number"))),
            "video_buffer_ms" => number(key).map(Self::VideoBufferMs),
            "video_buffer_delay_ms" => number(key).map(Self::VideoBufferDelayMs),
            "drop_same_timestamp_gop" => flag(key).map(Self::DropSameTimestampGop),
            "check_first_keyframe" => flag(key).map(Self::CheckFirstKeyframe),
            other => Err(Error::invalid_config(format!("'{other}' cannot be updated live"))),
        }
    }

    /// Whether applying the update empties the buffer
    pub fn clears_buffer(&self) -> bool {
        matches!(self, Self::PlaybackRate(_))
    }
}

mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match key {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| hex::decode(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
