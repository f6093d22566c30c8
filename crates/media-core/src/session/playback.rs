//! Synchronous playback pipeline: demuxer, decryptor and scheduler

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rplay_codec_core::h26x::nal;
use rplay_codec_core::{AudioConfig, CodecId, EncodedFrame, NalFormat, VideoCodec, VideoConfig};
use rplay_demux_core::{DemuxEvent, Demuxer, DemuxerFactory, FrameSink};
use tracing::{debug, info, warn};

use super::config::{ConfigUpdate, SessionConfig};
use super::events::{SessionEvent, SessionOutput};
use crate::buffer::{Scheduler, SchedulerOutput, SchedulerStats};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::security::Decryptor;

/// Demuxer output in arrival order
#[derive(Debug)]
enum Demuxed {
    Frame(EncodedFrame),
    Event(DemuxEvent),
}

#[derive(Debug, Default)]
struct Intake {
    items: Vec<Demuxed>,
}

impl FrameSink for Intake {
    fn on_frame(&mut self, frame: EncodedFrame) {
        self.items.push(Demuxed::Frame(frame));
    }

    fn on_event(&mut self, event: DemuxEvent) {
        self.items.push(Demuxed::Event(event));
    }
}

/// One playback session.
///
/// Owns its demuxer, decryptor and scheduler; nothing is shared with other
/// sessions. Every call returns the frames and diagnostics it produced, in
/// order.
pub struct PlaybackSession {
    config: SessionConfig,
    demuxer: Box<dyn Demuxer>,
    decryptor: Decryptor,
    scheduler: Scheduler,
    abort: Arc<AtomicBool>,
    closed: bool,
    video_config: Option<Arc<VideoConfig>>,
    audio_config: Option<Arc<AudioConfig>>,
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("container", &self.demuxer.kind())
            .field("crypto", &self.decryptor.mode())
            .field("scheduler", &self.scheduler)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl PlaybackSession {
    /// Validate `config` and build the pipeline
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let demuxer = DemuxerFactory::create(config.container_kind, &config.demuxer_options())?;
        let decryptor = Decryptor::new(&config.crypto);
        let scheduler = Scheduler::new(config.scheduler_config(), clock);
        info!(
            "Playback session created: {} container, {:?} mode, buffer {} ms",
            config.container_kind, config.buffer_mode, config.video_buffer_ms
        );
        Ok(Self {
            config,
            demuxer,
            decryptor,
            scheduler,
            abort: Arc::new(AtomicBool::new(false)),
            closed: false,
            video_config: None,
            audio_config: None,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Flag that stops the session at its next push or tick
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Whether the session was closed or aborted
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current video configuration
    pub fn video_config(&self) -> Option<&Arc<VideoConfig>> {
        self.video_config.as_ref()
    }

    /// Current audio configuration
    pub fn audio_config(&self) -> Option<&Arc<AudioConfig>> {
        self.audio_config.as_ref()
    }

    /// Scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Feed transport bytes
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<SessionOutput>> {
        if self.check_abort() {
            return Ok(Vec::new());
        }
        if self.closed {
            return Err(Error::SessionClosed);
        }
        let mut intake = Intake::default();
        let fed = self.demuxer.feed(data, &mut intake);
        let mut out = Vec::new();
        self.absorb(intake, &mut out);
        fed?;
        Ok(out)
    }

    /// Periodic evaluation of the buffer
    pub fn tick(&mut self) -> Vec<SessionOutput> {
        if self.check_abort() || self.closed {
            return Vec::new();
        }
        let mut released = Vec::new();
        self.scheduler.tick(&mut released);
        let mut out = Vec::new();
        self.emit(released, &mut out);
        out
    }

    /// End of input: drain the demuxer and release everything still queued
    pub fn finish(&mut self) -> Result<Vec<SessionOutput>> {
        if self.check_abort() {
            return Ok(Vec::new());
        }
        if self.closed {
            return Err(Error::SessionClosed);
        }
        let mut intake = Intake::default();
        let flushed = self.demuxer.flush(&mut intake);
        let mut out = Vec::new();
        self.absorb(intake, &mut out);
        let mut released = Vec::new();
        self.scheduler.flush(&mut released);
        self.emit(released, &mut out);
        flushed?;
        Ok(out)
    }

    /// Drop queued frames. `full` also forgets parameter sets and
    /// configurations, so playback waits for a new configuration record.
    pub fn clear_buffer(&mut self, full: bool) -> usize {
        if self.closed {
            return 0;
        }
        let dropped = self.scheduler.clear(full);
        if full {
            self.demuxer.reset(true);
            self.video_config = None;
            self.audio_config = None;
        }
        info!("Buffer cleared: {} frames dropped (full: {})", dropped, full);
        dropped
    }

    /// Apply a live configuration change
    pub fn update_config(&mut self, update: ConfigUpdate) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        self.config.apply(&update)?;
        self.scheduler.reconfigure(self.config.scheduler_config());
        if update.clears_buffer() {
            self.scheduler.clear(false);
        }
        debug!("Configuration updated: {:?}", update);
        Ok(())
    }

    /// Stop the session and release its buffers; repeated calls do nothing
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let dropped = self.scheduler.clear(true);
        self.demuxer.reset(true);
        self.video_config = None;
        self.audio_config = None;
        info!("Playback session closed ({} queued frames discarded)", dropped);
    }

    fn check_abort(&mut self) -> bool {
        if !self.abort.load(Ordering::Acquire) {
            return false;
        }
        if !self.closed {
            warn!("Playback session aborted");
            self.close();
        }
        true
    }

    fn absorb(&mut self, intake: Intake, out: &mut Vec<SessionOutput>) {
        for item in intake.items {
            match item {
                Demuxed::Event(event) => self.on_demux_event(event, out),
                Demuxed::Frame(frame) => self.on_frame(frame, out),
            }
        }
    }

    fn on_demux_event(&mut self, event: DemuxEvent, out: &mut Vec<SessionOutput>) {
        let event = match event {
            DemuxEvent::TrackInfo(tracks) => {
                self.scheduler.set_tracks(tracks);
                SessionEvent::TracksAnnounced(tracks)
            }
            DemuxEvent::VideoConfig(config) => {
                info!("Video configured: {}", config.describe());
                self.video_config = Some(config.clone());
                SessionEvent::VideoConfigured(config)
            }
            DemuxEvent::AudioConfig(config) => {
                info!(
                    "Audio configured: {:?} {} Hz, {} channels",
                    config.codec, config.sample_rate, config.channels
                );
                self.audio_config = Some(config.clone());
                SessionEvent::AudioConfigured(config)
            }
            DemuxEvent::Metadata(metadata) => SessionEvent::Metadata(metadata),
            DemuxEvent::Warning(message) => SessionEvent::DemuxWarning(message),
        };
        out.push(SessionOutput::Event(event));
    }

    fn on_frame(&mut self, mut frame: EncodedFrame, out: &mut Vec<SessionOutput>) {
        if let Some(reason) = self.decryptor.take_misconfiguration() {
            out.push(SessionOutput::Event(SessionEvent::CryptoMisconfigured { reason }));
        }
        self.decryptor.decrypt_frame(&mut frame);
        let mut released = Vec::new();
        self.scheduler.push(frame, &mut released);
        self.emit(released, out);
    }

    fn emit(&self, released: Vec<SchedulerOutput>, out: &mut Vec<SessionOutput>) {
        for item in released {
            out.push(match item {
                SchedulerOutput::Frame(frame) => SessionOutput::Frame(self.reframe(frame)),
                SchedulerOutput::Signal(signal) => SessionOutput::Event(signal.into()),
            });
        }
    }

    /// Convert released H.264/H.265 payloads to the configured NAL framing
    fn reframe(&self, mut frame: EncodedFrame) -> EncodedFrame {
        let is_nal_video = matches!(
            frame.codec,
            CodecId::Video(VideoCodec::H264 | VideoCodec::H265)
        );
        if self.config.nal_format == NalFormat::AnnexB && is_nal_video {
            match nal::length_prefixed_to_annex_b(&frame.payload) {
                Ok(payload) => frame.payload = payload,
                Err(e) => warn!("Leaving frame at dts {} length-prefixed: {}", frame.dts, e),
            }
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferMode;
    use crate::clock::ManualClock;
    use crate::security::{CryptoConfig, CryptoMode};
    use rplay_demux_core::testing;
    use rplay_demux_core::ContainerKind;

    fn session(config: SessionConfig) -> PlaybackSession {
        PlaybackSession::new(config, Arc::new(ManualClock::new(0))).unwrap()
    }

    fn continuous() -> SessionConfig {
        SessionConfig::new(ContainerKind::Flv).with_buffer_mode(BufferMode::Continuous)
    }

    fn frames(out: &[SessionOutput]) -> Vec<&EncodedFrame> {
        out.iter().filter_map(SessionOutput::frame).collect()
    }

    fn events(out: &[SessionOutput]) -> Vec<&'static str> {
        out.iter().filter_map(SessionOutput::event).map(SessionEvent::name).collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig::default().with_playback_rate(0.0);
        assert!(PlaybackSession::new(config, Arc::new(ManualClock::new(0))).is_err());
    }

    #[test]
    fn test_configuration_events_precede_frames() {
        let mut s = session(continuous());
        let out = s.push(&testing::flv_av_stream(2)).unwrap();
        assert_eq!(
            &events(&out)[..3],
            &["tracks_announced", "audio_configured", "video_configured"]
        );
        assert!(matches!(out.last(), Some(SessionOutput::Frame(_))));
        assert_eq!(frames(&out).iter().filter(|f| f.is_video()).count(), 3);
        assert_eq!(s.video_config().map(|c| (c.width, c.height)), Some((640, 480)));
    }

    #[test]
    fn test_annex_b_output() {
        let mut s = session(continuous().with_nal_format(NalFormat::AnnexB));
        let out = s.push(&testing::flv_av_stream(1)).unwrap();
        let video: Vec<_> = frames(&out).into_iter().filter(|f| f.is_video()).collect();
        let expected = testing::annex_b(&[&testing::AVC_SPS, &testing::AVC_PPS, testing::AVC_IDR_SLICE]);
        assert_eq!(&video[0].payload[..], &expected[..]);
        assert_eq!(&video[1].payload[..], &testing::annex_b(&[testing::AVC_P_SLICE])[..]);
    }

    #[test]
    fn test_crypto_misconfiguration_reported_once() {
        let crypto = CryptoConfig {
            mode: CryptoMode::Sm4,
            key: Some(vec![1, 2, 3]),
            iv: None,
        };
        let mut s = session(continuous().with_crypto(crypto));
        let out = s.push(&testing::flv_av_stream(3)).unwrap();
        assert_eq!(
            events(&out).iter().filter(|&&name| name == "crypto_misconfigured").count(),
            1
        );
        // Frames still flow, untouched
        assert_eq!(frames(&out).iter().filter(|f| f.is_video()).count(), 4);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut s = session(SessionConfig::default());
        s.push(&testing::flv_av_stream(3)).unwrap();
        assert!(s.stats().queued_frames > 0);
        s.close();
        s.close();
        assert!(s.is_closed());
        assert_eq!(s.stats().queued_frames, 0);
        assert!(matches!(s.push(&[0]), Err(Error::SessionClosed)));
        assert!(s.tick().is_empty());
        assert!(s.update_config(ConfigUpdate::VideoBufferMs(1)).is_err());
        assert_eq!(s.clear_buffer(true), 0);
    }

    #[test]
    fn test_abort_releases_buffers() {
        let mut s = session(SessionConfig::default());
        s.push(&testing::flv_av_stream(3)).unwrap();
        let abort = s.abort_handle();
        abort.store(true, Ordering::Release);
        assert!(s.tick().is_empty());
        assert!(s.is_closed());
        assert_eq!(s.stats().queued_frames, 0);
        assert!(s.push(&testing::flv_av_stream(3)).unwrap().is_empty());
    }

    #[test]
    fn test_rate_update_clears_buffer() {
        let mut s = session(SessionConfig::default());
        s.push(&testing::flv_av_stream(3)).unwrap();
        assert!(s.stats().anchored);
        s.update_config(ConfigUpdate::VideoBufferMs(900)).unwrap();
        assert!(s.stats().queued_frames > 0);
        assert_eq!(s.config().video_buffer_ms, 900);

        s.update_config(ConfigUpdate::PlaybackRate(2.0)).unwrap();
        assert_eq!(s.stats().queued_frames, 0);
        assert!(!s.stats().anchored);
        assert!(s.update_config(ConfigUpdate::PlaybackRate(0.0)).is_err());
        assert_eq!(s.config().playback_rate, 2.0);
    }

    #[test]
    fn test_full_clear_waits_for_new_configuration() {
        let mut s = session(continuous());
        s.push(&testing::flv_av_stream(1)).unwrap();
        assert!(s.video_config().is_some());
        s.clear_buffer(true);
        assert!(s.video_config().is_none());

        // The demuxer expects a fresh container stream with its headers
        let out = s.push(&testing::flv_av_stream(1)).unwrap();
        assert!(events(&out).contains(&"video_configured"));
        assert_eq!(frames(&out).iter().filter(|f| f.is_video()).count(), 2);
    }

    #[test]
    fn test_finish_releases_queue() {
        let mut s = session(SessionConfig::default());
        let out = s.push(&testing::flv_av_stream(4)).unwrap();
        assert!(frames(&out).is_empty());
        let out = s.finish().unwrap();
        assert_eq!(frames(&out).iter().filter(|f| f.is_video()).count(), 5);
        assert_eq!(s.stats().queued_frames, 0);
    }
}
