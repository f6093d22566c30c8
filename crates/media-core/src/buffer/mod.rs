//! Playout scheduler (jitter buffer)
//!
//! Frames are queued in arrival order and released against a playback clock
//! anchored on the first qualifying frame. In [`BufferMode::Continuous`]
//! frames are evaluated as they arrive; in [`BufferMode::Buffered`] a
//! periodic tick releases frames whose delay has reached the buffer size.
//!
//! When the delay grows past the buffer size plus the margin, the scheduler
//! drops frames until a sync point that is back within bounds. The queue is
//! also bounded in frames and bytes.

pub mod playout;
pub mod queue;
pub mod stats;

use std::sync::Arc;

use rplay_codec_core::{EncodedFrame, MediaType};
use rplay_demux_core::TrackInfo;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;

pub use playout::{Anchor, PlayoutClock};
pub use queue::{FrameQueue, QueuedFrame};
pub use stats::SchedulerStats;

/// A regression larger than this (one hour of stream time) resets the clock
pub const DISCONTINUITY_THRESHOLD_MS: u64 = 3_600_000;

/// Default buffered-mode tick period
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 20;

/// When frames are evaluated for release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferMode {
    /// On every queued frame; frames leave as soon as they are in bounds
    Continuous,
    /// On a periodic tick; frames leave once their delay has matured
    #[default]
    Buffered,
}

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Evaluation mode
    pub mode: BufferMode,
    /// Target delay in milliseconds
    pub buffer_ms: u64,
    /// Extra delay tolerated before catch-up dropping starts
    pub delay_margin_ms: u64,
    /// Local time multiplier
    pub playback_rate: f64,
    /// Withhold video until a keyframe has been seen
    pub check_first_keyframe: bool,
    /// Discard GOPs that restart the timestamp sequence
    pub drop_same_timestamp_gop: bool,
    /// Queue bound in frames
    pub max_queued_frames: usize,
    /// Queue bound in payload bytes
    pub max_queued_bytes: usize,
    /// Frames evaluated per tick at most
    pub max_drain_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: BufferMode::Buffered,
            buffer_ms: 500,
            delay_margin_ms: 1000,
            playback_rate: 1.0,
            check_first_keyframe: true,
            drop_same_timestamp_gop: false,
            max_queued_frames: 1500,
            max_queued_bytes: 64 * 1024 * 1024,
            max_drain_per_tick: 300,
        }
    }
}

impl SchedulerConfig {
    /// Delay above which catch-up dropping starts
    pub fn drop_threshold_ms(&self) -> u64 {
        self.buffer_ms.saturating_add(self.delay_margin_ms)
    }
}

/// Diagnostics raised while scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerSignal {
    /// The delay passed the drop threshold
    NetworkDelayExceeded {
        /// Measured delay
        delay_ms: u64,
        /// Threshold it crossed
        limit_ms: u64,
    },
    /// Catch-up dropping started
    DroppingEngaged {
        /// Delay that triggered it
        delay_ms: u64,
    },
    /// A gross timestamp regression reset the clock
    TimestampAnomaly {
        /// Track that regressed
        media_type: MediaType,
        /// Last timestamp before the jump
        previous_dts: u64,
        /// First timestamp after it
        dts: u64,
    },
    /// The queue bound was exceeded and frames were discarded
    QueueOverflow {
        /// Frames discarded
        dropped: usize,
    },
}

/// What the scheduler hands downstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerOutput {
    /// A frame released to the decode stage
    Frame(EncodedFrame),
    /// A diagnostic
    Signal(SchedulerSignal),
}

/// Jitter buffer and playout pacing for one session
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    queue: FrameQueue,
    playout: PlayoutClock,
    tracks: TrackInfo,
    dropping: bool,
    seen_keyframe: bool,
    awaiting_keyframe: bool,
    /// Highest accepted video dts since the last GOP restart
    video_high_water: Option<u64>,
    last_dts: [Option<u64>; 2],
    stats: SchedulerStats,
}

fn media_index(media: MediaType) -> usize {
    match media {
        MediaType::Video => 0,
        MediaType::Audio => 1,
    }
}

impl Scheduler {
    /// Create an idle scheduler
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            queue: FrameQueue::new(),
            playout: PlayoutClock::new(),
            tracks: TrackInfo::default(),
            dropping: false,
            seen_keyframe: false,
            awaiting_keyframe: false,
            video_high_water: None,
            last_dts: [None; 2],
            stats: SchedulerStats::default(),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Replace the configuration; queued frames are kept
    pub fn reconfigure(&mut self, config: SchedulerConfig) {
        debug!(
            "Scheduler reconfigured: buffer {} ms, margin {} ms, rate {}",
            config.buffer_ms, config.delay_margin_ms, config.playback_rate
        );
        self.config = config;
    }

    /// Record which tracks the container announced
    pub fn set_tracks(&mut self, tracks: TrackInfo) {
        self.tracks = tracks;
    }

    /// Media type whose frames anchor the clock
    pub fn clock_media(&self) -> MediaType {
        self.tracks.clock_media()
    }

    /// Whether catch-up dropping is active
    pub fn is_dropping(&self) -> bool {
        self.dropping
    }

    /// Last measured delay
    pub fn delay(&self) -> Option<u64> {
        self.playout.delay()
    }

    /// Frames waiting for release
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Counter and state snapshot
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            delay_ms: self.playout.delay(),
            queued_frames: self.queue.len(),
            queued_bytes: self.queue.bytes(),
            anchored: self.playout.is_anchored(),
            dropping: self.dropping,
            stream_ahead: self.playout.stream_ahead(),
            ..self.stats.clone()
        }
    }

    /// Accept a demultiplexed frame
    pub fn push(&mut self, frame: EncodedFrame, out: &mut Vec<SchedulerOutput>) {
        self.stats.received += 1;
        let media = frame.media_type();
        let now = self.clock.now_ms();

        if let Some(previous) = self.last_dts[media_index(media)] {
            if previous > frame.dts && previous - frame.dts > DISCONTINUITY_THRESHOLD_MS {
                self.reset_timeline(media, previous, frame.dts, out);
            }
        }
        self.last_dts[media_index(media)] = Some(frame.dts);

        if media == MediaType::Video && !self.admit_video(&frame) {
            self.stats.dropped += 1;
            return;
        }

        if !self.playout.is_anchored() && media == self.clock_media() {
            debug!("Playback clock anchored at dts {} (local {} ms)", frame.dts, now);
            self.playout.anchor(frame.dts, now);
        }

        self.queue.push(frame);
        self.enforce_bounds(out);

        if self.config.mode == BufferMode::Continuous {
            self.evaluate(now, usize::MAX, out);
        }
    }

    /// Periodic evaluation; releases at most `max_drain_per_tick` frames
    pub fn tick(&mut self, out: &mut Vec<SchedulerOutput>) {
        let now = self.clock.now_ms();
        self.evaluate(now, self.config.max_drain_per_tick, out);
    }

    /// Release every queued frame regardless of timing (end of stream)
    pub fn flush(&mut self, out: &mut Vec<SchedulerOutput>) {
        for frame in self.queue.drain() {
            self.stats.released += 1;
            out.push(SchedulerOutput::Frame(frame));
        }
    }

    /// Empty the queue and return to idle. `full` also forgets that a
    /// keyframe was seen. Returns the number of frames discarded.
    pub fn clear(&mut self, full: bool) -> usize {
        let dropped = self.queue.clear();
        self.stats.dropped += dropped as u64;
        self.playout.reset();
        self.dropping = false;
        self.awaiting_keyframe = false;
        self.video_high_water = None;
        self.last_dts = [None; 2];
        if full {
            self.seen_keyframe = false;
        }
        debug!("Scheduler cleared ({} frames dropped, full: {})", dropped, full);
        dropped
    }

    /// Keyframe gating and duplicate-timestamp GOP protection
    fn admit_video(&mut self, frame: &EncodedFrame) -> bool {
        if frame.is_keyframe {
            self.seen_keyframe = true;
            if self.awaiting_keyframe {
                debug!("Keyframe at dts {} ends the wait", frame.dts);
                self.awaiting_keyframe = false;
                self.video_high_water = None;
            }
        } else {
            if self.awaiting_keyframe {
                trace!("Dropping video dts {} while waiting for a keyframe", frame.dts);
                return false;
            }
            if self.config.check_first_keyframe && !self.seen_keyframe {
                trace!("Dropping video dts {} before the first keyframe", frame.dts);
                return false;
            }
            if self.config.drop_same_timestamp_gop
                && self.video_high_water.is_some_and(|high| frame.dts <= high)
            {
                let dropped = self.queue.truncate_video_after_keyframe();
                warn!(
                    "Video dts {} repeats an earlier GOP, discarding {} queued frames until the next keyframe",
                    frame.dts, dropped
                );
                self.stats.dropped += dropped as u64;
                self.stats.gop_drops += 1;
                self.awaiting_keyframe = true;
                return false;
            }
        }
        self.video_high_water = Some(self.video_high_water.map_or(frame.dts, |high| high.max(frame.dts)));
        true
    }

    /// Release the old timeline and return to idle after a gross regression
    fn reset_timeline(&mut self, media: MediaType, previous: u64, dts: u64, out: &mut Vec<SchedulerOutput>) {
        warn!(
            "{:?} timestamp regressed from {} to {}, re-anchoring the playback clock",
            media, previous, dts
        );
        self.flush(out);
        self.playout.reset();
        self.dropping = false;
        self.awaiting_keyframe = false;
        self.video_high_water = None;
        self.last_dts = [None; 2];
        self.stats.discontinuities += 1;
        out.push(SchedulerOutput::Signal(SchedulerSignal::TimestampAnomaly {
            media_type: media,
            previous_dts: previous,
            dts,
        }));
    }

    fn enforce_bounds(&mut self, out: &mut Vec<SchedulerOutput>) {
        if !self.over_bounds() {
            return;
        }
        let sync_media = self.clock_media();
        let mut dropped = self.queue.trim_to_newest_sync(sync_media).unwrap_or(0);
        if self.over_bounds() {
            dropped += self.queue.clear();
            if sync_media == MediaType::Video {
                self.awaiting_keyframe = true;
            }
        }
        warn!(
            "Playout queue over its bound, dropped {} frames ({} left)",
            dropped,
            self.queue.len()
        );
        self.stats.dropped += dropped as u64;
        self.stats.overflows += 1;
        out.push(SchedulerOutput::Signal(SchedulerSignal::QueueOverflow { dropped }));
    }

    fn over_bounds(&self) -> bool {
        self.queue.len() > self.config.max_queued_frames || self.queue.bytes() > self.config.max_queued_bytes
    }

    fn is_sync_point(&self, frame: &EncodedFrame) -> bool {
        match self.clock_media() {
            MediaType::Video => frame.is_video() && frame.is_keyframe,
            MediaType::Audio => true,
        }
    }

    fn evaluate(&mut self, now: u64, budget: usize, out: &mut Vec<SchedulerOutput>) {
        let limit = self.config.drop_threshold_ms();
        let mut processed = 0;
        while processed < budget && self.playout.is_anchored() {
            let Some(head) = self.queue.peek() else {
                break;
            };
            let sync = self.is_sync_point(&head.frame);
            let Some(delay) = self.playout.measure(head.frame.dts, now, self.config.playback_rate) else {
                break;
            };

            if self.dropping {
                if sync && delay <= limit {
                    info!("Caught up at dts {} (delay {} ms), resuming playout", head.frame.dts, delay);
                    self.dropping = false;
                } else {
                    self.queue.pop();
                    self.stats.dropped += 1;
                    processed += 1;
                    continue;
                }
            } else if delay > limit {
                warn!("Delay {} ms over {} ms, dropping until the next sync point", delay, limit);
                self.dropping = true;
                self.stats.dropping_episodes += 1;
                out.push(SchedulerOutput::Signal(SchedulerSignal::NetworkDelayExceeded {
                    delay_ms: delay,
                    limit_ms: limit,
                }));
                out.push(SchedulerOutput::Signal(SchedulerSignal::DroppingEngaged { delay_ms: delay }));
                continue;
            } else if self.config.mode == BufferMode::Buffered && delay < self.config.buffer_ms {
                break;
            }

            if let Some(entry) = self.queue.pop() {
                self.stats.released += 1;
                out.push(SchedulerOutput::Frame(entry.frame));
            }
            processed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use bytes::Bytes;
    use rplay_codec_core::{AudioCodec, VideoCodec};

    fn video(dts: u64, key: bool) -> EncodedFrame {
        EncodedFrame::video(VideoCodec::H264, Bytes::from(vec![0u8; 16]), dts, dts, key)
    }

    fn audio(dts: u64) -> EncodedFrame {
        EncodedFrame::audio(AudioCodec::Aac, Bytes::from(vec![0u8; 8]), dts)
    }

    fn scheduler(mode: BufferMode) -> (Scheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = SchedulerConfig {
            mode,
            ..Default::default()
        };
        (Scheduler::new(config, clock.clone()), clock)
    }

    fn frames(out: &[SchedulerOutput]) -> Vec<(bool, u64, bool)> {
        out.iter()
            .filter_map(|o| match o {
                SchedulerOutput::Frame(f) => Some((f.is_video(), f.dts, f.is_keyframe)),
                SchedulerOutput::Signal(_) => None,
            })
            .collect()
    }

    fn signals(out: &[SchedulerOutput]) -> Vec<&SchedulerSignal> {
        out.iter()
            .filter_map(|o| match o {
                SchedulerOutput::Signal(s) => Some(s),
                SchedulerOutput::Frame(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_continuous_releases_immediately() {
        let (mut s, clock) = scheduler(BufferMode::Continuous);
        let mut out = Vec::new();
        s.push(video(0, true), &mut out);
        clock.advance(40);
        s.push(video(40, false), &mut out);
        s.push(video(80, false), &mut out);
        assert_eq!(frames(&out), vec![(true, 0, true), (true, 40, false), (true, 80, false)]);
        assert_eq!(s.delay(), Some(0));
        assert!(s.stats().stream_ahead);
        assert_eq!(s.queued(), 0);
    }

    #[test]
    fn test_buffered_waits_for_maturity() {
        let (mut s, clock) = scheduler(BufferMode::Buffered);
        let mut out = Vec::new();
        for n in 0..5 {
            s.push(video(n * 40, n == 0), &mut out);
        }
        s.tick(&mut out);
        assert!(out.is_empty());

        clock.set(499);
        s.tick(&mut out);
        assert!(out.is_empty());

        clock.set(500);
        s.tick(&mut out);
        assert_eq!(frames(&out), vec![(true, 0, true)]);

        clock.set(580);
        s.tick(&mut out);
        assert_eq!(frames(&out).len(), 3);
        // The last measurement is the immature head
        assert_eq!(s.delay(), Some(460));
        assert_eq!(s.queued(), 2);
    }

    #[test]
    fn test_first_keyframe_gate() {
        let (mut s, _clock) = scheduler(BufferMode::Continuous);
        let mut out = Vec::new();
        s.push(audio(0), &mut out);
        s.push(video(0, false), &mut out);
        assert!(out.is_empty());
        assert!(!s.stats().anchored);
        assert_eq!(s.stats().dropped, 1);

        s.push(video(40, true), &mut out);
        assert_eq!(frames(&out), vec![(false, 0, true), (true, 40, true)]);
    }

    #[test]
    fn test_gate_disabled_anchors_on_any_video() {
        let clock = Arc::new(ManualClock::new(0));
        let config = SchedulerConfig {
            mode: BufferMode::Continuous,
            check_first_keyframe: false,
            ..Default::default()
        };
        let mut s = Scheduler::new(config, clock);
        let mut out = Vec::new();
        s.push(video(0, false), &mut out);
        assert_eq!(frames(&out), vec![(true, 0, false)]);
    }

    #[test]
    fn test_audio_only_stream_anchors_on_audio() {
        let (mut s, _clock) = scheduler(BufferMode::Continuous);
        s.set_tracks(TrackInfo {
            has_audio: true,
            has_video: false,
        });
        assert_eq!(s.clock_media(), MediaType::Audio);
        let mut out = Vec::new();
        s.push(audio(0), &mut out);
        s.push(audio(23), &mut out);
        assert_eq!(frames(&out).len(), 2);
    }

    #[test]
    fn test_dropping_resumes_on_keyframe_within_bounds() {
        let (mut s, clock) = scheduler(BufferMode::Buffered);
        let mut out = Vec::new();
        s.push(video(0, true), &mut out);
        clock.set(10_000);
        for dts in (40..=9_400).step_by(40) {
            s.push(video(dts, dts == 9_000), &mut out);
        }
        s.reconfigure(SchedulerConfig {
            max_drain_per_tick: 1000,
            ..s.config().clone()
        });
        s.tick(&mut out);

        assert_eq!(
            signals(&out),
            vec![
                &SchedulerSignal::NetworkDelayExceeded {
                    delay_ms: 10_000,
                    limit_ms: 1_500
                },
                &SchedulerSignal::DroppingEngaged { delay_ms: 10_000 },
            ]
        );
        let released = frames(&out);
        assert_eq!(released[0], (true, 9_000, true));
        assert_eq!(released.len(), 11);
        assert!(!s.is_dropping());
        assert_eq!(s.stats().dropped, 225);
        assert_eq!(s.stats().dropping_episodes, 1);
    }

    #[test]
    fn test_dropping_continues_without_sync_point() {
        let (mut s, clock) = scheduler(BufferMode::Continuous);
        let mut out = Vec::new();
        s.push(video(0, true), &mut out);
        clock.set(5_000);
        s.push(video(40, false), &mut out);
        assert!(s.is_dropping());
        s.push(audio(60), &mut out);
        s.push(video(80, false), &mut out);
        // A keyframe that is still too late does not end the episode
        s.push(video(120, true), &mut out);
        assert!(s.is_dropping());
        s.push(video(4_000, true), &mut out);
        assert!(!s.is_dropping());
        assert_eq!(frames(&out), vec![(true, 0, true), (true, 4_000, true)]);
        assert_eq!(s.stats().dropped, 4);
    }

    #[test]
    fn test_gop_duplicate_timestamps() {
        let clock = Arc::new(ManualClock::new(0));
        let config = SchedulerConfig {
            mode: BufferMode::Continuous,
            drop_same_timestamp_gop: true,
            ..Default::default()
        };
        let mut s = Scheduler::new(config, clock.clone());
        let mut out = Vec::new();
        for gop in [[0u64, 40, 80], [0, 40, 80], [120, 160, 200]] {
            for (i, dts) in gop.into_iter().enumerate() {
                clock.advance(40);
                s.push(video(dts, i == 0), &mut out);
            }
        }
        assert_eq!(
            frames(&out).iter().map(|f| f.1).collect::<Vec<_>>(),
            vec![0, 40, 80, 0, 120, 160, 200]
        );
        assert_eq!(s.stats().gop_drops, 1);
        assert_eq!(s.stats().dropped, 2);
    }

    #[test]
    fn test_gop_protection_is_opt_in() {
        let (mut s, clock) = scheduler(BufferMode::Continuous);
        let mut out = Vec::new();
        for gop in [[0u64, 40, 80], [0, 40, 80]] {
            for (i, dts) in gop.into_iter().enumerate() {
                clock.advance(40);
                s.push(video(dts, i == 0), &mut out);
            }
        }
        assert_eq!(frames(&out).len(), 6);
    }

    #[test]
    fn test_gross_regression_resets_clock() {
        let (mut s, clock) = scheduler(BufferMode::Buffered);
        let mut out = Vec::new();
        s.push(video(4_000_000, true), &mut out);
        s.push(video(4_000_040, false), &mut out);
        clock.set(100);
        s.push(video(0, true), &mut out);

        assert_eq!(frames(&out), vec![(true, 4_000_000, true), (true, 4_000_040, false)]);
        assert_eq!(
            signals(&out),
            vec![&SchedulerSignal::TimestampAnomaly {
                media_type: MediaType::Video,
                previous_dts: 4_000_040,
                dts: 0
            }]
        );
        let stats = s.stats();
        assert_eq!(stats.discontinuities, 1);
        assert!(stats.anchored);
        assert_eq!(stats.queued_frames, 1);

        // Small regressions are not anomalies
        s.push(video(3_000, false), &mut out);
        s.push(video(2_000, false), &mut out);
        assert_eq!(s.stats().discontinuities, 1);
    }

    #[test]
    fn test_overflow_trims_to_newest_keyframe() {
        let clock = Arc::new(ManualClock::new(0));
        let config = SchedulerConfig {
            max_queued_frames: 10,
            ..Default::default()
        };
        let mut s = Scheduler::new(config, clock);
        let mut out = Vec::new();
        for n in 0..11u64 {
            s.push(video(n * 40, n == 0 || n == 6), &mut out);
        }
        assert_eq!(signals(&out), vec![&SchedulerSignal::QueueOverflow { dropped: 6 }]);
        assert_eq!(s.queued(), 5);
        assert_eq!(s.stats().overflows, 1);
    }

    #[test]
    fn test_overflow_without_keyframe_waits() {
        let clock = Arc::new(ManualClock::new(0));
        let config = SchedulerConfig {
            max_queued_frames: 10,
            ..Default::default()
        };
        let mut s = Scheduler::new(config, clock);
        let mut out = Vec::new();
        for n in 0..11u64 {
            s.push(video(n * 40, n == 0), &mut out);
        }
        assert_eq!(signals(&out), vec![&SchedulerSignal::QueueOverflow { dropped: 11 }]);
        assert_eq!(s.queued(), 0);

        s.push(video(440, false), &mut out);
        assert_eq!(s.queued(), 0);
        s.push(video(480, true), &mut out);
        assert_eq!(s.queued(), 1);
    }

    #[test]
    fn test_byte_bound() {
        let clock = Arc::new(ManualClock::new(0));
        let config = SchedulerConfig {
            max_queued_bytes: 40,
            ..Default::default()
        };
        let mut s = Scheduler::new(config, clock);
        let mut out = Vec::new();
        s.push(video(0, true), &mut out);
        s.push(video(40, false), &mut out);
        s.push(video(80, true), &mut out);
        assert_eq!(signals(&out), vec![&SchedulerSignal::QueueOverflow { dropped: 2 }]);
        assert_eq!(s.stats().queued_bytes, 16);
    }

    #[test]
    fn test_clear_returns_to_idle() {
        let (mut s, clock) = scheduler(BufferMode::Buffered);
        let mut out = Vec::new();
        s.push(video(0, true), &mut out);
        s.push(video(40, false), &mut out);
        assert_eq!(s.clear(false), 2);
        let stats = s.stats();
        assert!(!stats.anchored);
        assert_eq!(stats.delay_ms, None);
        assert_eq!(stats.queued_frames, 0);

        // A keyframe was seen before the partial clear
        clock.set(1000);
        s.push(video(80, false), &mut out);
        assert!(s.stats().anchored);

        s.clear(true);
        s.push(video(120, false), &mut out);
        assert!(!s.stats().anchored);
    }

    #[test]
    fn test_flush_releases_everything() {
        let (mut s, _clock) = scheduler(BufferMode::Buffered);
        let mut out = Vec::new();
        s.push(video(0, true), &mut out);
        s.push(audio(10), &mut out);
        s.push(video(40, false), &mut out);
        s.flush(&mut out);
        assert_eq!(
            frames(&out),
            vec![(true, 0, true), (false, 10, true), (true, 40, false)]
        );
        assert_eq!(s.stats().released, 3);
    }

    #[test]
    fn test_tick_drain_is_bounded() {
        let clock = Arc::new(ManualClock::new(0));
        let config = SchedulerConfig {
            max_drain_per_tick: 3,
            ..Default::default()
        };
        let mut s = Scheduler::new(config, clock.clone());
        let mut out = Vec::new();
        for n in 0..10u64 {
            s.push(video(n * 10, n == 0), &mut out);
        }
        clock.set(1_000);
        s.tick(&mut out);
        assert_eq!(frames(&out).len(), 3);
        s.tick(&mut out);
        assert_eq!(frames(&out).len(), 6);
    }
}
