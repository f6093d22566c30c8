//! Timing invariants of the playout scheduler

use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;
use rplay_codec_core::{EncodedFrame, VideoCodec};
use rplay_media_core::{BufferMode, Clock, ManualClock, Scheduler, SchedulerConfig, SchedulerOutput};

const FRAME_MS: u64 = 40;

fn video(dts: u64, key: bool) -> EncodedFrame {
    EncodedFrame::video(VideoCodec::H264, Bytes::from_static(&[0, 0, 0, 1, 0x65]), dts, dts, key)
}

fn continuous(margin: u64) -> SchedulerConfig {
    SchedulerConfig {
        mode: BufferMode::Continuous,
        buffer_ms: 0,
        delay_margin_ms: margin,
        ..Default::default()
    }
}

fn released(out: &[SchedulerOutput]) -> Vec<&EncodedFrame> {
    out.iter()
        .filter_map(|o| match o {
            SchedulerOutput::Frame(f) => Some(f),
            SchedulerOutput::Signal(_) => None,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn delay_tracks_local_minus_stream_elapsed(gaps in proptest::collection::vec(0u64..120, 1..60)) {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut scheduler = Scheduler::new(continuous(u64::MAX / 4), clock.clone());
        let mut last_released = None;

        for (i, gap) in gaps.iter().enumerate() {
            clock.advance(*gap);
            let dts = i as u64 * FRAME_MS;
            let mut out = Vec::new();
            scheduler.push(video(dts, true), &mut out);

            let local = clock.now_ms() as i64 - (1_000 + gaps[0] as i64);
            let stream = dts as i64;
            let stats = scheduler.stats();
            prop_assert_eq!(stats.delay_ms, Some((local - stream).max(0) as u64));
            prop_assert_eq!(stats.stream_ahead, local < stream);

            let frames = released(&out);
            prop_assert_eq!(frames.len(), 1);
            if let Some(previous) = last_released {
                prop_assert!(frames[0].dts > previous);
            }
            last_released = Some(frames[0].dts);
        }
        prop_assert_eq!(scheduler.queued(), 0);
    }

    #[test]
    fn dropping_releases_only_in_bounds_and_resumes_on_keyframes(
        frames in proptest::collection::vec((0u64..150, proptest::bool::weighted(0.2)), 1..80),
    ) {
        const MARGIN: u64 = 200;
        let clock = Arc::new(ManualClock::new(0));
        let mut scheduler = Scheduler::new(continuous(MARGIN), clock.clone());
        let mut anchor_local = None;
        let mut previous_dropped = false;

        for (i, (gap, key)) in frames.iter().enumerate() {
            clock.advance(*gap);
            let key = i == 0 || *key;
            let dts = i as u64 * FRAME_MS;
            let now = clock.now_ms();
            let anchor = *anchor_local.get_or_insert(now);

            let mut out = Vec::new();
            scheduler.push(video(dts, key), &mut out);
            let frames = released(&out);
            prop_assert!(frames.len() <= 1);

            if let Some(frame) = frames.first() {
                let delay = (now - anchor).saturating_sub(frame.dts);
                prop_assert!(delay <= MARGIN, "dts {} released {} ms late", frame.dts, delay);
                if previous_dropped {
                    prop_assert!(frame.is_keyframe, "resumed on a predicted frame at dts {}", frame.dts);
                }
                previous_dropped = false;
            } else {
                previous_dropped = true;
            }
        }

        let stats = scheduler.stats();
        prop_assert_eq!(stats.released + stats.dropped, stats.received);
        prop_assert_eq!(scheduler.queued(), 0);
    }
}

#[test]
fn test_stall_then_burst() {
    let clock = Arc::new(ManualClock::new(0));
    let mut scheduler = Scheduler::new(continuous(300), clock.clone());
    let mut out = Vec::new();

    for n in 0..5 {
        scheduler.push(video(n * FRAME_MS, n == 0), &mut out);
        clock.advance(FRAME_MS);
    }
    assert_eq!(released(&out).len(), 5);
    out.clear();

    // One second of silence, then the late GOP tail and a fresh GOP arrive together
    clock.advance(1000);
    for n in 5..40 {
        scheduler.push(video(n * FRAME_MS, n % 25 == 0), &mut out);
    }
    let frames = released(&out);
    // Local time is 1200 ms; the keyframe at 1000 is 200 ms late
    assert_eq!(frames.first().map(|f| (f.dts, f.is_keyframe)), Some((1000, true)));
    assert_eq!(frames.len(), 15);
    assert_eq!(scheduler.stats().dropping_episodes, 1);
    assert!(!scheduler.is_dropping());
}
