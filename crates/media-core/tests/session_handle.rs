//! Spawned sessions driven over channels

use std::sync::Arc;
use std::time::Duration;

use rplay_demux_core::{testing, ContainerKind};
use rplay_media_core::{ConfigUpdate, ManualClock, SessionConfig, SessionEvent, SessionHandle, SessionOutput};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn next_video(outputs: &mut mpsc::Receiver<SessionOutput>, count: usize) -> Vec<u64> {
    let mut dts = Vec::new();
    while dts.len() < count {
        let output = timeout(Duration::from_secs(5), outputs.recv())
            .await
            .expect("timed out waiting for frames")
            .expect("session ended early");
        if let Some(frame) = output.frame().filter(|f| f.is_video()) {
            dts.push(frame.dts);
        }
    }
    dts
}

#[tokio::test]
async fn test_tick_releases_matured_frames() {
    let clock = Arc::new(ManualClock::new(0));
    let config = SessionConfig::new(ContainerKind::Flv)
        .with_buffer(100, 5000)
        .with_tick_interval(5);
    let (handle, mut outputs) = SessionHandle::spawn(config, clock.clone()).unwrap();

    handle.push(testing::flv_av_stream(5)).await.unwrap();
    // Events leave only after the push has been processed and the clock anchored
    let first = timeout(Duration::from_secs(5), outputs.recv()).await.unwrap().unwrap();
    assert!(matches!(first, SessionOutput::Event(SessionEvent::TracksAnnounced(_))));
    clock.set(1000);
    assert_eq!(next_video(&mut outputs, 6).await, vec![0, 40, 80, 120, 160, 200]);

    handle.close().await.unwrap();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_finish_drains_immature_frames() {
    let clock = Arc::new(ManualClock::new(0));
    let config = SessionConfig::new(ContainerKind::Flv).with_buffer(10_000, 1000);
    let (handle, mut outputs) = SessionHandle::spawn(config, clock).unwrap();

    handle.push(testing::flv_av_stream(3)).await.unwrap();
    handle.finish().await.unwrap();
    assert_eq!(next_video(&mut outputs, 4).await, vec![0, 40, 80, 120]);
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_rate_update_clears_queue() {
    let clock = Arc::new(ManualClock::new(0));
    let config = SessionConfig::new(ContainerKind::Flv).with_buffer(10_000, 1000);
    let (handle, mut outputs) = SessionHandle::spawn(config, clock).unwrap();

    handle.push(testing::flv_av_stream(3)).await.unwrap();
    handle.update_config(ConfigUpdate::PlaybackRate(2.0)).await.unwrap();
    handle.finish().await.unwrap();
    handle.close().await.unwrap();

    let mut frames = 0;
    let mut events = Vec::new();
    while let Some(output) = outputs.recv().await {
        match output {
            SessionOutput::Frame(_) => frames += 1,
            SessionOutput::Event(event) => events.push(event.name()),
        }
    }
    assert_eq!(frames, 0);
    assert_eq!(events, vec!["tracks_announced", "audio_configured", "video_configured"]);
}

#[tokio::test]
async fn test_abort_stops_without_draining() {
    let clock = Arc::new(ManualClock::new(0));
    let config = SessionConfig::new(ContainerKind::Flv).with_buffer(10_000, 1000);
    let (handle, mut outputs) = SessionHandle::spawn(config, clock).unwrap();

    handle.abort();
    // Either the first tick or this push observes the abort
    let _ = handle.push(testing::flv_av_stream(3)).await;
    let remaining = timeout(Duration::from_secs(5), async {
        let mut frames = 0;
        while let Some(output) = outputs.recv().await {
            if output.frame().is_some() {
                frames += 1;
            }
        }
        frames
    })
    .await
    .unwrap();
    assert_eq!(remaining, 0);
    handle.close().await.unwrap();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let clock = Arc::new(ManualClock::new(0));
    let config = SessionConfig::new(ContainerKind::Flv).with_buffer_mode(rplay_media_core::BufferMode::Continuous);
    let (first, mut first_out) = SessionHandle::spawn(config.clone(), clock.clone()).unwrap();
    let (second, mut second_out) = SessionHandle::spawn(config, clock).unwrap();

    first.push(testing::flv_av_stream(2)).await.unwrap();
    first.close().await.unwrap();
    second.close().await.unwrap();

    let mut first_events = 0;
    while let Some(output) = first_out.recv().await {
        if matches!(output, SessionOutput::Event(SessionEvent::TracksAnnounced(_))) {
            first_events += 1;
        }
    }
    assert_eq!(first_events, 1);
    assert!(second_out.recv().await.is_none());
}
