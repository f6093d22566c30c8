use std::sync::Arc;
use std::time::Duration;

use rplay::demux_core::testing;
use rplay::media_core::ManualClock;
use rplay::prelude::*;

// Synchronous session fed from a byte buffer
#[test]
fn test_sync_session_example() -> anyhow::Result<()> {
    let config = SessionConfig::new(ContainerKind::Flv)
        .with_buffer_mode(BufferMode::Continuous)
        .with_nal_format(NalFormat::AnnexB);
    let mut session = PlaybackSession::new(config, Arc::new(ManualClock::new(0)))?;

    let mut frames = 0;
    for output in session.push(&testing::flv_av_stream(10))? {
        match output {
            SessionOutput::Frame(frame) => {
                if frame.is_video() {
                    assert!(frame.payload.starts_with(&[0, 0, 0, 1]));
                }
                frames += 1;
            }
            SessionOutput::Event(event) => println!("event: {}", event.name()),
        }
    }
    assert_eq!(frames, 11 + 18);
    assert_eq!(session.video_config().map(|c| (c.width, c.height)), Some((640, 480)));
    Ok(())
}

// Spawned session driven from async code
#[tokio::test]
async fn test_async_session_example() {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        let config = SessionConfig::new(ContainerKind::Flv).with_buffer_mode(BufferMode::Continuous);
        let (handle, mut outputs) = SessionHandle::spawn(config, Arc::new(SystemClock::new()))?;
        handle.push(testing::flv_av_stream(2)).await?;
        handle.close().await?;

        let mut video = 0;
        while let Some(output) = outputs.recv().await {
            if output.frame().is_some_and(|f| f.is_video()) {
                video += 1;
            }
        }
        anyhow::Ok(video)
    })
    .await;

    assert_eq!(result.expect("example timed out").unwrap(), 3);
}
