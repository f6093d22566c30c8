//! Async session task
//!
//! A spawned session owns its [`PlaybackSession`] on a tokio task. Commands
//! arrive over a bounded channel and outputs leave over another, so the
//! consumer never shares state with the pipeline. The buffered-mode tick is a
//! `tokio::time::interval`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::config::{ConfigUpdate, SessionConfig};
use super::events::SessionOutput;
use super::playback::PlaybackSession;
use crate::clock::Clock;
use crate::error::{Error, Result};

/// Control messages for a spawned session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Transport bytes
    Push(Bytes),
    /// Drop queued frames
    ClearBuffer {
        /// Also forget stream configuration
        full: bool,
    },
    /// Live configuration change
    UpdateConfig(ConfigUpdate),
    /// End of input; release everything queued
    Finish,
    /// Stop the session
    Close,
}

/// Handle to a session running on a tokio task
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    abort: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Build a session and spawn it on the current runtime. Returns the
    /// handle and the receiver of released frames and diagnostics.
    pub fn spawn(config: SessionConfig, clock: Arc<dyn Clock>) -> Result<(Self, mpsc::Receiver<SessionOutput>)> {
        let capacity = config.channel_capacity;
        let tick = Duration::from_millis(config.tick_interval_ms);
        let session = PlaybackSession::new(config, clock)?;
        let abort = session.abort_handle();
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (output_tx, output_rx) = mpsc::channel(capacity);
        let task = tokio::spawn(run(session, command_rx, output_tx, tick));
        Ok((
            Self {
                commands: command_tx,
                abort,
                task,
            },
            output_rx,
        ))
    }

    /// Queue transport bytes
    pub async fn push(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(SessionCommand::Push(data.into())).await
    }

    /// Clear the buffer
    pub async fn clear_buffer(&self, full: bool) -> Result<()> {
        self.send(SessionCommand::ClearBuffer { full }).await
    }

    /// Change configuration while running
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<()> {
        self.send(SessionCommand::UpdateConfig(update)).await
    }

    /// Signal end of input
    pub async fn finish(&self) -> Result<()> {
        self.send(SessionCommand::Finish).await
    }

    /// Stop the session. Closing a stopped session succeeds.
    pub async fn close(&self) -> Result<()> {
        match self.send(SessionCommand::Close).await {
            Err(Error::TaskStopped) => Ok(()),
            other => other,
        }
    }

    /// Stop at the next command or tick without draining anything
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(|e| {
            warn!("Session task failed: {}", e);
            Error::TaskStopped
        })
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| Error::TaskStopped)
    }
}

async fn run(
    mut session: PlaybackSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    outputs: mpsc::Sender<SessionOutput>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let produced = tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Push(data)) => session.push(&data).unwrap_or_else(|e| {
                    warn!("Push failed: {}", e);
                    Vec::new()
                }),
                Some(SessionCommand::ClearBuffer { full }) => {
                    session.clear_buffer(full);
                    Vec::new()
                }
                Some(SessionCommand::UpdateConfig(update)) => {
                    if let Err(e) = session.update_config(update) {
                        warn!("Rejected configuration update {:?}: {}", update, e);
                    }
                    Vec::new()
                }
                Some(SessionCommand::Finish) => session.finish().unwrap_or_else(|e| {
                    warn!("Finish failed: {}", e);
                    Vec::new()
                }),
                Some(SessionCommand::Close) | None => {
                    session.close();
                    break;
                }
            },
            _ = interval.tick() => session.tick(),
        };

        for output in produced {
            if outputs.send(output).await.is_err() {
                debug!("Session output receiver dropped, closing");
                session.close();
                return;
            }
        }
        if session.is_closed() {
            break;
        }
    }
    debug!("Session task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferMode;
    use crate::clock::ManualClock;
    use rplay_demux_core::{testing, ContainerKind};

    #[tokio::test]
    async fn test_close_ends_output_stream() {
        let config = SessionConfig::new(ContainerKind::Flv).with_buffer_mode(BufferMode::Continuous);
        let (handle, mut outputs) = SessionHandle::spawn(config, Arc::new(ManualClock::new(0))).unwrap();
        handle.push(testing::flv_av_stream(5)).await.unwrap();
        handle.close().await.unwrap();

        let mut video = 0;
        while let Some(output) = outputs.recv().await {
            if output.frame().is_some_and(|f| f.is_video()) {
                video += 1;
            }
        }
        assert_eq!(video, 6);
        handle.close().await.unwrap();
        handle.join().await.unwrap();
    }

    #[test]
    fn test_spawn_rejects_invalid_config() {
        // Validation happens before anything is spawned, so no runtime is needed
        let config = SessionConfig::default().with_tick_interval(0);
        tokio_test::assert_err!(SessionHandle::spawn(config, Arc::new(ManualClock::new(0))));
    }

    #[tokio::test]
    async fn test_commands_after_stop_fail() {
        let config = SessionConfig::new(ContainerKind::Flv);
        let (handle, outputs) = SessionHandle::spawn(config, Arc::new(ManualClock::new(0))).unwrap();
        drop(outputs);
        handle.close().await.unwrap();
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        tokio_test::assert_err!(handle.push(vec![0u8; 4]).await);
        tokio_test::assert_ok!(handle.close().await);
    }
}
