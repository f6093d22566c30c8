//! Scheduler statistics

use serde::Serialize;

/// Snapshot of scheduler counters and state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Frames handed to the scheduler
    pub received: u64,
    /// Frames released to the decode stage
    pub released: u64,
    /// Frames discarded for any reason
    pub dropped: u64,
    /// Last measured delay in milliseconds
    pub delay_ms: Option<u64>,
    /// Frames waiting in the queue
    pub queued_frames: usize,
    /// Payload bytes waiting in the queue
    pub queued_bytes: usize,
    /// Whether the clock is anchored
    pub anchored: bool,
    /// Catch-up dropping is active
    pub dropping: bool,
    /// The stream runs ahead of real time
    pub stream_ahead: bool,
    /// Times catch-up dropping was engaged
    pub dropping_episodes: u64,
    /// Gross timestamp regressions seen
    pub discontinuities: u64,
    /// Duplicate-timestamp GOPs discarded
    pub gop_drops: u64,
    /// Queue bound violations
    pub overflows: u64,
}
