//! Playback clock anchoring and delay measurement

/// Anchor pair tying stream time to local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Decode timestamp of the anchoring frame
    pub stream_ts: u64,
    /// Local clock reading when it arrived
    pub local_ms: u64,
}

/// Delay of the stream behind real time, measured against an anchor
#[derive(Debug, Clone, Default)]
pub struct PlayoutClock {
    anchor: Option<Anchor>,
    delay: Option<u64>,
    stream_ahead: bool,
}

impl PlayoutClock {
    /// Create an unanchored clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor stream time `dts` to local time `now`
    pub fn anchor(&mut self, dts: u64, now: u64) {
        self.anchor = Some(Anchor {
            stream_ts: dts,
            local_ms: now,
        });
        self.delay = Some(0);
        self.stream_ahead = false;
    }

    /// Current anchor
    pub fn anchor_point(&self) -> Option<Anchor> {
        self.anchor
    }

    /// Whether an anchor is set
    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    /// Last measured delay; `None` before anchoring
    pub fn delay(&self) -> Option<u64> {
        self.delay
    }

    /// Whether the last measured frame was ahead of real time
    pub fn stream_ahead(&self) -> bool {
        self.stream_ahead
    }

    /// Measure how far the frame stamped `dts` lags real time at `now`.
    ///
    /// Local elapsed time is scaled by `rate`. A frame ahead of real time
    /// measures as zero delay and raises the ahead flag.
    pub fn measure(&mut self, dts: u64, now: u64, rate: f64) -> Option<u64> {
        let anchor = self.anchor?;
        let local_elapsed = (now.saturating_sub(anchor.local_ms) as f64 * rate) as i64;
        let stream_elapsed = dts as i64 - anchor.stream_ts as i64;
        let delay = if local_elapsed >= stream_elapsed {
            self.stream_ahead = false;
            (local_elapsed - stream_elapsed) as u64
        } else {
            self.stream_ahead = true;
            0
        };
        self.delay = Some(delay);
        Some(delay)
    }

    /// Forget the anchor and the last measurement
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
