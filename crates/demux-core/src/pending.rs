//! Bounded carry-over buffer

use bytes::{Buf, BytesMut};
use tracing::warn;

use crate::traits::{DemuxEvent, FrameSink};

/// Upper bound on bytes a demuxer holds while waiting for a unit to complete
pub const MAX_PENDING_BYTES: usize = 32 * 1024 * 1024;

/// Carry-over bytes plus the absolute stream offset of the first one
#[derive(Debug, Default)]
pub(crate) struct PendingBytes {
    buf: BytesMut,
    offset: u64,
}

impl PendingBytes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Discard the unparsed remainder once it exceeds [`MAX_PENDING_BYTES`].
    ///
    /// Runs after the demuxer consumed every complete unit, so only bytes of a
    /// unit still in progress count. Where the discard lands inside such an
    /// oversized unit depends on chunk boundaries. Returns whether bytes were
    /// dropped.
    pub(crate) fn enforce_bound(&mut self, container: &'static str, sink: &mut dyn FrameSink) -> bool {
        if self.buf.len() <= MAX_PENDING_BYTES {
            return false;
        }
        let dropped = self.buf.len();
        warn!(
            "{} carry-over exceeds {} bytes, discarding {} buffered bytes",
            container, MAX_PENDING_BYTES, dropped
        );
        sink.on_event(DemuxEvent::Warning(format!(
            "{container} carry-over overflow, {dropped} bytes discarded"
        )));
        self.consume(dropped);
        true
    }

    /// Drop `n` bytes from the front
    pub(crate) fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
        self.offset += n as u64;
    }

    /// Split off the first `n` bytes
    pub(crate) fn take(&mut self, n: usize) -> BytesMut {
        let n = n.min(self.buf.len());
        self.offset += n as u64;
        self.buf.split_to(n)
    }

    /// Absolute stream offset of the first held byte
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
        self.offset = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}
