//! Per-media FIFO lanes merged by decode timestamp

use std::collections::VecDeque;

use rplay_codec_core::{EncodedFrame, MediaType};

/// A queued frame and its arrival index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    /// The frame
    pub frame: EncodedFrame,
    /// Position in arrival order across both lanes
    pub arrival: u64,
}

impl QueuedFrame {
    fn order_key(&self) -> (u64, u64) {
        (self.frame.dts, self.arrival)
    }
}

/// Frame queue with one lane per media type.
///
/// Each lane is released in arrival order. Between lanes the head with the
/// lower dts goes first, arrival order breaking ties.
#[derive(Debug, Default)]
pub struct FrameQueue {
    video: VecDeque<QueuedFrame>,
    audio: VecDeque<QueuedFrame>,
    next_arrival: u64,
    bytes: usize,
}

impl FrameQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame to its lane
    pub fn push(&mut self, frame: EncodedFrame) {
        self.bytes += frame.len();
        let entry = QueuedFrame {
            frame,
            arrival: self.next_arrival,
        };
        self.next_arrival += 1;
        self.lane_mut(entry.frame.media_type()).push_back(entry);
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.video.len() + self.audio.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }

    /// Total payload bytes queued
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Frames queued for one media type
    pub fn lane_len(&self, media: MediaType) -> usize {
        self.lane(media).len()
    }

    /// The frame [`FrameQueue::pop`] would return
    pub fn peek(&self) -> Option<&QueuedFrame> {
        self.head_media().and_then(|media| self.lane(media).front())
    }

    /// Remove the next frame in release order
    pub fn pop(&mut self) -> Option<QueuedFrame> {
        let media = self.head_media()?;
        let entry = self.lane_mut(media).pop_front()?;
        self.bytes -= entry.frame.len();
        Some(entry)
    }

    /// Remove every frame, in release order
    pub fn drain(&mut self) -> Vec<EncodedFrame> {
        let mut frames = Vec::with_capacity(self.len());
        while let Some(entry) = self.pop() {
            frames.push(entry.frame);
        }
        frames
    }

    /// Drop everything; returns the number of frames dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.video.clear();
        self.audio.clear();
        self.bytes = 0;
        dropped
    }

    /// Drop every frame released before the newest sync frame of `sync_media`
    /// (a keyframe for video, any frame for audio). Returns `None` when no
    /// sync frame is queued.
    pub fn trim_to_newest_sync(&mut self, sync_media: MediaType) -> Option<usize> {
        let lane = self.lane(sync_media);
        let index = lane.iter().rposition(|e| e.frame.is_keyframe)?;
        let cut = lane[index].order_key();

        let mut dropped = 0;
        for _ in 0..index {
            if let Some(entry) = self.lane_mut(sync_media).pop_front() {
                self.bytes -= entry.frame.len();
                dropped += 1;
            }
        }
        let other = match sync_media {
            MediaType::Video => MediaType::Audio,
            MediaType::Audio => MediaType::Video,
        };
        while self.lane(other).front().is_some_and(|e| e.order_key() < cut) {
            if let Some(entry) = self.lane_mut(other).pop_front() {
                self.bytes -= entry.frame.len();
                dropped += 1;
            }
        }
        Some(dropped)
    }

    /// Drop queued video frames after the newest queued video keyframe, or
    /// all queued video when there is none. Returns the number dropped.
    pub fn truncate_video_after_keyframe(&mut self) -> usize {
        let keep = self
            .video
            .iter()
            .rposition(|e| e.frame.is_keyframe)
            .map_or(0, |index| index + 1);
        let mut dropped = 0;
        while self.video.len() > keep {
            if let Some(entry) = self.video.pop_back() {
                self.bytes -= entry.frame.len();
                dropped += 1;
            }
        }
        dropped
    }

    fn head_media(&self) -> Option<MediaType> {
        match (self.video.front(), self.audio.front()) {
            (Some(v), Some(a)) if a.order_key() < v.order_key() => Some(MediaType::Audio),
            (Some(_), _) => Some(MediaType::Video),
            (None, Some(_)) => Some(MediaType::Audio),
            (None, None) => None,
        }
    }

    fn lane(&self, media: MediaType) -> &VecDeque<QueuedFrame> {
        match media {
            MediaType::Video => &self.video,
            MediaType::Audio => &self.audio,
        }
    }

    fn lane_mut(&mut self, media: MediaType) -> &mut VecDeque<QueuedFrame> {
        match media {
            MediaType::Video => &mut self.video,
            MediaType::Audio => &mut self.audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rplay_codec_core::{AudioCodec, VideoCodec};

    fn video(dts: u64, key: bool) -> EncodedFrame {
        EncodedFrame::video(VideoCodec::H264, Bytes::from(vec![0u8; 10]), dts, dts, key)
    }

    fn audio(dts: u64) -> EncodedFrame {
        EncodedFrame::audio(AudioCodec::Aac, Bytes::from(vec![0u8; 4]), dts)
    }

    fn order(queue: &mut FrameQueue) -> Vec<(bool, u64)> {
        queue.drain().iter().map(|f| (f.is_video(), f.dts)).collect()
    }

    #[test]
    fn test_merge_by_dts() {
        let mut queue = FrameQueue::new();
        queue.push(audio(0));
        queue.push(video(0, true));
        queue.push(video(40, false));
        queue.push(audio(23));
        queue.push(audio(46));
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.bytes(), 32);
        assert_eq!(
            order(&mut queue),
            vec![(false, 0), (true, 0), (false, 23), (true, 40), (false, 46)]
        );
        assert!(queue.is_empty());
        assert_eq!(queue.bytes(), 0);
    }

    #[test]
    fn test_lane_keeps_arrival_order() {
        let mut queue = FrameQueue::new();
        queue.push(video(80, false));
        queue.push(video(0, true));
        assert_eq!(order(&mut queue), vec![(true, 80), (true, 0)]);
    }

    #[test]
    fn test_trim_to_newest_keyframe() {
        let mut queue = FrameQueue::new();
        queue.push(video(0, true));
        queue.push(audio(10));
        queue.push(video(40, false));
        queue.push(video(80, true));
        queue.push(audio(70));
        queue.push(audio(90));
        queue.push(video(120, false));
        assert_eq!(queue.trim_to_newest_sync(MediaType::Video), Some(4));
        assert_eq!(order(&mut queue), vec![(true, 80), (false, 90), (true, 120)]);

        queue.push(video(160, false));
        assert_eq!(queue.trim_to_newest_sync(MediaType::Video), None);
        assert_eq!(queue.clear(), 1);
    }

    #[test]
    fn test_truncate_after_keyframe() {
        let mut queue = FrameQueue::new();
        queue.push(video(0, true));
        queue.push(video(40, false));
        queue.push(video(0, true));
        queue.push(video(40, false));
        queue.push(audio(20));
        assert_eq!(queue.truncate_video_after_keyframe(), 1);
        assert_eq!(queue.lane_len(MediaType::Video), 3);
        assert_eq!(queue.lane_len(MediaType::Audio), 1);

        let mut queue = FrameQueue::new();
        queue.push(video(40, false));
        assert_eq!(queue.truncate_video_after_keyframe(), 1);
        assert!(queue.is_empty());
    }
}
