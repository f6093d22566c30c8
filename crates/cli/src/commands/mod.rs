//! Command implementations and their shared output format

pub mod demux;
pub mod play;

use std::collections::BTreeMap;

use rplay::codec_core::EncodedFrame;
use serde::Serialize;

/// One printed frame
#[derive(Debug, Serialize)]
pub struct FrameLine {
    pub media: String,
    pub codec: String,
    pub dts: u64,
    pub pts: u64,
    pub keyframe: bool,
    pub size: usize,
    /// Local time of release, for played frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
}

impl FrameLine {
    pub fn new(frame: &EncodedFrame, at_ms: Option<u64>) -> Self {
        Self {
            media: frame.media_type().to_string(),
            codec: frame.codec.to_string(),
            dts: frame.dts,
            pts: frame.pts,
            keyframe: frame.is_keyframe,
            size: frame.len(),
            at_ms,
        }
    }

    pub fn print(&self, json: bool) {
        if json {
            if let Ok(line) = serde_json::to_string(&serde_json::json!({ "frame": self })) {
                println!("{}", line);
            }
            return;
        }
        let at = self.at_ms.map(|ms| format!("{:>7} ms  ", ms)).unwrap_or_default();
        println!(
            "{}{:<5} {:<6} dts {:>8} pts {:>8} {} {:>7} bytes",
            at,
            self.media,
            self.codec,
            self.dts,
            self.pts,
            if self.keyframe { "K" } else { " " },
            self.size
        );
    }
}

/// Print a diagnostic or configuration event
pub fn print_event(name: &str, detail: &str, json: bool) {
    if json {
        println!("{}", serde_json::json!({ "event": name, "detail": detail }));
    } else {
        println!("# {}: {}", name, detail);
    }
}

/// Totals printed after a run
#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub keyframes: u64,
    pub first_dts: Option<u64>,
    pub last_dts: Option<u64>,
    pub events: BTreeMap<String, u64>,
}

impl Summary {
    pub fn frame(&mut self, frame: &EncodedFrame) {
        if frame.is_video() {
            self.video_frames += 1;
            if frame.is_keyframe {
                self.keyframes += 1;
            }
        } else {
            self.audio_frames += 1;
        }
        self.first_dts.get_or_insert(frame.dts);
        self.last_dts = Some(frame.dts);
    }

    pub fn event(&mut self, name: &str) {
        *self.events.entry(name.to_string()).or_default() += 1;
    }

    pub fn print(&self, json: bool) {
        if json {
            println!("{}", serde_json::json!({ "summary": self }));
            return;
        }
        println!(
            "video frames: {} ({} keyframes), audio frames: {}",
            self.video_frames, self.keyframes, self.audio_frames
        );
        if let (Some(first), Some(last)) = (self.first_dts, self.last_dts) {
            println!("dts range: {} .. {} ms", first, last);
        }
        for (name, count) in &self.events {
            println!("{}: {}", name, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rplay::codec_core::{AudioCodec, VideoCodec};

    fn frames() -> Vec<EncodedFrame> {
        vec![
            EncodedFrame::video(VideoCodec::H264, vec![0u8; 10].into(), 0, 40, true),
            EncodedFrame::audio(AudioCodec::Aac, vec![0u8; 4].into(), 10),
            EncodedFrame::video(VideoCodec::H264, vec![0u8; 6].into(), 40, 80, false),
        ]
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = Summary::default();
        for frame in &frames() {
            summary.frame(frame);
        }
        summary.event("video_configured");
        summary.event("video_configured");
        assert_eq!((summary.video_frames, summary.audio_frames, summary.keyframes), (2, 1, 1));
        assert_eq!((summary.first_dts, summary.last_dts), (Some(0), Some(40)));
        assert_eq!(summary.events["video_configured"], 2);
    }

    #[test]
    fn test_frame_line_json() {
        let line = FrameLine::new(&frames()[0], Some(12));
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(value["media"], "video");
        assert_eq!(value["codec"], "H264");
        assert_eq!(value["pts"], 40);
        assert_eq!(value["at_ms"], 12);

        let value = serde_json::to_value(FrameLine::new(&frames()[1], None)).unwrap();
        assert!(value.get("at_ms").is_none());
    }
}
