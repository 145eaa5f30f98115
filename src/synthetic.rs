//! Deterministic test-pattern source.
//!
//! Produces H.264-shaped access units and AAC frames with plausible timing
//! so the segmenter can be driven without a camera or encoder. The payload
//! bytes are filler; only sizes, timestamps and IDR placement matter.

use bytes::Bytes;
use segmux_common::ticks_to_duration;
use segmux_media::{AudioSample, AudioTrack, Tracks, VideoSample, VideoTrack};
use std::time::Duration;

use crate::config::SyntheticConfig;

/// Samples per AAC-LC frame.
pub const AAC_FRAME_SAMPLES: u64 = 1024;

/// Bytes per synthetic AAC access unit.
const AAC_FRAME_BYTES: usize = 256;

// Baseline profile, level 3.1.
const SPS: &[u8] = &[0x67, 0x42, 0xc0, 0x1f, 0xda, 0x01, 0x40, 0x16, 0xe8, 0x40];
const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];

/// One sample in decode order.
#[derive(Debug, Clone)]
pub enum SyntheticSample {
    Video(VideoSample),
    Audio(AudioSample),
}

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    config: SyntheticConfig,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    /// Track parameters for the enabled elementary streams.
    pub fn tracks(&self) -> Tracks {
        let video = self.config.video.then(|| VideoTrack {
            sps: Bytes::from_static(SPS),
            pps: Bytes::from_static(PPS),
            width: 1280,
            height: 720,
        });
        let audio = if self.config.audio {
            AudioTrack::aac_lc(self.config.sample_rate, 2)
        } else {
            None
        };
        Tracks::new(video, audio)
    }

    /// Every sample of the configured duration, video and audio interleaved
    /// by timestamp.
    pub fn samples(&self) -> Samples {
        let total = Duration::from_secs(self.config.duration_secs);
        let video_frames = if self.config.video && self.config.fps > 0 {
            self.config.duration_secs * u64::from(self.config.fps)
        } else {
            0
        };
        Samples {
            config: self.config.clone(),
            total,
            video_frames,
            next_video: 0,
            next_audio: 0,
        }
    }
}

/// Iterator returned by [`SyntheticSource::samples`].
#[derive(Debug)]
pub struct Samples {
    config: SyntheticConfig,
    total: Duration,
    video_frames: u64,
    next_video: u64,
    next_audio: u64,
}

impl Samples {
    fn frame_dts(&self, index: u64) -> Duration {
        Duration::from_nanos(index * 1_000_000_000 / u64::from(self.config.fps))
    }

    fn audio_pts(&self, index: u64) -> Duration {
        ticks_to_duration(index * AAC_FRAME_SAMPLES, self.config.sample_rate)
    }

    fn pending_video(&self) -> Option<Duration> {
        (self.next_video < self.video_frames).then(|| self.frame_dts(self.next_video))
    }

    fn pending_audio(&self) -> Option<Duration> {
        if !self.config.audio {
            return None;
        }
        let pts = self.audio_pts(self.next_audio);
        (pts < self.total).then_some(pts)
    }

    fn video_sample(&mut self) -> VideoSample {
        let index = self.next_video;
        self.next_video += 1;

        let dts = self.frame_dts(index);
        let idr = index % u64::from(self.config.gop_frames.max(1)) == 0;
        // nal_unit_type 5 (IDR) or 1 (non-IDR), nal_ref_idc 3
        let header = if idr { 0x65 } else { 0x41 };
        let mut nalu = vec![index as u8; self.config.frame_size];
        if let Some(first) = nalu.first_mut() {
            *first = header;
        }

        VideoSample {
            pts: dts,
            dts,
            next_dts: self.frame_dts(index + 1),
            idr,
            nalus: vec![Bytes::from(nalu)],
        }
    }

    fn audio_sample(&mut self) -> AudioSample {
        let index = self.next_audio;
        self.next_audio += 1;

        AudioSample {
            pts: self.audio_pts(index),
            next_pts: self.audio_pts(index + 1),
            au: Bytes::from(vec![0x21; AAC_FRAME_BYTES]),
        }
    }
}

impl Iterator for Samples {
    type Item = SyntheticSample;

    fn next(&mut self) -> Option<Self::Item> {
        match (self.pending_video(), self.pending_audio()) {
            (Some(v), Some(a)) if a < v => Some(SyntheticSample::Audio(self.audio_sample())),
            (Some(_), _) => Some(SyntheticSample::Video(self.video_sample())),
            (None, Some(_)) => Some(SyntheticSample::Audio(self.audio_sample())),
            (None, None) => None,
        }
    }
}
