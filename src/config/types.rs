use serde::{Deserialize, Serialize};
use segmux_media::SegmenterConfig;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub muxer: MuxerConfig,

    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

impl Config {
    /// Non-fatal findings worth reporting to the operator.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let muxer = &self.muxer;
        let synthetic = &self.synthetic;

        if muxer.part_duration_ms >= muxer.segment_duration_ms {
            warnings.push(format!(
                "muxer.part_duration_ms ({}) is not shorter than muxer.segment_duration_ms ({}); segments will hold a single part",
                muxer.part_duration_ms, muxer.segment_duration_ms
            ));
        }

        if !muxer.low_latency && muxer.part_duration_ms != default_part_duration_ms() {
            warnings.push("muxer.part_duration_ms has no effect with low_latency disabled".into());
        }

        if synthetic.video && synthetic.fps > 0 {
            let gop_ms = u64::from(synthetic.gop_frames) * 1000 / u64::from(synthetic.fps);
            if gop_ms > muxer.segment_duration_ms {
                warnings.push(format!(
                    "synthetic GOP lasts {gop_ms} ms, longer than the {} ms segment target; segments will stretch to the next IDR",
                    muxer.segment_duration_ms
                ));
            }
        }

        if synthetic.frame_size as u64 > muxer.segment_max_size {
            warnings.push(format!(
                "synthetic.frame_size ({}) exceeds muxer.segment_max_size ({}); every frame will be rejected",
                synthetic.frame_size, muxer.segment_max_size
            ));
        }

        warnings
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MuxerConfig {
    /// Publish parts while segments are still being written
    #[serde(default = "default_true")]
    pub low_latency: bool,

    /// Minimum segment length; segments end on the next IDR after it
    #[serde(default = "default_segment_duration_ms")]
    pub segment_duration_ms: u64,

    /// Target part length in low-latency mode
    #[serde(default = "default_part_duration_ms")]
    pub part_duration_ms: u64,

    /// Cap on raw sample bytes per segment
    #[serde(default = "default_segment_max_size")]
    pub segment_max_size: u64,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            low_latency: true,
            segment_duration_ms: default_segment_duration_ms(),
            part_duration_ms: default_part_duration_ms(),
            segment_max_size: default_segment_max_size(),
        }
    }
}

impl MuxerConfig {
    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            low_latency: self.low_latency,
            segment_duration: Duration::from_millis(self.segment_duration_ms),
            part_duration: Duration::from_millis(self.part_duration_ms),
            segment_max_size: self.segment_max_size,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_segment_duration_ms() -> u64 {
    1000
}

fn default_part_duration_ms() -> u64 {
    200
}

fn default_segment_max_size() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_true")]
    pub video: bool,

    #[serde(default = "default_true")]
    pub audio: bool,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// AAC sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Distance between IDR frames
    #[serde(default = "default_gop_frames")]
    pub gop_frames: u32,

    /// Bytes of coded data per video frame
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            fps: default_fps(),
            sample_rate: default_sample_rate(),
            gop_frames: default_gop_frames(),
            frame_size: default_frame_size(),
            duration_secs: default_duration_secs(),
        }
    }
}

fn default_fps() -> u32 {
    30
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_gop_frames() -> u32 {
    30
}

fn default_frame_size() -> usize {
    4096
}

fn default_duration_secs() -> u64 {
    5
}
