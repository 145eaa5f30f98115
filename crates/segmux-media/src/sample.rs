//! Timestamped elementary-stream samples.

use bytes::Bytes;
use std::time::Duration;

/// One H.264 access unit, split into NAL units without start codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSample {
    /// Presentation timestamp.
    pub pts: Duration,
    /// Decoding timestamp.
    pub dts: Duration,
    /// Decoding timestamp of the sample that follows this one.
    pub next_dts: Duration,
    /// Whether the access unit contains an IDR slice.
    pub idr: bool,
    /// Coded picture data.
    pub nalus: Vec<Bytes>,
}

impl VideoSample {
    /// Raw payload size: the sum of NAL unit lengths.
    pub fn byte_size(&self) -> u64 {
        self.nalus.iter().map(|n| n.len() as u64).sum()
    }

    /// Time until the next sample, zero if timestamps go backwards.
    pub fn duration(&self) -> Duration {
        self.next_dts.saturating_sub(self.dts)
    }
}

/// One AAC access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSample {
    /// Presentation timestamp.
    pub pts: Duration,
    /// Presentation timestamp of the sample that follows this one.
    pub next_pts: Duration,
    /// Raw access unit, without ADTS header.
    pub au: Bytes,
}

impl AudioSample {
    pub fn byte_size(&self) -> u64 {
        self.au.len() as u64
    }

    pub fn duration(&self) -> Duration {
        self.next_pts.saturating_sub(self.pts)
    }
}
