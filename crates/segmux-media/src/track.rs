//! Track parameters shared by every part of a stream.

use bytes::Bytes;
use std::sync::Arc;

/// H.264 track parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrack {
    pub sps: Bytes,
    pub pps: Bytes,
    pub width: u16,
    pub height: u16,
}

/// AAC track parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub sample_rate: u32,
    pub channels: u16,
    /// MPEG-4 AudioSpecificConfig.
    pub config: Bytes,
}

/// Sampling frequencies addressable by a 4-bit AudioSpecificConfig index.
const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

impl AudioTrack {
    /// AAC-LC track with a generated AudioSpecificConfig.
    ///
    /// Returns `None` when the sample rate has no frequency index or the
    /// channel count does not fit a channel configuration.
    pub fn aac_lc(sample_rate: u32, channels: u16) -> Option<Self> {
        let freq_index = AAC_SAMPLE_RATES.iter().position(|&r| r == sample_rate)? as u16;
        if channels == 0 || channels > 7 {
            return None;
        }
        // object type (5) | frequency index (4) | channel config (4) | 3 zero bits
        let asc: u16 = (2 << 11) | (freq_index << 7) | (channels << 3);
        Some(Self {
            sample_rate,
            channels,
            config: Bytes::copy_from_slice(&asc.to_be_bytes()),
        })
    }
}

/// The set of tracks carried by a stream.
///
/// A stream without a video track is audio-only, which changes how parts
/// are cut and how segment durations are computed.
#[derive(Debug, Clone, Default)]
pub struct Tracks {
    pub video: Option<Arc<VideoTrack>>,
    pub audio: Option<Arc<AudioTrack>>,
}

impl Tracks {
    pub fn new(video: Option<VideoTrack>, audio: Option<AudioTrack>) -> Self {
        Self {
            video: video.map(Arc::new),
            audio: audio.map(Arc::new),
        }
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }

    /// fMP4 track id of the video track.
    pub(crate) fn video_track_id(&self) -> u32 {
        1
    }

    /// fMP4 track id of the audio track; it follows video when both exist.
    pub(crate) fn audio_track_id(&self) -> u32 {
        if self.has_video() {
            2
        } else {
            1
        }
    }
}
