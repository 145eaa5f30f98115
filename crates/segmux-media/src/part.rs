//! Parts: the unit of incremental publication inside a segment.
//!
//! A [`Part`] buffers samples while open. [`Part::finalize`] consumes it
//! and produces a [`SealedPart`], whose bytes never change afterwards and
//! can be shared freely between the owning segment, playlist logic and
//! any number of readers.

use bytes::Bytes;
use segmux_common::{duration_to_ticks, PartId, VIDEO_TIMESCALE};
use std::time::Duration;

use crate::error::EncodeError;
use crate::fmp4::boxes::{TrunSample, NON_SYNC_SAMPLE_FLAGS, SYNC_SAMPLE_FLAGS};
use crate::fmp4::{write_fragment, TrackRun};
use crate::sample::{AudioSample, VideoSample};
use crate::track::Tracks;

/// An open part accepting samples.
#[derive(Debug)]
pub struct Part {
    id: PartId,
    tracks: Tracks,
    video_samples: Vec<VideoSample>,
    audio_samples: Vec<AudioSample>,
}

impl Part {
    /// Create an empty part.
    pub fn new(id: PartId, tracks: Tracks) -> Self {
        Self {
            id,
            tracks,
            video_samples: Vec::new(),
            audio_samples: Vec::new(),
        }
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    /// Buffer a video sample. Validation happens at seal time.
    pub fn write_h264(&mut self, sample: VideoSample) {
        self.video_samples.push(sample);
    }

    /// Buffer an audio sample. Validation happens at seal time.
    pub fn write_aac(&mut self, sample: AudioSample) {
        self.audio_samples.push(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.video_samples.is_empty() && self.audio_samples.is_empty()
    }

    /// Presentation time covered by the buffered samples.
    ///
    /// Video timing is authoritative when the stream has a video track;
    /// audio-only parts measure their audio.
    pub fn duration(&self) -> Duration {
        if self.tracks.has_video() {
            self.video_samples.iter().map(VideoSample::duration).sum()
        } else {
            self.audio_samples.iter().map(AudioSample::duration).sum()
        }
    }

    /// Whether the part can be decoded without earlier parts.
    fn is_independent(&self) -> bool {
        match self.video_samples.first() {
            Some(first) => first.idr,
            None => !self.tracks.has_video(),
        }
    }

    /// Seal the part, encoding buffered samples into one fMP4 fragment.
    ///
    /// A part with no samples seals to empty content.
    pub fn finalize(self) -> Result<SealedPart, EncodeError> {
        let rendered_duration = self.duration();
        let independent = self.is_independent();

        let content = if self.is_empty() {
            Bytes::new()
        } else {
            let mut runs = Vec::with_capacity(2);
            if !self.video_samples.is_empty() {
                if !self.tracks.has_video() {
                    return Err(EncodeError::MissingTrack("video"));
                }
                runs.push(video_run(self.tracks.video_track_id(), &self.video_samples)?);
            }
            if !self.audio_samples.is_empty() {
                let audio = self
                    .tracks
                    .audio
                    .as_ref()
                    .ok_or(EncodeError::MissingTrack("audio"))?;
                runs.push(audio_run(
                    self.tracks.audio_track_id(),
                    audio.sample_rate,
                    &self.audio_samples,
                )?);
            }
            // mfhd sequence numbers are 32-bit and allowed to wrap
            let sequence = self.id.get() as u32;
            write_fragment(sequence, &runs)?
        };

        tracing::trace!(
            part = %self.id,
            bytes = content.len(),
            duration_ms = rendered_duration.as_millis() as u64,
            "sealed part"
        );

        Ok(SealedPart {
            id: self.id,
            content,
            rendered_duration,
            independent,
        })
    }
}

fn video_run(track_id: u32, samples: &[VideoSample]) -> Result<TrackRun, EncodeError> {
    let mut trun = Vec::with_capacity(samples.len());
    let mut payload = Vec::new();

    for sample in samples {
        if sample.next_dts < sample.dts {
            return Err(EncodeError::NonMonotonic {
                track: "video",
                at: sample.dts,
                next: sample.next_dts,
            });
        }

        let start = payload.len();
        for nalu in &sample.nalus {
            let len = u32::try_from(nalu.len()).map_err(|_| EncodeError::NaluTooLarge(nalu.len()))?;
            payload.extend_from_slice(&len.to_be_bytes());
            payload.extend_from_slice(nalu);
        }
        let size = payload.len() - start;

        let dts = duration_to_ticks(sample.dts, VIDEO_TIMESCALE);
        let next_dts = duration_to_ticks(sample.next_dts, VIDEO_TIMESCALE);
        let pts = duration_to_ticks(sample.pts, VIDEO_TIMESCALE);

        trun.push(TrunSample {
            duration: u32::try_from(next_dts - dts)
                .map_err(|_| EncodeError::FieldOverflow("video sample duration"))?,
            size: u32::try_from(size).map_err(|_| EncodeError::SampleTooLarge(size))?,
            flags: if sample.idr {
                SYNC_SAMPLE_FLAGS
            } else {
                NON_SYNC_SAMPLE_FLAGS
            },
            composition_time_offset: i32::try_from(pts as i64 - dts as i64)
                .map_err(|_| EncodeError::FieldOverflow("composition time offset"))?,
        });
    }

    Ok(TrackRun {
        track_id,
        base_decode_time: duration_to_ticks(samples[0].dts, VIDEO_TIMESCALE),
        samples: trun,
        payload,
    })
}

fn audio_run(
    track_id: u32,
    sample_rate: u32,
    samples: &[AudioSample],
) -> Result<TrackRun, EncodeError> {
    let mut trun = Vec::with_capacity(samples.len());
    let mut payload = Vec::with_capacity(samples.iter().map(|s| s.au.len()).sum());

    for sample in samples {
        if sample.next_pts < sample.pts {
            return Err(EncodeError::NonMonotonic {
                track: "audio",
                at: sample.pts,
                next: sample.next_pts,
            });
        }
        let pts = duration_to_ticks(sample.pts, sample_rate);
        let next_pts = duration_to_ticks(sample.next_pts, sample_rate);

        trun.push(TrunSample {
            duration: u32::try_from(next_pts - pts)
                .map_err(|_| EncodeError::FieldOverflow("audio sample duration"))?,
            size: u32::try_from(sample.au.len())
                .map_err(|_| EncodeError::SampleTooLarge(sample.au.len()))?,
            flags: SYNC_SAMPLE_FLAGS,
            composition_time_offset: 0,
        });
        payload.extend_from_slice(&sample.au);
    }

    Ok(TrackRun {
        track_id,
        base_decode_time: duration_to_ticks(samples[0].pts, sample_rate),
        samples: trun,
        payload,
    })
}

/// An immutable, encoded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPart {
    id: PartId,
    content: Bytes,
    rendered_duration: Duration,
    independent: bool,
}

impl SealedPart {
    pub fn id(&self) -> PartId {
        self.id
    }

    /// Encoded fragment bytes; empty when the part received no samples.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn rendered_duration(&self) -> Duration {
        self.rendered_duration
    }

    /// True when the part starts with an IDR frame (or carries no video),
    /// so a player can start decoding from it.
    pub fn is_independent(&self) -> bool {
        self.independent
    }

    /// Name used by playlist logic to address this part.
    pub fn name(&self) -> String {
        format!("part{}", self.id)
    }
}
