//! Segments: ordered groups of parts with a byte budget.
//!
//! A [`Segment`] is created open with one empty current part. Every
//! accepted sample is charged against the segment's byte budget and
//! forwarded to the current part; in low-latency mode the part is sealed
//! and published as soon as it covers the adjusted part duration.
//! [`Segment::finalize`] seals the last part, closes the segment and fixes
//! its rendered duration.

use chrono::{DateTime, Utc};
use segmux_common::{PartIdAllocator, SegmentId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::part::{Part, SealedPart};
use crate::parts_reader::PartsReader;
use crate::sample::{AudioSample, VideoSample};
use crate::sink::PartSink;
use crate::track::Tracks;

/// Per-segment settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Publish parts while the segment is still open.
    pub low_latency: bool,
    /// Cap on the sum of raw sample payload bytes (container overhead is
    /// not counted).
    pub max_size: u64,
}

/// What a segment needs while it accepts samples. Dropped on close so a
/// finished segment holds no reference to its sink.
struct Open {
    part: Part,
    ids: Arc<dyn PartIdAllocator>,
    sink: Arc<dyn PartSink>,
}

enum State {
    Open(Open),
    Closed,
}

pub struct Segment {
    id: SegmentId,
    start_time: DateTime<Utc>,
    start_dts: Duration,
    config: SegmentConfig,
    tracks: Tracks,

    size: u64,
    parts: Vec<Arc<SealedPart>>,
    state: State,
    rendered_duration: Duration,
}

impl Segment {
    /// Open a segment with a single empty part.
    pub fn new(
        id: SegmentId,
        start_time: DateTime<Utc>,
        start_dts: Duration,
        config: SegmentConfig,
        tracks: Tracks,
        ids: Arc<dyn PartIdAllocator>,
        sink: Arc<dyn PartSink>,
    ) -> Self {
        let first_part = Part::new(ids.next_part_id(), tracks.clone());
        Self {
            id,
            start_time,
            start_dts,
            config,
            tracks,
            size: 0,
            parts: Vec::new(),
            state: State::Open(Open {
                part: first_part,
                ids,
                sink,
            }),
            rendered_duration: Duration::ZERO,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Name used by playlist logic, e.g. `seg12`.
    pub fn name(&self) -> String {
        self.id.name()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn start_dts(&self) -> Duration {
        self.start_dts
    }

    /// Raw payload bytes accepted so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn max_size(&self) -> u64 {
        self.config.max_size
    }

    /// Sealed parts in temporal order.
    pub fn parts(&self) -> &[Arc<SealedPart>] {
        &self.parts
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    pub fn has_video(&self) -> bool {
        self.tracks.has_video()
    }

    /// Duration buffered in the open part, zero once closed.
    pub fn current_part_duration(&self) -> Duration {
        match &self.state {
            State::Open(open) => open.part.duration(),
            State::Closed => Duration::ZERO,
        }
    }

    /// Duration fixed by [`Segment::finalize`]; zero before that.
    pub fn rendered_duration(&self) -> Duration {
        self.rendered_duration
    }

    /// Reader over the parts sealed so far. The open part is not included.
    pub fn reader(&self) -> PartsReader {
        PartsReader::new(self.parts.clone())
    }

    /// Accept a video sample.
    ///
    /// Fails with [`Error::CapacityExceeded`] without touching any state if
    /// the sample does not fit the byte budget, and with
    /// [`Error::MissingTrack`] if the segment has no video track.
    pub fn write_video_sample(
        &mut self,
        sample: VideoSample,
        adjusted_part_duration: Duration,
    ) -> Result<()> {
        if !self.tracks.has_video() {
            return Err(Error::MissingTrack("video"));
        }
        let sample_size = sample.byte_size();
        let part = self.reserve(sample_size)?;
        part.write_h264(sample);

        if self.config.low_latency && self.current_part_duration() >= adjusted_part_duration {
            self.switch_part()?;
        }
        Ok(())
    }

    /// Accept an audio sample.
    ///
    /// Audio only cuts parts when the stream has no video track; otherwise
    /// video frame timing decides part boundaries. Fails with
    /// [`Error::MissingTrack`] if the segment has no audio track.
    pub fn write_audio_sample(
        &mut self,
        sample: AudioSample,
        adjusted_part_duration: Duration,
    ) -> Result<()> {
        if !self.tracks.has_audio() {
            return Err(Error::MissingTrack("audio"));
        }
        let sample_size = sample.byte_size();
        let part = self.reserve(sample_size)?;
        part.write_aac(sample);

        if self.config.low_latency
            && !self.tracks.has_video()
            && self.current_part_duration() >= adjusted_part_duration
        {
            self.switch_part()?;
        }
        Ok(())
    }

    /// Charge `sample_size` bytes against the budget and return the open
    /// part. Nothing is mutated when the check fails.
    fn reserve(&mut self, sample_size: u64) -> Result<&mut Part> {
        let State::Open(open) = &mut self.state else {
            return Err(Error::InvalidState("write to a finalized segment"));
        };

        match self.size.checked_add(sample_size) {
            Some(total) if total <= self.config.max_size => {
                self.size = total;
                Ok(&mut open.part)
            }
            _ => {
                tracing::warn!(
                    segment = %self.id,
                    size = self.size,
                    sample_size,
                    max_size = self.config.max_size,
                    "segment size limit reached"
                );
                Err(Error::CapacityExceeded {
                    size: self.size,
                    sample_size,
                    max_size: self.config.max_size,
                })
            }
        }
    }

    /// Move the open state out, leaving the segment closed.
    fn take_open(&mut self) -> Result<Open> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(open) => Ok(open),
            State::Closed => Err(Error::InvalidState("segment is already finalized")),
        }
    }

    fn switch_part(&mut self) -> Result<()> {
        let Open { part, ids, sink } = self.take_open()?;
        let sealed = seal(part)?;

        tracing::debug!(
            segment = %self.id,
            part = %sealed.id(),
            bytes = sealed.content().len(),
            duration_ms = sealed.rendered_duration().as_millis() as u64,
            "part switch"
        );

        self.parts.push(Arc::clone(&sealed));
        sink.part_finalized(&sealed);

        let part = Part::new(ids.next_part_id(), self.tracks.clone());
        self.state = State::Open(Open { part, ids, sink });
        Ok(())
    }

    /// Seal the last part and close the segment.
    ///
    /// With a video track the rendered duration runs from the segment's
    /// start DTS to the DTS of `next_video`, the first sample of the next
    /// segment. Audio-only segments sum their parts; the next audio sample is
    /// accepted for symmetry but does not affect the result. A video
    /// segment finalized without a next sample also falls back to the sum.
    pub fn finalize(
        &mut self,
        next_video: Option<&VideoSample>,
        _next_audio: Option<&AudioSample>,
    ) -> Result<()> {
        let Open { part, sink, .. } = self.take_open()?;
        let sealed = seal(part)?;

        if !sealed.content().is_empty() {
            sink.part_finalized(&sealed);
            self.parts.push(sealed);
        }

        let summed = || -> Duration { self.parts.iter().map(|p| p.rendered_duration()).sum() };
        self.rendered_duration = match next_video {
            Some(next) if self.tracks.has_video() => {
                if next.dts < self.start_dts {
                    tracing::warn!(
                        segment = %self.id,
                        start_dts = ?self.start_dts,
                        next_dts = ?next.dts,
                        "next video sample precedes segment start; duration clamped to zero"
                    );
                }
                next.dts.saturating_sub(self.start_dts)
            }
            None if self.tracks.has_video() => {
                tracing::warn!(
                    segment = %self.id,
                    "no next video sample; summing part durations"
                );
                summed()
            }
            _ => summed(),
        };

        tracing::debug!(
            segment = %self.id,
            parts = self.parts.len(),
            size = self.size,
            duration_ms = self.rendered_duration.as_millis() as u64,
            "segment finalized"
        );
        Ok(())
    }
}

fn seal(part: Part) -> Result<Arc<SealedPart>> {
    let part_id = part.id();
    let sealed = part
        .finalize()
        .map_err(|source| Error::Seal { part_id, source })?;
    Ok(Arc::new(sealed))
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("start_dts", &self.start_dts)
            .field("size", &self.size)
            .field("parts", &self.parts.len())
            .field("open", &self.is_open())
            .field("rendered_duration", &self.rendered_duration)
            .finish()
    }
}
