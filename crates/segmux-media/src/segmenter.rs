//! The ingestion driver that owns the active segment.
//!
//! [`Segmenter`] decides segment boundaries (IDR frames for streams with
//! video, elapsed time for audio-only streams), computes the part duration
//! used for low-latency part switching, and hands finished segments to a
//! [`SegmentSink`].

use chrono::Utc;
use segmux_common::{PartIdAllocator, SegmentId};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fmp4::write_init_segment;
use crate::sample::{AudioSample, VideoSample};
use crate::segment::{Segment, SegmentConfig};
use crate::sink::{PartSink, SegmentSink};
use crate::track::Tracks;

/// Segmentation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterConfig {
    pub low_latency: bool,
    /// Minimum segment length; the boundary lands on the next IDR after it.
    pub segment_duration: Duration,
    /// Target part length in low-latency mode.
    pub part_duration: Duration,
    /// Byte budget of each segment.
    pub segment_max_size: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            low_latency: true,
            segment_duration: Duration::from_secs(1),
            part_duration: Duration::from_millis(200),
            segment_max_size: 50 * 1024 * 1024,
        }
    }
}

/// Splits a stream of samples into segments and parts.
pub struct Segmenter {
    config: SegmenterConfig,
    tracks: Tracks,
    ids: Arc<dyn PartIdAllocator>,
    part_sink: Arc<dyn PartSink>,
    segment_sink: Arc<dyn SegmentSink>,

    current: Option<Segment>,
    next_segment_id: SegmentId,
    last_sample_duration: Option<Duration>,
}

impl Segmenter {
    /// Create a segmenter for `tracks`.
    ///
    /// Fails with [`Error::MissingTrack`] when neither a video nor an audio
    /// track is configured.
    pub fn new(
        config: SegmenterConfig,
        tracks: Tracks,
        ids: Arc<dyn PartIdAllocator>,
        part_sink: Arc<dyn PartSink>,
        segment_sink: Arc<dyn SegmentSink>,
    ) -> Result<Self> {
        if tracks.is_empty() {
            return Err(Error::MissingTrack("video or audio"));
        }

        tracing::debug!(
            video = tracks.has_video(),
            audio = tracks.has_audio(),
            low_latency = config.low_latency,
            segment_ms = config.segment_duration.as_millis() as u64,
            part_ms = config.part_duration.as_millis() as u64,
            "segmenter created"
        );

        Ok(Self {
            config,
            tracks,
            ids,
            part_sink,
            segment_sink,
            current: None,
            next_segment_id: SegmentId::new(0),
            last_sample_duration: None,
        })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn tracks(&self) -> &Tracks {
        &self.tracks
    }

    /// The segment currently receiving samples, if one has been opened.
    pub fn current_segment(&self) -> Option<&Segment> {
        self.current.as_ref()
    }

    /// Serialize the `ftyp` + `moov` initialization segment.
    pub fn init_segment(&self) -> Result<Vec<u8>> {
        write_init_segment(&self.tracks).map_err(Error::Init)
    }

    /// Part duration used for switching, aligned to the timing track's
    /// sample duration so parts end on sample boundaries.
    pub fn adjusted_part_duration(&self) -> Duration {
        let target = self.config.part_duration;
        match self.last_sample_duration {
            Some(sample) if !sample.is_zero() => {
                let sample_ns = sample.as_nanos();
                let multiple = ((target.as_nanos() + sample_ns / 2) / sample_ns).max(1);
                Duration::from_nanos((sample_ns * multiple) as u64)
            }
            _ => target,
        }
    }

    /// Ingest one H.264 access unit.
    pub fn write_h264(&mut self, sample: VideoSample) -> Result<()> {
        if !self.tracks.has_video() {
            return Err(Error::MissingTrack("video"));
        }

        match self.current.as_ref().map(Segment::start_dts) {
            None if !sample.idr => {
                tracing::trace!(dts = ?sample.dts, "waiting for first IDR");
                return Ok(());
            }
            None => self.open_segment(sample.dts),
            Some(start) => {
                if sample.idr && sample.dts.saturating_sub(start) >= self.config.segment_duration {
                    self.rotate(Some(&sample), None, sample.dts)?;
                }
            }
        }

        let duration = sample.duration();
        if !duration.is_zero() {
            self.last_sample_duration = Some(duration);
        }
        let adjusted = self.adjusted_part_duration();

        match self.current.as_mut() {
            Some(segment) => segment.write_video_sample(sample, adjusted),
            None => Err(Error::InvalidState("no open segment")),
        }
    }

    /// Ingest one AAC access unit.
    pub fn write_aac(&mut self, sample: AudioSample) -> Result<()> {
        if !self.tracks.has_audio() {
            return Err(Error::MissingTrack("audio"));
        }

        if self.tracks.has_video() {
            let adjusted = self.adjusted_part_duration();
            return match self.current.as_mut() {
                Some(segment) => segment.write_audio_sample(sample, adjusted),
                None => {
                    tracing::trace!(pts = ?sample.pts, "audio before first IDR dropped");
                    Ok(())
                }
            };
        }

        match self.current.as_ref().map(Segment::start_dts) {
            None => self.open_segment(sample.pts),
            Some(start) => {
                if sample.pts.saturating_sub(start) >= self.config.segment_duration {
                    self.rotate(None, Some(&sample), sample.pts)?;
                }
            }
        }

        let duration = sample.duration();
        if !duration.is_zero() {
            self.last_sample_duration = Some(duration);
        }
        let adjusted = self.adjusted_part_duration();

        match self.current.as_mut() {
            Some(segment) => segment.write_audio_sample(sample, adjusted),
            None => Err(Error::InvalidState("no open segment")),
        }
    }

    /// Finalize the active segment, if any, without a following sample.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut segment) = self.current.take() {
            segment.finalize(None, None)?;
            self.publish(segment);
        }
        Ok(())
    }

    fn open_segment(&mut self, start_dts: Duration) {
        let id = self.next_segment_id;
        self.next_segment_id = id.next();

        tracing::debug!(segment = %id, start_dts = ?start_dts, "opening segment");

        self.current = Some(Segment::new(
            id,
            Utc::now(),
            start_dts,
            SegmentConfig {
                low_latency: self.config.low_latency,
                max_size: self.config.segment_max_size,
            },
            self.tracks.clone(),
            Arc::clone(&self.ids),
            Arc::clone(&self.part_sink),
        ));
    }

    fn rotate(
        &mut self,
        next_video: Option<&VideoSample>,
        next_audio: Option<&AudioSample>,
        next_start: Duration,
    ) -> Result<()> {
        if let Some(mut segment) = self.current.take() {
            segment.finalize(next_video, next_audio)?;
            self.publish(segment);
        }
        self.open_segment(next_start);
        Ok(())
    }

    fn publish(&self, segment: Segment) {
        tracing::info!(
            segment = %segment.name(),
            parts = segment.parts().len(),
            bytes = segment.size(),
            duration_ms = segment.rendered_duration().as_millis() as u64,
            "segment ready"
        );
        self.segment_sink.segment_finalized(Arc::new(segment));
    }
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("config", &self.config)
            .field("tracks", &self.tracks)
            .field("current", &self.current)
            .field("next_segment_id", &self.next_segment_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::SealedPart;
    use crate::track::{AudioTrack, VideoTrack};
    use bytes::Bytes;
    use segmux_common::{ticks_to_duration, PartId, SequentialIds};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        parts: Mutex<Vec<PartId>>,
        segments: Mutex<Vec<Arc<Segment>>>,
    }

    impl PartSink for Recorder {
        fn part_finalized(&self, part: &Arc<SealedPart>) {
            self.parts.lock().unwrap().push(part.id());
        }
    }

    impl SegmentSink for Recorder {
        fn segment_finalized(&self, segment: Arc<Segment>) {
            self.segments.lock().unwrap().push(segment);
        }
    }

    fn video_track() -> VideoTrack {
        VideoTrack {
            sps: Bytes::from_static(&[0x67, 0x42, 0xc0, 0x1e]),
            pps: Bytes::from_static(&[0x68, 0xce]),
            width: 320,
            height: 240,
        }
    }

    fn segmenter(config: SegmenterConfig, video: bool, audio: bool) -> (Segmenter, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let tracks = Tracks::new(
            video.then(video_track),
            if audio { AudioTrack::aac_lc(48000, 2) } else { None },
        );
        let seg = Segmenter::new(
            config,
            tracks,
            Arc::new(SequentialIds::new()),
            recorder.clone(),
            recorder.clone(),
        )
        .unwrap();
        (seg, recorder)
    }

    /// 25 fps frame with an IDR every `gop` frames.
    fn frame(index: u64, gop: u64) -> VideoSample {
        let dts = Duration::from_millis(index * 40);
        VideoSample {
            pts: dts,
            dts,
            next_dts: dts + Duration::from_millis(40),
            idr: index % gop == 0,
            nalus: vec![Bytes::from(vec![0x65; 64])],
        }
    }

    fn aac_frame(index: u64) -> AudioSample {
        AudioSample {
            pts: ticks_to_duration(index * 1024, 48000),
            next_pts: ticks_to_duration((index + 1) * 1024, 48000),
            au: Bytes::from(vec![0x21; 32]),
        }
    }

    #[test]
    fn rejects_stream_without_tracks() {
        let recorder = Arc::new(Recorder::default());
        let err = Segmenter::new(
            SegmenterConfig::default(),
            Tracks::default(),
            Arc::new(SequentialIds::new()),
            recorder.clone(),
            recorder,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingTrack(_)));
    }

    #[test]
    fn rejects_samples_for_missing_tracks() {
        let (mut seg, _) = segmenter(SegmenterConfig::default(), false, true);
        assert!(matches!(
            seg.write_h264(frame(0, 25)),
            Err(Error::MissingTrack("video"))
        ));

        let (mut seg, _) = segmenter(SegmenterConfig::default(), true, false);
        assert!(matches!(
            seg.write_aac(aac_frame(0)),
            Err(Error::MissingTrack("audio"))
        ));
    }

    #[test]
    fn waits_for_first_idr() {
        let (mut seg, _) = segmenter(SegmenterConfig::default(), true, true);
        seg.write_aac(aac_frame(0)).unwrap();
        for i in 1..5 {
            seg.write_h264(frame(i, 25)).unwrap();
        }
        assert!(seg.current_segment().is_none());

        seg.write_h264(frame(25, 25)).unwrap();
        let current = seg.current_segment().unwrap();
        assert_eq!(current.name(), "seg0");
        assert_eq!(current.start_dts(), Duration::from_millis(1000));
        assert_eq!(current.size(), 64);

        seg.write_aac(aac_frame(47)).unwrap();
        assert_eq!(seg.current_segment().unwrap().size(), 96);
    }

    #[test]
    fn rotates_on_idr_after_segment_duration() {
        let (mut seg, recorder) = segmenter(SegmenterConfig::default(), true, false);
        for i in 0..76 {
            seg.write_h264(frame(i, 25)).unwrap();
        }

        let segments = recorder.segments.lock().unwrap();
        let names: Vec<_> = segments.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["seg0", "seg1", "seg2"]);
        for s in segments.iter() {
            assert!(!s.is_open());
            assert_eq!(s.rendered_duration(), Duration::from_secs(1));
            assert_eq!(s.parts().len(), 5);
            assert!(s.parts()[0].is_independent());
        }
        assert_eq!(seg.current_segment().unwrap().name(), "seg3");
    }

    #[test]
    fn segment_boundary_waits_for_idr() {
        // IDR every 30 frames, so the 1 s target stretches to 1.2 s
        let (mut seg, recorder) = segmenter(SegmenterConfig::default(), true, false);
        for i in 0..31 {
            seg.write_h264(frame(i, 30)).unwrap();
        }
        seg.close().unwrap();

        let segments = recorder.segments.lock().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].rendered_duration(), Duration::from_millis(1200));
        // closing without a next sample sums the parts
        assert_eq!(segments[1].rendered_duration(), Duration::from_millis(40));
    }

    #[test]
    fn audio_only_rotates_on_elapsed_time() {
        let (mut seg, recorder) = segmenter(SegmenterConfig::default(), false, true);
        for i in 0..100 {
            seg.write_aac(aac_frame(i)).unwrap();
        }

        let segments = recorder.segments.lock().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(
            segments[0].rendered_duration(),
            ticks_to_duration(47 * 1024, 48000)
        );
        assert_eq!(
            seg.current_segment().unwrap().start_dts(),
            ticks_to_duration(94 * 1024, 48000)
        );
    }

    #[test]
    fn adjusted_part_duration_follows_sample_duration() {
        let (mut seg, _) = segmenter(SegmenterConfig::default(), true, false);
        assert_eq!(seg.adjusted_part_duration(), Duration::from_millis(200));

        let mut sample = frame(0, 25);
        sample.next_dts = Duration::from_nanos(33_333_333);
        seg.write_h264(sample).unwrap();
        assert_eq!(seg.adjusted_part_duration(), Duration::from_nanos(199_999_998));

        let config = SegmenterConfig {
            part_duration: Duration::from_millis(210),
            ..SegmenterConfig::default()
        };
        let (mut seg, _) = segmenter(config, true, false);
        seg.write_h264(frame(0, 25)).unwrap();
        assert_eq!(seg.adjusted_part_duration(), Duration::from_millis(200));

        let config = SegmenterConfig {
            part_duration: Duration::from_millis(10),
            ..SegmenterConfig::default()
        };
        let (mut seg, _) = segmenter(config, true, false);
        seg.write_h264(frame(0, 25)).unwrap();
        assert_eq!(seg.adjusted_part_duration(), Duration::from_millis(40));
    }

    #[test]
    fn part_ids_increase_across_segments() {
        let (mut seg, recorder) = segmenter(SegmenterConfig::default(), true, true);
        for i in 0..60 {
            seg.write_h264(frame(i, 25)).unwrap();
            seg.write_aac(aac_frame(i)).unwrap();
        }
        seg.close().unwrap();

        let parts = recorder.parts.lock().unwrap();
        assert!(parts.len() >= 12);
        assert!(parts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn capacity_error_keeps_segment_writable() {
        let config = SegmenterConfig {
            low_latency: false,
            segment_max_size: 100,
            ..SegmenterConfig::default()
        };
        let (mut seg, _) = segmenter(config, true, false);
        seg.write_h264(frame(0, 25)).unwrap();

        let err = seg.write_h264(frame(1, 25)).unwrap_err();
        assert!(err.is_capacity_exceeded());
        assert_eq!(seg.current_segment().unwrap().size(), 64);
        assert!(seg.current_segment().unwrap().is_open());
    }

    #[test]
    fn close_is_idempotent() {
        let (mut seg, recorder) = segmenter(SegmenterConfig::default(), true, false);
        seg.close().unwrap();
        seg.write_h264(frame(0, 25)).unwrap();
        seg.close().unwrap();
        seg.close().unwrap();
        assert_eq!(recorder.segments.lock().unwrap().len(), 1);
        assert!(seg.current_segment().is_none());
    }

    #[test]
    fn init_segment_starts_with_ftyp() {
        let (seg, _) = segmenter(SegmenterConfig::default(), true, true);
        let init = seg.init_segment().unwrap();
        assert_eq!(&init[4..8], b"ftyp");
    }
}
