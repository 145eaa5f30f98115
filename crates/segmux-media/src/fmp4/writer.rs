//! Init segment and fragment assembly.

use bytes::{Bytes, BytesMut};
use segmux_common::VIDEO_TIMESCALE;

use super::boxes::{self, TrunSample};
use crate::error::EncodeError;
use crate::track::{AudioTrack, Tracks, VideoTrack};

/// Generate the initialization segment (ftyp + moov) for a stream.
///
/// Video, when present, is track 1; audio follows it. Each track gets a
/// `trex` entry so players accept the fragments that follow.
pub fn write_init_segment(tracks: &Tracks) -> Result<Vec<u8>, EncodeError> {
    let mut buf = BytesMut::with_capacity(1024);
    boxes::put_ftyp(&mut buf);

    let moov = boxes::begin_box(&mut buf, b"moov");
    let track_count = u32::from(tracks.has_video()) + u32::from(tracks.has_audio());
    boxes::put_mvhd(&mut buf, track_count + 1);

    if let Some(video) = &tracks.video {
        put_video_trak(&mut buf, tracks.video_track_id(), video)?;
    }
    if let Some(audio) = &tracks.audio {
        put_audio_trak(&mut buf, tracks.audio_track_id(), audio)?;
    }

    let mvex = boxes::begin_box(&mut buf, b"mvex");
    if tracks.has_video() {
        boxes::put_trex(&mut buf, tracks.video_track_id());
    }
    if tracks.has_audio() {
        boxes::put_trex(&mut buf, tracks.audio_track_id());
    }
    boxes::end_box(&mut buf, mvex);
    boxes::end_box(&mut buf, moov);

    Ok(buf.to_vec())
}

fn put_video_trak(
    buf: &mut BytesMut,
    track_id: u32,
    video: &VideoTrack,
) -> Result<(), EncodeError> {
    let trak = boxes::begin_box(buf, b"trak");
    boxes::put_tkhd(buf, track_id, true, video.width, video.height);

    let mdia = boxes::begin_box(buf, b"mdia");
    boxes::put_mdhd(buf, VIDEO_TIMESCALE);
    boxes::put_hdlr(buf, b"vide", b"VideoHandler");

    let minf = boxes::begin_box(buf, b"minf");
    boxes::put_vmhd(buf);
    boxes::put_dinf(buf);
    boxes::put_stbl(buf, |buf| {
        boxes::put_avc1(buf, video.width, video.height, &video.sps, &video.pps)
    })?;
    boxes::end_box(buf, minf);

    boxes::end_box(buf, mdia);
    boxes::end_box(buf, trak);
    Ok(())
}

fn put_audio_trak(
    buf: &mut BytesMut,
    track_id: u32,
    audio: &AudioTrack,
) -> Result<(), EncodeError> {
    let trak = boxes::begin_box(buf, b"trak");
    boxes::put_tkhd(buf, track_id, false, 0, 0);

    let mdia = boxes::begin_box(buf, b"mdia");
    boxes::put_mdhd(buf, audio.sample_rate);
    boxes::put_hdlr(buf, b"soun", b"SoundHandler");

    let minf = boxes::begin_box(buf, b"minf");
    boxes::put_smhd(buf);
    boxes::put_dinf(buf);
    boxes::put_stbl(buf, |buf| {
        boxes::put_mp4a(buf, track_id, audio.sample_rate, audio.channels, &audio.config)
    })?;
    boxes::end_box(buf, minf);

    boxes::end_box(buf, mdia);
    boxes::end_box(buf, trak);
    Ok(())
}

/// Samples of one track inside a fragment, with their payload bytes.
pub(crate) struct TrackRun {
    pub track_id: u32,
    pub base_decode_time: u64,
    pub samples: Vec<TrunSample>,
    pub payload: Vec<u8>,
}

/// Generate one fragment: a `moof` with one `traf` per run, then a single
/// `mdat` holding the payloads in run order.
pub(crate) fn write_fragment(sequence: u32, runs: &[TrackRun]) -> Result<Bytes, EncodeError> {
    let payload_len: usize = runs.iter().map(|r| r.payload.len()).sum();
    let sample_count: usize = runs.iter().map(|r| r.samples.len()).sum();
    let mut buf = BytesMut::with_capacity(128 + sample_count * 16 + payload_len);

    let moof = boxes::begin_box(&mut buf, b"moof");
    boxes::put_mfhd(&mut buf, sequence);
    let mut offset_fields = Vec::with_capacity(runs.len());
    for run in runs {
        let traf = boxes::begin_box(&mut buf, b"traf");
        boxes::put_tfhd(&mut buf, run.track_id);
        boxes::put_tfdt(&mut buf, run.base_decode_time);
        offset_fields.push(boxes::put_trun(&mut buf, &run.samples));
        boxes::end_box(&mut buf, traf);
    }
    boxes::end_box(&mut buf, moof);

    boxes::put_mdat_header(&mut buf, payload_len as u64);

    // data offsets are relative to the moof, which starts at 0
    for (run, field) in runs.iter().zip(offset_fields) {
        let offset =
            i32::try_from(buf.len()).map_err(|_| EncodeError::FieldOverflow("trun data offset"))?;
        buf[field..field + 4].copy_from_slice(&offset.to_be_bytes());
        buf.extend_from_slice(&run.payload);
    }

    Ok(buf.freeze())
}
