//! ISO BMFF box serialization primitives.
//!
//! Every writer appends to a shared `BytesMut`. Boxes are opened with a
//! size placeholder and patched once their children are written, so
//! nesting follows the call structure.

use bytes::{BufMut, BytesMut};

use crate::error::EncodeError;

/// Sample flags for a sync (IDR / audio) sample.
pub(crate) const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
/// Sample flags for a non-sync sample that depends on others.
pub(crate) const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

const IDENTITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Start a box and return its offset for [`end_box`].
pub(crate) fn begin_box(buf: &mut BytesMut, box_type: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0); // placeholder
    buf.put_slice(box_type);
    start
}

/// Start a full box (version + 24-bit flags).
pub(crate) fn begin_full_box(
    buf: &mut BytesMut,
    box_type: &[u8; 4],
    version: u8,
    flags: u32,
) -> usize {
    let start = begin_box(buf, box_type);
    buf.put_u32((u32::from(version) << 24) | (flags & 0x00FF_FFFF));
    start
}

/// Patch the size of the box opened at `start`.
pub(crate) fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

pub(crate) fn put_ftyp(buf: &mut BytesMut) {
    let ftyp = begin_box(buf, b"ftyp");
    buf.put_slice(b"mp42");
    buf.put_u32(1); // minor version
    for brand in [b"mp41", b"mp42", b"isom", b"hlsf"] {
        buf.put_slice(brand);
    }
    end_box(buf, ftyp);
}

// ---------------------------------------------------------------------------
// moov
// ---------------------------------------------------------------------------

/// Movie header, version 0. Duration is zero for fragmented files.
pub(crate) fn put_mvhd(buf: &mut BytesMut, next_track_id: u32) {
    let mvhd = begin_full_box(buf, b"mvhd", 0, 0);
    buf.put_u32(0); // creation_time
    buf.put_u32(0); // modification_time
    buf.put_u32(1000);
    buf.put_u32(0); // duration
    buf.put_u32(0x0001_0000); // rate 1.0
    buf.put_u16(0x0100); // volume 1.0
    buf.put_bytes(0, 10);
    for v in IDENTITY_MATRIX {
        buf.put_u32(v);
    }
    buf.put_bytes(0, 24); // pre_defined
    buf.put_u32(next_track_id);
    end_box(buf, mvhd);
}

/// Track header, flags enabled | in_movie.
pub(crate) fn put_tkhd(
    buf: &mut BytesMut,
    track_id: u32,
    is_video: bool,
    width: u16,
    height: u16,
) {
    let tkhd = begin_full_box(buf, b"tkhd", 0, 3);
    buf.put_u32(0); // creation_time
    buf.put_u32(0); // modification_time
    buf.put_u32(track_id);
    buf.put_u32(0);
    buf.put_u32(0); // duration
    buf.put_bytes(0, 8);
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate_group
    buf.put_u16(if is_video { 0 } else { 0x0100 });
    buf.put_u16(0);
    for v in IDENTITY_MATRIX {
        buf.put_u32(v);
    }
    // 16.16 fixed point
    buf.put_u32(u32::from(width) << 16);
    buf.put_u32(u32::from(height) << 16);
    end_box(buf, tkhd);
}

pub(crate) fn put_mdhd(buf: &mut BytesMut, timescale: u32) {
    let mdhd = begin_full_box(buf, b"mdhd", 0, 0);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(timescale);
    buf.put_u32(0);
    buf.put_u16(0x55C4); // "und"
    buf.put_u16(0);
    end_box(buf, mdhd);
}

pub(crate) fn put_hdlr(buf: &mut BytesMut, handler_type: &[u8; 4], name: &[u8]) {
    let hdlr = begin_full_box(buf, b"hdlr", 0, 0);
    buf.put_u32(0);
    buf.put_slice(handler_type);
    buf.put_bytes(0, 12);
    buf.put_slice(name);
    buf.put_u8(0);
    end_box(buf, hdlr);
}

/// Data information with a single self-contained `url ` entry.
pub(crate) fn put_dinf(buf: &mut BytesMut) {
    let dinf = begin_box(buf, b"dinf");
    let dref = begin_full_box(buf, b"dref", 0, 0);
    buf.put_u32(1);
    let url = begin_full_box(buf, b"url ", 0, 1);
    end_box(buf, url);
    end_box(buf, dref);
    end_box(buf, dinf);
}

pub(crate) fn put_vmhd(buf: &mut BytesMut) {
    let vmhd = begin_full_box(buf, b"vmhd", 0, 1);
    buf.put_bytes(0, 8); // graphicsmode + opcolor
    end_box(buf, vmhd);
}

pub(crate) fn put_smhd(buf: &mut BytesMut) {
    let smhd = begin_full_box(buf, b"smhd", 0, 0);
    buf.put_bytes(0, 4);
    end_box(buf, smhd);
}

/// Sample table holding one sample entry and empty run tables; the
/// samples themselves live in fragments.
pub(crate) fn put_stbl<F>(buf: &mut BytesMut, sample_entry: F) -> Result<(), EncodeError>
where
    F: FnOnce(&mut BytesMut) -> Result<(), EncodeError>,
{
    let stbl = begin_box(buf, b"stbl");

    let stsd = begin_full_box(buf, b"stsd", 0, 0);
    buf.put_u32(1);
    sample_entry(buf)?;
    end_box(buf, stsd);

    for empty in [b"stts", b"stsc"] {
        let b = begin_full_box(buf, empty, 0, 0);
        buf.put_u32(0);
        end_box(buf, b);
    }
    let stsz = begin_full_box(buf, b"stsz", 0, 0);
    buf.put_u32(0); // sample_size
    buf.put_u32(0); // sample_count
    end_box(buf, stsz);
    let stco = begin_full_box(buf, b"stco", 0, 0);
    buf.put_u32(0);
    end_box(buf, stco);

    end_box(buf, stbl);
    Ok(())
}

/// `avc1` sample entry with its `avcC` record (one SPS, one PPS, 4-byte
/// NAL length prefixes).
pub(crate) fn put_avc1(
    buf: &mut BytesMut,
    width: u16,
    height: u16,
    sps: &[u8],
    pps: &[u8],
) -> Result<(), EncodeError> {
    if sps.len() < 4 {
        return Err(EncodeError::InvalidSps(sps.len()));
    }
    let sps_len = u16::try_from(sps.len()).map_err(|_| EncodeError::ConfigTooLarge {
        what: "SPS",
        len: sps.len(),
    })?;
    let pps_len = u16::try_from(pps.len()).map_err(|_| EncodeError::ConfigTooLarge {
        what: "PPS",
        len: pps.len(),
    })?;

    let avc1 = begin_box(buf, b"avc1");
    buf.put_bytes(0, 6);
    buf.put_u16(1); // data_reference_index
    buf.put_bytes(0, 16);
    buf.put_u16(width);
    buf.put_u16(height);
    buf.put_u32(0x0048_0000); // 72 dpi
    buf.put_u32(0x0048_0000);
    buf.put_u32(0);
    buf.put_u16(1); // frame_count
    buf.put_bytes(0, 32); // compressorname
    buf.put_u16(0x0018);
    buf.put_i16(-1);

    let avcc = begin_box(buf, b"avcC");
    buf.put_u8(1); // configurationVersion
    buf.put_slice(&sps[1..4]); // profile, compatibility, level
    buf.put_u8(0xFF); // lengthSizeMinusOne = 3
    buf.put_u8(0xE1); // one SPS
    buf.put_u16(sps_len);
    buf.put_slice(sps);
    buf.put_u8(1);
    buf.put_u16(pps_len);
    buf.put_slice(pps);
    end_box(buf, avcc);

    end_box(buf, avc1);
    Ok(())
}

/// `mp4a` sample entry with an `esds` carrying the AudioSpecificConfig.
pub(crate) fn put_mp4a(
    buf: &mut BytesMut,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    asc: &[u8],
) -> Result<(), EncodeError> {
    // descriptor lengths are written as a single byte
    if asc.len() > 100 {
        return Err(EncodeError::ConfigTooLarge {
            what: "AudioSpecificConfig",
            len: asc.len(),
        });
    }
    let dsi_len = asc.len() as u8;
    let dcd_len = 13 + 2 + dsi_len;
    let es_len = 3 + 2 + dcd_len + 3;

    let mp4a = begin_box(buf, b"mp4a");
    buf.put_bytes(0, 6);
    buf.put_u16(1); // data_reference_index
    buf.put_bytes(0, 8);
    buf.put_u16(channels);
    buf.put_u16(16); // samplesize
    buf.put_u32(0);
    // 16.16 fixed point; rates above 65535 are stored as 0
    buf.put_u32(if sample_rate > u32::from(u16::MAX) { 0 } else { sample_rate << 16 });

    let esds = begin_full_box(buf, b"esds", 0, 0);
    buf.put_u8(0x03); // ES_Descriptor
    buf.put_u8(es_len);
    buf.put_u16(track_id as u16);
    buf.put_u8(0);
    buf.put_u8(0x04); // DecoderConfigDescriptor
    buf.put_u8(dcd_len);
    buf.put_u8(0x40); // MPEG-4 audio
    buf.put_u8(0x15); // audio stream
    buf.put_bytes(0, 3); // bufferSizeDB
    buf.put_u32(0); // maxBitrate
    buf.put_u32(0); // avgBitrate
    buf.put_u8(0x05); // DecoderSpecificInfo
    buf.put_u8(dsi_len);
    buf.put_slice(asc);
    buf.put_slice(&[0x06, 0x01, 0x02]); // SLConfigDescriptor
    end_box(buf, esds);

    end_box(buf, mp4a);
    Ok(())
}

pub(crate) fn put_trex(buf: &mut BytesMut, track_id: u32) {
    let trex = begin_full_box(buf, b"trex", 0, 0);
    buf.put_u32(track_id);
    buf.put_u32(1); // sample_description_index
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0);
    end_box(buf, trex);
}

// ---------------------------------------------------------------------------
// moof
// ---------------------------------------------------------------------------

pub(crate) fn put_mfhd(buf: &mut BytesMut, sequence_number: u32) {
    let mfhd = begin_full_box(buf, b"mfhd", 0, 0);
    buf.put_u32(sequence_number);
    end_box(buf, mfhd);
}

/// Flags: default-base-is-moof.
pub(crate) fn put_tfhd(buf: &mut BytesMut, track_id: u32) {
    let tfhd = begin_full_box(buf, b"tfhd", 0, 0x02_0000);
    buf.put_u32(track_id);
    end_box(buf, tfhd);
}

/// Version 1 for a 64-bit decode time.
pub(crate) fn put_tfdt(buf: &mut BytesMut, base_media_decode_time: u64) {
    let tfdt = begin_full_box(buf, b"tfdt", 1, 0);
    buf.put_u64(base_media_decode_time);
    end_box(buf, tfdt);
}

/// One sample's entry in a `trun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrunSample {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub composition_time_offset: i32,
}

/// Version 1 track run with every per-sample field present.
///
/// The data offset is left zero; the returned position of that field lets
/// the caller patch it once the moof size is known.
pub(crate) fn put_trun(buf: &mut BytesMut, samples: &[TrunSample]) -> usize {
    // data-offset | first-sample-flags | duration | size | flags | cts offset
    const FLAGS: u32 = 0x000001 | 0x000100 | 0x000200 | 0x000400 | 0x000800;

    let trun = begin_full_box(buf, b"trun", 1, FLAGS);
    buf.put_u32(samples.len() as u32);
    let data_offset_at = buf.len();
    buf.put_i32(0);
    for s in samples {
        buf.put_u32(s.duration);
        buf.put_u32(s.size);
        buf.put_u32(s.flags);
        buf.put_i32(s.composition_time_offset);
    }
    end_box(buf, trun);
    data_offset_at
}

/// `mdat` header for `data_size` payload bytes, using the 64-bit form
/// when the 32-bit size would overflow.
pub(crate) fn put_mdat_header(buf: &mut BytesMut, data_size: u64) {
    if data_size + 8 > u64::from(u32::MAX) {
        buf.put_u32(1);
        buf.put_slice(b"mdat");
        buf.put_u64(data_size + 16);
    } else {
        buf.put_u32((data_size + 8) as u32);
        buf.put_slice(b"mdat");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be32(data: &[u8], at: usize) -> u32 {
        u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
    }

    fn build(f: impl FnOnce(&mut BytesMut)) -> BytesMut {
        let mut buf = BytesMut::new();
        f(&mut buf);
        buf
    }

    #[test]
    fn nested_boxes_are_patched() {
        let buf = build(|buf| {
            let outer = begin_box(buf, b"cont");
            let a = begin_box(buf, b"ch_1");
            buf.put_u8(0xAA);
            end_box(buf, a);
            let b = begin_full_box(buf, b"ch_2", 1, 0xFF02_0304);
            end_box(buf, b);
            end_box(buf, outer);
        });
        assert_eq!(buf.len(), 8 + 9 + 12);
        assert_eq!(be32(&buf, 0), 29);
        assert_eq!(be32(&buf, 8), 9);
        assert_eq!(&buf[21..25], b"ch_2");
        // flags are truncated to 24 bits
        assert_eq!(be32(&buf, 25), 0x0102_0304);
        assert_eq!(buf[25], 1);
    }

    #[test]
    fn ftyp_brands() {
        let ftyp = build(put_ftyp);
        assert_eq!(ftyp.len(), 32);
        assert_eq!(&ftyp[8..12], b"mp42");
        assert_eq!(&ftyp[28..32], b"hlsf");
    }

    #[test]
    fn fixed_box_sizes() {
        assert_eq!(build(|b| put_mvhd(b, 2)).len(), 108);
        assert_eq!(build(|b| put_tkhd(b, 1, true, 1920, 1080)).len(), 92);
        assert_eq!(build(|b| put_mdhd(b, 90000)).len(), 32);
        assert_eq!(build(|b| put_mfhd(b, 1)).len(), 16);
        assert_eq!(build(|b| put_tfhd(b, 1)).len(), 16);
        assert_eq!(build(|b| put_tfdt(b, 0)).len(), 20);
        assert_eq!(build(put_dinf).len(), 36);
    }

    #[test]
    fn trun_layout() {
        let samples = [
            TrunSample {
                duration: 3000,
                size: 10,
                flags: SYNC_SAMPLE_FLAGS,
                composition_time_offset: 0,
            },
            TrunSample {
                duration: 3000,
                size: 20,
                flags: NON_SYNC_SAMPLE_FLAGS,
                composition_time_offset: -3000,
            },
        ];
        let mut buf = BytesMut::new();
        let offset_at = put_trun(&mut buf, &samples);

        assert_eq!(buf.len(), 20 + 2 * 16);
        assert_eq!(buf[8], 1); // version
        assert_eq!(be32(&buf, 12), 2); // sample_count
        assert_eq!(offset_at, 16);
        assert_eq!(be32(&buf, 20), 3000);
        assert_eq!(be32(&buf, 48), (-3000i32) as u32);
    }

    #[test]
    fn avc1_carries_profile_and_level() {
        let mut buf = BytesMut::new();
        assert_eq!(
            put_avc1(&mut buf, 640, 360, &[0x67, 0x64], &[0x68]),
            Err(EncodeError::InvalidSps(2))
        );
        assert!(buf.is_empty());

        put_avc1(&mut buf, 640, 360, &[0x67, 0x64, 0x00, 0x1f], &[0x68, 0xee]).unwrap();
        assert_eq!(be32(&buf, 0) as usize, buf.len());
        let avcc = 8 + 78;
        assert_eq!(&buf[avcc + 4..avcc + 8], b"avcC");
        assert_eq!(buf[avcc + 9], 0x64); // profile
        assert_eq!(buf[avcc + 11], 0x1f); // level
    }

    #[test]
    fn esds_descriptor_lengths() {
        let mut buf = BytesMut::new();
        put_mp4a(&mut buf, 2, 48000, 2, &[0x11, 0x90]).unwrap();
        let esds = 8 + 28;
        assert_eq!(&buf[esds + 4..esds + 8], b"esds");
        let esds_len = be32(&buf, esds) as usize;
        // ES descriptor length covers everything after its length byte
        assert_eq!(buf[esds + 13] as usize, esds_len - 14);

        let mut buf = BytesMut::new();
        assert!(put_mp4a(&mut buf, 1, 48000, 2, &[0u8; 101]).is_err());
    }

    #[test]
    fn mdat_header_forms() {
        let short = build(|b| put_mdat_header(b, 100));
        assert_eq!(short.len(), 8);
        assert_eq!(be32(&short, 0), 108);
        assert_eq!(&short[4..8], b"mdat");

        let large = build(|b| put_mdat_header(b, u64::from(u32::MAX)));
        assert_eq!(large.len(), 16);
        assert_eq!(be32(&large, 0), 1);
    }
}
