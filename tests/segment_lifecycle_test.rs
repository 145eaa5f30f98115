//! Segment lifecycle through the public API: synthetic source, segmenter,
//! part store and parts reader.

use segmux::config::SyntheticConfig;
use segmux::media::{Segmenter, SegmenterConfig};
use segmux::store::{PartStore, StoreEvent};
use segmux::synthetic::{SyntheticSample, SyntheticSource};
use segmux_common::SequentialIds;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

fn run(synthetic: SyntheticConfig, muxer: SegmenterConfig) -> (Arc<PartStore>, Vec<u8>) {
    let source = SyntheticSource::new(synthetic);
    let store = Arc::new(PartStore::new());
    let mut segmenter = Segmenter::new(
        muxer,
        source.tracks(),
        Arc::new(SequentialIds::new()),
        store.clone(),
        store.clone(),
    )
    .unwrap();
    let init = segmenter.init_segment().unwrap();

    for sample in source.samples() {
        match sample {
            SyntheticSample::Video(v) => segmenter.write_h264(v).unwrap(),
            SyntheticSample::Audio(a) => segmenter.write_aac(a).unwrap(),
        }
    }
    segmenter.close().unwrap();
    (store, init)
}

/// Top-level box types of a buffer of concatenated ISO BMFF boxes.
fn box_types(mut data: &[u8]) -> Vec<String> {
    let mut types = Vec::new();
    while data.len() >= 8 {
        let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        types.push(String::from_utf8_lossy(&data[4..8]).into_owned());
        assert!(size >= 8 && size <= data.len(), "bad box size {}", size);
        data = &data[size..];
    }
    assert!(data.is_empty());
    types
}

#[test]
fn test_av_stream_segments_on_idr_boundaries() {
    let synthetic = SyntheticConfig {
        duration_secs: 4,
        ..SyntheticConfig::default()
    };
    let (store, init) = run(synthetic, SegmenterConfig::default());

    assert_eq!(box_types(&init), ["ftyp", "moov"]);

    let segments = store.segments();
    assert_eq!(segments.len(), 4);
    for (i, segment) in segments.iter().enumerate() {
        assert_eq!(segment.name(), format!("seg{}", i));
        assert!(!segment.is_open());
        assert!(segment.parts()[0].is_independent());
        assert!(segment.parts().len() >= 5);
    }
    // all but the last end on the next IDR
    for segment in &segments[..3] {
        assert_eq!(segment.rendered_duration(), Duration::from_secs(1));
    }
}

#[test]
fn test_reader_streams_every_part_in_order() {
    let synthetic = SyntheticConfig {
        duration_secs: 2,
        ..SyntheticConfig::default()
    };
    let (store, _) = run(synthetic, SegmenterConfig::default());

    for segment in store.segments() {
        let mut reader = segment.reader();
        assert_eq!(reader.len(), segment.parts().iter().map(|p| p.content().len() as u64).sum::<u64>());

        let mut out = Vec::new();
        let mut buf = [0u8; 1000];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        let expected: Vec<u8> = segment
            .parts()
            .iter()
            .flat_map(|p| p.content().iter().copied())
            .collect();
        assert_eq!(out, expected);

        let types = box_types(&out);
        assert_eq!(types.len(), segment.parts().len() * 2);
        assert!(types.chunks(2).all(|pair| pair == ["moof", "mdat"]));
    }
}

#[test]
fn test_audio_only_stream() {
    let synthetic = SyntheticConfig {
        video: false,
        duration_secs: 3,
        ..SyntheticConfig::default()
    };
    let (store, init) = run(synthetic, SegmenterConfig::default());

    assert_eq!(box_types(&init), ["ftyp", "moov"]);
    let segments = store.segments();
    assert_eq!(segments.len(), 3);

    let total: Duration = segments.iter().map(|s| s.rendered_duration()).sum();
    // 141 AAC frames at 48 kHz
    let expected = Duration::from_nanos(141 * 1024 * 1_000_000_000 / 48000);
    let diff = if total > expected { total - expected } else { expected - total };
    assert!(diff < Duration::from_micros(10), "total {:?}", total);
}

#[test]
fn test_without_low_latency_each_segment_is_one_part() {
    let synthetic = SyntheticConfig {
        duration_secs: 3,
        ..SyntheticConfig::default()
    };
    let muxer = SegmenterConfig {
        low_latency: false,
        ..SegmenterConfig::default()
    };
    let (store, _) = run(synthetic, muxer);

    assert_eq!(store.segments().len(), 3);
    for segment in store.segments() {
        assert_eq!(segment.parts().len(), 1);
    }
    assert_eq!(store.part_count(), 3);
}

#[tokio::test]
async fn test_store_announces_parts_before_their_segment() {
    let store = Arc::new(PartStore::with_capacity(1024));
    let mut rx = store.subscribe();

    let source = SyntheticSource::new(SyntheticConfig {
        audio: false,
        duration_secs: 2,
        ..SyntheticConfig::default()
    });
    let mut segmenter = Segmenter::new(
        SegmenterConfig::default(),
        source.tracks(),
        Arc::new(SequentialIds::new()),
        store.clone(),
        store.clone(),
    )
    .unwrap();
    for sample in source.samples() {
        if let SyntheticSample::Video(v) = sample {
            segmenter.write_h264(v).unwrap();
        }
    }
    segmenter.close().unwrap();

    let mut parts_since_segment = 0;
    let mut segments = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            StoreEvent::PartFinalized { .. } => parts_since_segment += 1,
            StoreEvent::SegmentFinalized { parts, .. } => {
                assert_eq!(parts, parts_since_segment);
                parts_since_segment = 0;
                segments += 1;
            }
        }
    }
    assert_eq!(segments, 2);
    assert_eq!(parts_since_segment, 0);
}
