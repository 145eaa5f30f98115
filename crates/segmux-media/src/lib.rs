//! Segmux-Media: segment and part assembly for fMP4 low-latency HLS.
//!
//! Samples flow from a [`Segmenter`] into the active [`Segment`], which
//! charges them against its byte budget and buffers them in an open
//! [`Part`]. In low-latency mode a part is sealed into a [`SealedPart`]
//! (one `moof` + `mdat` fragment) as soon as it covers the target part
//! duration, and published through a [`PartSink`]. Finished segments are
//! handed to a [`SegmentSink`] and can be streamed with a [`PartsReader`].
//!
//! # Modules
//!
//! - [`segment`] - Byte budget, part switching and segment finalization
//! - [`segmenter`] - Segment boundaries and part-duration alignment
//! - [`part`] - Open parts and their sealed, immutable form
//! - [`parts_reader`] - `std::io::Read` over a segment's parts
//! - [`fmp4`] - Init segment and fragment serialization
//! - [`sink`] - Notification capabilities

pub mod error;
pub mod fmp4;
pub mod part;
pub mod parts_reader;
pub mod sample;
pub mod segment;
pub mod segmenter;
pub mod sink;
pub mod track;

pub use error::{EncodeError, Error, Result};
pub use fmp4::write_init_segment;
pub use part::{Part, SealedPart};
pub use parts_reader::PartsReader;
pub use sample::{AudioSample, VideoSample};
pub use segment::{Segment, SegmentConfig};
pub use segmenter::{Segmenter, SegmenterConfig};
pub use sink::{NullSink, PartSink, SegmentSink};
pub use track::{AudioTrack, Tracks, VideoTrack};
