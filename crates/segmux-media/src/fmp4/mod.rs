//! Fragmented MP4 (fMP4) serialization.
//!
//! - Init segment (ftyp + moov describing every track)
//! - Part fragments (moof with one traf per track + a shared mdat)

pub(crate) mod boxes;
mod writer;

pub use writer::write_init_segment;
pub(crate) use writer::{write_fragment, TrackRun};
