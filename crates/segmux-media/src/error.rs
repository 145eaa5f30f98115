//! Error types for segmux-media.

use segmux_common::PartId;
use std::time::Duration;
use thiserror::Error;

/// Result type for segmux-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for segment and segmenter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Accepting the sample would push the segment past its byte budget.
    /// Nothing was written.
    #[error("segment size limit reached: {size} + {sample_size} bytes exceeds {max_size}")]
    CapacityExceeded {
        size: u64,
        sample_size: u64,
        max_size: u64,
    },

    /// A part could not be sealed. The segment is closed afterwards.
    #[error("failed to seal part {part_id}: {source}")]
    Seal {
        part_id: PartId,
        #[source]
        source: EncodeError,
    },

    /// The operation is not valid in the segment's current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A sample arrived for a track the stream was not configured with.
    #[error("stream has no {0} track")]
    MissingTrack(&'static str),

    /// Track parameters could not be serialized into an init segment.
    #[error("init segment: {0}")]
    Init(#[source] EncodeError),
}

impl Error {
    /// Whether this error is a capacity rejection, after which the segment
    /// remains writable.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Error::CapacityExceeded { .. })
    }
}

/// Failure to serialize buffered samples or track parameters to fMP4.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// A sample's successor timestamp precedes its own.
    #[error("{track} timestamps go backwards: {at:?} followed by {next:?}")]
    NonMonotonic {
        track: &'static str,
        at: Duration,
        next: Duration,
    },

    /// A NAL unit is too long for a 4-byte length prefix.
    #[error("NAL unit of {0} bytes does not fit a 32-bit length prefix")]
    NaluTooLarge(usize),

    /// A sample's encoded size does not fit the trun size field.
    #[error("sample of {0} bytes does not fit a 32-bit size field")]
    SampleTooLarge(usize),

    /// A duration or offset does not fit its fMP4 field.
    #[error("{0} does not fit its 32-bit field")]
    FieldOverflow(&'static str),

    /// The SPS is too short to carry profile and level.
    #[error("SPS must be at least 4 bytes, got {0}")]
    InvalidSps(usize),

    /// Samples were buffered for a track the part was not created with.
    #[error("{0} samples buffered without a {0} track")]
    MissingTrack(&'static str),

    /// A codec configuration blob is too large for its descriptor.
    #[error("{what} of {len} bytes is too large")]
    ConfigTooLarge { what: &'static str, len: usize },
}
