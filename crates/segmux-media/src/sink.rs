//! Notification capabilities injected into segments and the segmenter.
//!
//! Sinks run synchronously inside the write or finalize call that produced
//! the notification. They must not call back into the segment.

use std::sync::Arc;

use crate::part::SealedPart;
use crate::segment::Segment;

/// Receives every part as soon as it is sealed and published.
pub trait PartSink: Send + Sync {
    fn part_finalized(&self, part: &Arc<SealedPart>);
}

/// Receives every segment once it is finalized and closed.
pub trait SegmentSink: Send + Sync {
    fn segment_finalized(&self, segment: Arc<Segment>);
}

/// Sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PartSink for NullSink {
    fn part_finalized(&self, _part: &Arc<SealedPart>) {}
}

impl SegmentSink for NullSink {
    fn segment_finalized(&self, _segment: Arc<Segment>) {}
}
