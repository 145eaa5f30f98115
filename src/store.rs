//! In-memory registry of published parts and finished segments.
//!
//! [`PartStore`] is the consumer side of the muxer: it is handed to the
//! segmenter as both [`PartSink`] and [`SegmentSink`], indexes what it
//! receives, and fans out a [`StoreEvent`] on a broadcast channel so that
//! blocked playlist or part requests can wake up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use segmux_common::PartId;
use segmux_media::{PartSink, SealedPart, Segment, SegmentSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default broadcast buffer size.
const EVENT_CAPACITY: usize = 256;

/// Notification emitted for every part and segment the store records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    PartFinalized {
        part_id: PartId,
        bytes: usize,
        independent: bool,
    },
    SegmentFinalized {
        name: String,
        parts: usize,
        duration_ms: u64,
    },
}

/// Serializable description of a finished segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub parts: usize,
    /// Raw sample bytes charged against the segment budget.
    pub payload_bytes: u64,
    /// Serialized fMP4 bytes across all parts.
    pub bytes: u64,
    pub duration_secs: f64,
}

impl From<&Segment> for SegmentSummary {
    fn from(segment: &Segment) -> Self {
        Self {
            name: segment.name(),
            start_time: segment.start_time(),
            parts: segment.parts().len(),
            payload_bytes: segment.size(),
            bytes: segment.reader().len(),
            duration_secs: segment.rendered_duration().as_secs_f64(),
        }
    }
}

pub struct PartStore {
    parts: RwLock<HashMap<PartId, Arc<SealedPart>>>,
    segments: RwLock<Vec<Arc<Segment>>>,
    tx: broadcast::Sender<StoreEvent>,
}

impl PartStore {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    /// Create a store whose broadcast channel buffers `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            parts: RwLock::new(HashMap::new()),
            segments: RwLock::new(Vec::new()),
            tx,
        }
    }

    /// Subscribe to part and segment notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn part(&self, id: PartId) -> Option<Arc<SealedPart>> {
        self.parts.read().get(&id).cloned()
    }

    pub fn part_count(&self) -> usize {
        self.parts.read().len()
    }

    /// Look up a finished segment by its playlist name.
    pub fn segment(&self, name: &str) -> Option<Arc<Segment>> {
        self.segments
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Finished segments in the order they were closed.
    pub fn segments(&self) -> Vec<Arc<Segment>> {
        self.segments.read().clone()
    }

    pub fn summaries(&self) -> Vec<SegmentSummary> {
        self.segments
            .read()
            .iter()
            .map(|s| SegmentSummary::from(s.as_ref()))
            .collect()
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

impl Default for PartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PartSink for PartStore {
    fn part_finalized(&self, part: &Arc<SealedPart>) {
        self.parts.write().insert(part.id(), Arc::clone(part));
        self.notify(StoreEvent::PartFinalized {
            part_id: part.id(),
            bytes: part.content().len(),
            independent: part.is_independent(),
        });
    }
}

impl SegmentSink for PartStore {
    fn segment_finalized(&self, segment: Arc<Segment>) {
        let event = StoreEvent::SegmentFinalized {
            name: segment.name(),
            parts: segment.parts().len(),
            duration_ms: segment.rendered_duration().as_millis() as u64,
        };
        self.segments.write().push(segment);
        self.notify(event);
    }
}
