//! Typed numeric identifiers for segments and parts.
//!
//! Both are monotonically increasing counters scoped to one muxer instance,
//! so they wrap a `u64` rather than a random UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generate a newtype ID wrapper over `u64`.
macro_rules! numeric_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(u64);

            impl $name {
                /// Wrap a raw counter value.
                #[must_use]
                pub const fn new(value: u64) -> Self {
                    Self(value)
                }

                /// Return the raw counter value.
                #[must_use]
                pub const fn get(self) -> u64 {
                    self.0
                }

                /// The identifier that follows this one.
                #[must_use]
                pub const fn next(self) -> Self {
                    Self(self.0.wrapping_add(1))
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<u64> for $name {
                fn from(value: u64) -> Self {
                    Self(value)
                }
            }

            impl From<$name> for u64 {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

numeric_id! {
    /// Identifier of a segment; its playlist name is `seg<id>`.
    SegmentId,
    /// Identifier of a part, unique across all segments of a stream.
    PartId,
}

impl SegmentId {
    /// Name used by playlist logic to address this segment.
    pub fn name(self) -> String {
        format!("seg{}", self.0)
    }
}

/// Source of fresh part identifiers.
///
/// Segments call this once per part they open. Implementations must hand out
/// strictly increasing values.
pub trait PartIdAllocator: Send + Sync {
    /// Allocate the next part identifier.
    fn next_part_id(&self) -> PartId;
}

/// Process-local [`PartIdAllocator`] backed by an atomic counter.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Counter starting at zero.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Counter whose first allocation returns `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl PartIdAllocator for SequentialIds {
    fn next_part_id(&self) -> PartId {
        PartId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
