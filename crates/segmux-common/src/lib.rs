//! Segmux-Common: shared identifiers and timing helpers.
//!
//! - **Typed IDs**: numeric newtypes for segments and parts, plus the
//!   [`PartIdAllocator`] capability used to number new parts.
//! - **Timescale**: conversions between [`std::time::Duration`] and media
//!   clock ticks.
//!
//! # Examples
//!
//! ```
//! use segmux_common::{PartIdAllocator, SequentialIds};
//!
//! let ids = SequentialIds::new();
//! assert_eq!(ids.next_part_id().get(), 0);
//! assert_eq!(ids.next_part_id().get(), 1);
//! ```

pub mod ids;
pub mod timescale;

pub use ids::*;
pub use timescale::{duration_to_ticks, ticks_to_duration, VIDEO_TIMESCALE};
