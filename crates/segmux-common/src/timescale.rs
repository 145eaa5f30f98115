//! Conversions between wall durations and media clock ticks.

use std::time::Duration;

/// Clock rate used for H.264 tracks.
pub const VIDEO_TIMESCALE: u32 = 90_000;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Convert a duration to ticks of a `timescale` Hz clock, rounding to the
/// nearest tick.
pub fn duration_to_ticks(d: Duration, timescale: u32) -> u64 {
    ((d.as_nanos() * timescale as u128 + NANOS_PER_SEC / 2) / NANOS_PER_SEC) as u64
}

/// Convert ticks of a `timescale` Hz clock back to a duration.
pub fn ticks_to_duration(ticks: u64, timescale: u32) -> Duration {
    if timescale == 0 {
        return Duration::ZERO;
    }
    let nanos = ticks as u128 * NANOS_PER_SEC / timescale as u128;
    Duration::from_nanos(nanos as u64)
}
