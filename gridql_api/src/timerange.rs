use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Timerange is a half-open aligned time window with a resolution, all in
/// milliseconds. Invariants, enforced at construction:
///
/// - `resolution > 0`
/// - `start <= end`
/// - `(end - start) % resolution == 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timerange {
    start: i64,
    end: i64,
    resolution: i64,
}

impl Timerange {
    pub fn new(start: i64, end: i64, resolution: i64) -> ApiResult<Timerange> {
        if resolution <= 0 {
            return Err(ApiError::InvalidTimerange(format!(
                "resolution must be positive; got {resolution}"
            )));
        }
        if start > end {
            return Err(ApiError::InvalidTimerange(format!(
                "start {start} is after end {end}"
            )));
        }
        if (end - start) % resolution != 0 {
            return Err(ApiError::InvalidTimerange(format!(
                "timerange [{start}, {end}] is not aligned to resolution {resolution}"
            )));
        }
        Ok(Timerange {
            start,
            end,
            resolution,
        })
    }

    /// Snaps `start` down and `end` to the nearest multiple of `resolution`
    /// before constructing. Snapping is idempotent.
    pub fn new_snapped(start: i64, end: i64, resolution: i64) -> ApiResult<Timerange> {
        if resolution <= 0 {
            return Err(ApiError::InvalidTimerange(format!(
                "resolution must be positive; got {resolution}"
            )));
        }
        Timerange::new(
            snap_down(start, resolution),
            snap_nearest(end, resolution),
            resolution,
        )
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    /// The number of slots in the output grid.
    pub fn slots(&self) -> usize {
        ((self.end - self.start) / self.resolution + 1) as usize
    }

    /// Two timeranges are compatible iff their resolutions are equal.
    pub fn compatible_with(&self, other: &Timerange) -> bool {
        self.resolution == other.resolution
    }

    /// Materializes the grid timestamps, one per slot.
    pub fn slot_timestamps(&self) -> Vec<i64> {
        (0..self.slots() as i64)
            .map(|i| self.start + i * self.resolution)
            .collect()
    }
}

fn snap_down(timestamp: i64, resolution: i64) -> i64 {
    timestamp.div_euclid(resolution) * resolution
}

fn snap_nearest(timestamp: i64, resolution: i64) -> i64 {
    (timestamp + resolution / 2).div_euclid(resolution) * resolution
}
