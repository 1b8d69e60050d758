//! Encoder counts <-> micrometers for one channel.

use tracing::trace;

use crate::catalog::StageSpec;

/// Per-channel conversion between encoder counts and physical position.
///
/// `to_position_um` and `to_counts` are not exact inverses: a round trip
/// through counts lands within half a count of the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    scale_um_per_count: f64,
    reversed: bool,
}

/// Map `-0.0` to `+0.0`, leave everything else alone.
#[inline]
fn positive_zero(x: f64) -> f64 {
    if x == 0.0 { 0.0 } else { x }
}

impl UnitConverter {
    pub fn new(stage: &StageSpec, reversed: bool) -> Self {
        Self {
            scale_um_per_count: stage.scale_um_per_count(),
            reversed,
        }
    }

    /// Encoder counts to micrometers. Zero always maps to `+0.0`.
    pub fn to_position_um(&self, counts: i32) -> f64 {
        let um = f64::from(counts) * self.scale_um_per_count;
        let um = positive_zero(if self.reversed { -um } else { um });
        trace!(counts, um, "counts -> um");
        um
    }

    /// Micrometers to the nearest encoder count (ties to even).
    ///
    /// Values beyond the `i32` range saturate.
    pub fn to_counts(&self, um: f64) -> i32 {
        let counts = (um / self.scale_um_per_count).round_ties_even();
        let counts = if self.reversed { -counts } else { counts };
        // `as` saturates and maps NaN to 0.
        let counts = counts as i32;
        trace!(um, counts, "um -> counts");
        counts
    }

    /// Snap `um` to the nearest representable position.
    ///
    /// Returns the count that will be sent and the position it stands for.
    pub fn legalize(&self, um: f64) -> (i32, f64) {
        let counts = self.to_counts(um);
        (counts, self.to_position_um(counts))
    }
}
