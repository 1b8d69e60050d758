//! Runtime motion settings for the controller.
//!
//! Separate from the TOML-deserialized schema in `mcm_config`; see
//! `conversions` for the mapping.

use std::time::Duration;

/// Completion-wait tuning shared by every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionCfg {
    /// A move has arrived once `|target - current| <= tolerance_counts`.
    /// Must be >= 1; exact equality may never be observed.
    pub tolerance_counts: u32,
    /// Wait applied to a still-pending move before a new move is sent.
    pub drain_timeout: Duration,
    /// Delay between completion polls. Zero polls back-to-back.
    pub poll_interval: Duration,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            tolerance_counts: 1,
            drain_timeout: Duration::from_secs(5),
            poll_interval: Duration::ZERO,
        }
    }
}
