//! Per-channel configuration and runtime state.

use crate::catalog::StageSpec;
use crate::units::UnitConverter;

/// Fixed configuration of one channel. `stage == None` marks it absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    pub index: u8,
    pub stage: Option<StageSpec>,
    pub reversed: bool,
}

impl ChannelConfig {
    pub fn absent(index: u8) -> Self {
        Self {
            index,
            stage: None,
            reversed: false,
        }
    }

    pub fn active(index: u8, stage: StageSpec, reversed: bool) -> Self {
        Self {
            index,
            stage: Some(stage),
            reversed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage.is_some()
    }

    pub fn converter(&self) -> Option<UnitConverter> {
        self.stage
            .as_ref()
            .map(|s| UnitConverter::new(s, self.reversed))
    }
}

/// Last known state of a channel, as seen by the controller.
///
/// `target_encoder_counts` is `Some` exactly while a move is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelRuntime {
    pub(crate) last_encoder_counts: i32,
    pub(crate) last_position_um: f64,
    pub(crate) target_encoder_counts: Option<i32>,
}

impl ChannelRuntime {
    pub fn last_encoder_counts(&self) -> i32 {
        self.last_encoder_counts
    }

    pub fn last_position_um(&self) -> f64 {
        self.last_position_um
    }

    pub fn target_encoder_counts(&self) -> Option<i32> {
        self.target_encoder_counts
    }

    pub fn in_flight(&self) -> bool {
        self.target_encoder_counts.is_some()
    }

    /// Store a fresh encoder reading and the position it converts to.
    pub(crate) fn record(&mut self, counts: i32, conv: &UnitConverter) {
        self.last_encoder_counts = counts;
        self.last_position_um = conv.to_position_um(counts);
    }
}
