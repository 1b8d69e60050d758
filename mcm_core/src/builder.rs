//! Type-state builder for `StageController`.
//!
//! `build()` only exists once a transport has been supplied. Building
//! validates the channel table and motion settings, then reads every active
//! encoder once so the controller starts with real positions.

use std::sync::Arc;

use mcm_traits::Transport;
use mcm_traits::clock::{Clock, MonotonicClock};
use mcm_traits::protocol::CHANNEL_COUNT;
use tracing::info;

use crate::catalog::{StageCatalog, StageSpec};
use crate::channel::{ChannelConfig, ChannelRuntime};
use crate::config::MotionCfg;
use crate::controller::StageController;
use crate::error::{BuildError, Result};

/// Marker for a builder that has no transport yet.
pub struct Missing;

#[derive(Debug, Clone)]
enum ChannelSlot {
    Absent,
    Named { stage: String, reversed: bool },
    Spec { stage: StageSpec, reversed: bool },
}

pub struct ControllerBuilder<T> {
    transport: T,
    name: Option<String>,
    slots: [ChannelSlot; CHANNEL_COUNT],
    slot_error: Option<BuildError>,
    catalog: StageCatalog,
    motion: MotionCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
}

impl Default for ControllerBuilder<Missing> {
    fn default() -> Self {
        Self {
            transport: Missing,
            name: None,
            slots: [ChannelSlot::Absent, ChannelSlot::Absent, ChannelSlot::Absent],
            slot_error: None,
            catalog: StageCatalog::builtin(),
            motion: MotionCfg::default(),
            clock: None,
        }
    }
}

impl ControllerBuilder<Missing> {
    /// Start building a controller.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> ControllerBuilder<T> {
    /// Supply the link to the device.
    pub fn with_transport<U: Transport>(self, transport: U) -> ControllerBuilder<U> {
        ControllerBuilder {
            transport,
            name: self.name,
            slots: self.slots,
            slot_error: self.slot_error,
            catalog: self.catalog,
            motion: self.motion,
            clock: self.clock,
        }
    }

    /// Name shown in log events, e.g. the port name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the stage catalog used to resolve model names.
    pub fn with_catalog(mut self, catalog: StageCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Add or override one model in the catalog.
    pub fn with_stage_model(mut self, name: impl Into<String>, spec: StageSpec) -> Self {
        self.catalog.insert(name, spec);
        self
    }

    fn set_slot(mut self, index: usize, slot: ChannelSlot) -> Self {
        match self.slots.get_mut(index) {
            Some(s) => *s = slot,
            None => {
                self.slot_error.get_or_insert(BuildError::ChannelIndex(index));
            }
        }
        self
    }

    /// Attach a catalog model to a channel. Resolved at build time.
    pub fn with_channel(self, index: usize, stage: &str, reversed: bool) -> Self {
        self.set_slot(
            index,
            ChannelSlot::Named {
                stage: stage.to_string(),
                reversed,
            },
        )
    }

    /// Attach an explicit spec to a channel, bypassing the catalog.
    pub fn with_channel_spec(self, index: usize, stage: StageSpec, reversed: bool) -> Self {
        self.set_slot(index, ChannelSlot::Spec { stage, reversed })
    }

    /// Mark a channel as having no stage.
    pub fn without_channel(self, index: usize) -> Self {
        self.set_slot(index, ChannelSlot::Absent)
    }

    pub fn with_motion(mut self, motion: MotionCfg) -> Self {
        self.motion = motion;
        self
    }

    /// Inject a custom clock (tests, simulations).
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn resolve_channels(&self) -> Result<[ChannelConfig; CHANNEL_COUNT]> {
        if let Some(e) = &self.slot_error {
            return Err(eyre::Report::new(e.clone()));
        }
        let mut out = [
            ChannelConfig::absent(0),
            ChannelConfig::absent(1),
            ChannelConfig::absent(2),
        ];
        for (i, slot) in self.slots.iter().enumerate() {
            let index = i as u8;
            out[i] = match slot {
                ChannelSlot::Absent => ChannelConfig::absent(index),
                ChannelSlot::Named { stage, reversed } => {
                    let spec = self.catalog.lookup(stage).ok_or_else(|| {
                        eyre::Report::new(BuildError::UnknownStage(stage.clone()))
                    })?;
                    ChannelConfig::active(index, spec, *reversed)
                }
                ChannelSlot::Spec { stage, reversed } => {
                    ChannelConfig::active(index, *stage, *reversed)
                }
            };
        }
        if !out.iter().any(ChannelConfig::is_active) {
            return Err(eyre::Report::new(BuildError::NoActiveChannels));
        }
        Ok(out)
    }
}

impl<T: Transport> ControllerBuilder<T> {
    /// Validate, connect and take the initial encoder reading of every active
    /// channel.
    pub fn build(self) -> Result<StageController<T>> {
        let channels = self.resolve_channels()?;
        if self.motion.tolerance_counts == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "tolerance_counts must be >= 1",
            )));
        }
        if self.motion.drain_timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "drain_timeout must be > 0",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        let mut ctrl = StageController {
            transport: self.transport,
            name: self.name.unwrap_or_else(|| "MCM3000".to_string()),
            channels,
            runtime: [ChannelRuntime::default(); CHANNEL_COUNT],
            motion: self.motion,
            clock,
        };

        let active: Vec<u8> = ctrl.channels().collect();
        for channel in &active {
            ctrl.refresh(*channel)?;
        }
        for c in &ctrl.channels {
            if let Some(stage) = c.stage {
                info!(
                    device = %ctrl.name,
                    channel = c.index,
                    reversed = c.reversed,
                    um_per_count = stage.scale_um_per_count(),
                    limit_um = stage.limit_um(),
                    position_um = ctrl.runtime[usize::from(c.index)].last_position_um,
                    "channel ready"
                );
            }
        }
        Ok(ctrl)
    }
}
