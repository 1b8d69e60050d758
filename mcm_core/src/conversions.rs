//! Bridges from `mcm_config` schema types to `mcm_core` runtime types.

use std::time::Duration;

use crate::builder::ControllerBuilder;
use crate::catalog::{StageCatalog, StageSpec};
use crate::config::MotionCfg;
use crate::error::{BuildError, Result};

// ── MotionCfg ────────────────────────────────────────────────────────────────

impl From<&mcm_config::MotionCfg> for MotionCfg {
    fn from(c: &mcm_config::MotionCfg) -> Self {
        Self {
            tolerance_counts: c.tolerance_counts,
            drain_timeout: Duration::from_millis(c.drain_timeout_ms),
            poll_interval: Duration::from_millis(c.poll_interval_ms),
        }
    }
}

// ── Stage models ─────────────────────────────────────────────────────────────

impl TryFrom<&mcm_config::StageModel> for StageSpec {
    type Error = BuildError;
    fn try_from(m: &mcm_config::StageModel) -> std::result::Result<Self, Self::Error> {
        StageSpec::new(m.um_per_count, m.limit_um)
    }
}

impl StageCatalog {
    /// Add every model in `models`, overriding same-named entries.
    pub fn extend_models(&mut self, models: &[mcm_config::StageModel]) -> Result<()> {
        for m in models {
            let spec = StageSpec::try_from(m).map_err(eyre::Report::new)?;
            if self.insert(m.name.clone(), spec).is_some() {
                tracing::debug!(model = %m.name, "stage model overridden");
            }
        }
        Ok(())
    }
}

// ── Whole config ─────────────────────────────────────────────────────────────

impl<T> ControllerBuilder<T> {
    /// Apply channels, extra stage models and motion settings from a loaded
    /// config. Stage names are resolved later, at `build()`.
    pub fn apply_config(mut self, cfg: &mcm_config::Config) -> Result<Self> {
        for m in &cfg.stage_models {
            let spec = StageSpec::try_from(m).map_err(eyre::Report::new)?;
            self = self.with_stage_model(m.name.clone(), spec);
        }
        for (i, entry) in cfg.channels.iter().enumerate() {
            self = match &entry.stage {
                Some(stage) => self.with_channel(i, stage, entry.reversed),
                None => self.without_channel(i),
            };
        }
        if let Some(name) = &cfg.port.name {
            self = self.with_name(format!("MCM3000 ({name})"));
        }
        Ok(self.with_motion(MotionCfg::from(&cfg.motion)))
    }
}
