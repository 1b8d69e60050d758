//! Stage models known to the controller, keyed by model name.

use std::collections::BTreeMap;

use crate::error::BuildError;

/// Physical scale and symmetric travel of one stage model.
///
/// Both values are strictly positive and finite; `new` is the only way to
/// build one outside this module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSpec {
    scale_um_per_count: f64,
    limit_um: f64,
}

impl StageSpec {
    pub fn new(scale_um_per_count: f64, limit_um: f64) -> Result<Self, BuildError> {
        if !(scale_um_per_count.is_finite() && scale_um_per_count > 0.0) {
            return Err(BuildError::InvalidConfig(
                "stage scale must be finite and > 0",
            ));
        }
        if !(limit_um.is_finite() && limit_um > 0.0) {
            return Err(BuildError::InvalidConfig(
                "stage limit must be finite and > 0",
            ));
        }
        Ok(Self {
            scale_um_per_count,
            limit_um,
        })
    }

    /// Micrometers per encoder count.
    #[inline]
    pub fn scale_um_per_count(&self) -> f64 {
        self.scale_um_per_count
    }

    /// Travel limit; positions are legal in `[-limit_um, limit_um]`.
    #[inline]
    pub fn limit_um(&self) -> f64 {
        self.limit_um
    }
}

/// Models the controller ships with: (name, um per count, +/- limit um).
pub const BUILTIN_STAGES: [(&str, f64, f64); 5] = [
    ("ZFM2020", 0.2116667, 12_700.0),
    ("ZFM2030", 0.2116667, 12_700.0),
    ("MMP-2XY", 0.5, 25_400.0),
    ("PLS-X", 0.2116667, 12_700.0),
    ("PLS-XY", 0.2116667, 12_700.0),
];

#[derive(Debug, Clone)]
pub struct StageCatalog {
    entries: BTreeMap<String, StageSpec>,
}

impl Default for StageCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StageCatalog {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let entries = BUILTIN_STAGES
            .iter()
            .map(|(name, scale, limit)| {
                (
                    (*name).to_string(),
                    StageSpec {
                        scale_um_per_count: *scale,
                        limit_um: *limit,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Add a model, returning the spec it replaced.
    pub fn insert(&mut self, name: impl Into<String>, spec: StageSpec) -> Option<StageSpec> {
        self.entries.insert(name.into(), spec)
    }

    pub fn lookup(&self, name: &str) -> Option<StageSpec> {
        self.entries.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageSpec)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
