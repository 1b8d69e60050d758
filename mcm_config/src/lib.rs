#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and stage-model table loading for the stage controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Extra stage models may come from `[[stage_models]]` or a strict-header CSV.
use serde::Deserialize;

/// Number of channel entries a config must declare.
pub const CHANNELS: usize = 3;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PortCfg {
    /// Device path or COM name; may be left out when the CLI passes `--port`.
    pub name: Option<String>,
    pub baud_rate: u32,
    /// Per-read timeout of the serial link (ms).
    pub read_timeout_ms: u64,
}

impl Default for PortCfg {
    fn default() -> Self {
        Self {
            name: None,
            baud_rate: 460_800,
            read_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Default wait for CLI moves; absent means fire-and-forget.
    pub move_timeout_ms: Option<u64>,
    /// Completion wait applied to a pending move before a new one is issued.
    pub drain_timeout_ms: u64,
    /// Encoder counts from target that still count as arrived (>= 1).
    pub tolerance_counts: u32,
    /// Delay between completion polls (0 = back-to-back).
    pub poll_interval_ms: u64,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            move_timeout_ms: None,
            drain_timeout_ms: 5000,
            tolerance_counts: 1,
            poll_interval_ms: 0,
        }
    }
}

/// One `[[channel]]` entry. An empty table marks the channel absent.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ChannelEntry {
    pub stage: Option<String>,
    pub reversed: bool,
}

/// A stage model added to (or overriding) the built-in catalog.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StageModel {
    pub name: String,
    pub um_per_count: f64,
    pub limit_um: f64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub port: PortCfg,
    #[serde(default)]
    pub motion: MotionCfg,
    /// Exactly three entries, in channel order.
    #[serde(rename = "channel")]
    pub channels: Vec<ChannelEntry>,
    #[serde(default)]
    pub stage_models: Vec<StageModel>,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_model(name: &str, um_per_count: f64, limit_um: f64) -> eyre::Result<()> {
    if name.trim().is_empty() {
        eyre::bail!("stage model name must not be empty");
    }
    if !(um_per_count.is_finite() && um_per_count > 0.0) {
        eyre::bail!("stage model {name}: um_per_count must be finite and > 0");
    }
    if !(limit_um.is_finite() && limit_um > 0.0) {
        eyre::bail!("stage model {name}: limit_um must be finite and > 0");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Port
        if self.port.baud_rate == 0 {
            eyre::bail!("port.baud_rate must be > 0");
        }
        if self.port.read_timeout_ms == 0 {
            eyre::bail!("port.read_timeout_ms must be >= 1");
        }
        if let Some(name) = &self.port.name {
            if name.trim().is_empty() {
                eyre::bail!("port.name must not be empty when set");
            }
        }

        // Motion
        if self.motion.tolerance_counts == 0 {
            eyre::bail!("motion.tolerance_counts must be >= 1 (0 can wait forever)");
        }
        if self.motion.drain_timeout_ms == 0 {
            eyre::bail!("motion.drain_timeout_ms must be >= 1");
        }
        if self.motion.move_timeout_ms == Some(0) {
            eyre::bail!("motion.move_timeout_ms must be >= 1 when set");
        }
        if self.motion.poll_interval_ms > 60 * 1000 {
            eyre::bail!("motion.poll_interval_ms is unreasonably large (>60s)");
        }

        // Channels
        if self.channels.len() != CHANNELS {
            eyre::bail!(
                "exactly {CHANNELS} [[channel]] entries are required, got {}",
                self.channels.len()
            );
        }
        if self.channels.iter().all(|c| c.stage.is_none()) {
            eyre::bail!("at least one [[channel]] must name a stage");
        }

        // Stage models
        for m in &self.stage_models {
            check_model(&m.name, m.um_per_count, m.limit_um)?;
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref() {
            if !matches!(rot, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot}");
            }
        }

        Ok(())
    }
}

/// Load extra stage models from CSV.
///
/// Expected headers:
/// name,um_per_count,limit_um
///
/// Example:
/// name,um_per_count,limit_um
/// ZFM2020,0.2116667,12700
pub fn load_stage_models_csv(path: &std::path::Path) -> eyre::Result<Vec<StageModel>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open stage model CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["name", "um_per_count", "limit_um"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "stage model CSV must have headers 'name,um_per_count,limit_um', got: {}",
            actual.join(",")
        );
    }

    let mut models = Vec::new();
    for (idx, rec) in rdr.deserialize::<StageModel>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        check_model(&row.name, row.um_per_count, row.limit_um)
            .map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        models.push(row);
    }
    if models.is_empty() {
        eyre::bail!("stage model CSV {:?} has no rows", path);
    }
    Ok(models)
}
