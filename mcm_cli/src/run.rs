//! Controller assembly and command execution.

use std::time::Duration;

use eyre::WrapErr;
use mcm_core::{ControllerBuilder, StageCatalog, StageController};
use mcm_traits::Transport;
use serde_json::json;

use crate::cli::Commands;

pub type DynTransport = Box<dyn Transport + Send>;

/// Built-in models, then `[[stage_models]]`, then the CSV; later entries win.
pub fn assemble_catalog(
    cfg: &mcm_config::Config,
    csv: &[mcm_config::StageModel],
) -> mcm_core::error::Result<StageCatalog> {
    let mut catalog = StageCatalog::builtin();
    catalog.extend_models(&cfg.stage_models)?;
    catalog.extend_models(csv)?;
    Ok(catalog)
}

#[cfg(feature = "hardware")]
pub fn open_transport(cfg: &mcm_config::Config) -> eyre::Result<DynTransport> {
    let name = cfg
        .port
        .name
        .as_deref()
        .ok_or_else(|| eyre::eyre!("no serial port configured; set [port].name or pass --port"))?;
    let port = mcm_hardware::SerialTransport::open(
        name,
        cfg.port.baud_rate,
        Duration::from_millis(cfg.port.read_timeout_ms),
    )
    .map_err(|e| eyre::Report::new(mcm_core::hw_error::map_open_error(&e)))?;
    Ok(Box::new(port))
}

/// Simulated controller. `MCM_SIM_STEP` limits encoder travel per read;
/// `MCM_SIM_STALL` freezes one channel.
#[cfg(not(feature = "hardware"))]
pub fn open_transport(_cfg: &mcm_config::Config) -> eyre::Result<DynTransport> {
    let mut sim = mcm_hardware::SimulatedMcm3000::new();
    if let Ok(step) = std::env::var("MCM_SIM_STEP") {
        let step: u32 = step
            .parse()
            .wrap_err_with(|| format!("MCM_SIM_STEP must be a count, got {step:?}"))?;
        sim = sim.with_step_per_read(step);
    }
    if let Ok(ch) = std::env::var("MCM_SIM_STALL") {
        let ch: usize = ch
            .parse()
            .wrap_err_with(|| format!("MCM_SIM_STALL must be a channel index, got {ch:?}"))?;
        sim = sim.with_stalled_channel(ch);
    }
    tracing::info!("using simulated controller (built without the `hardware` feature)");
    Ok(Box::new(sim))
}

pub fn build_controller(
    cfg: &mcm_config::Config,
    catalog: StageCatalog,
    transport: DynTransport,
) -> mcm_core::error::Result<StageController<DynTransport>> {
    ControllerBuilder::new()
        .apply_config(cfg)?
        .with_catalog(catalog)
        .with_transport(transport)
        .build()
}

/// Effective wait for a `move`: explicit flag, then config, else none.
pub fn move_wait(
    cfg: &mcm_config::Config,
    timeout_ms: Option<u64>,
    no_wait: bool,
) -> Option<Duration> {
    if no_wait {
        return None;
    }
    timeout_ms
        .or(cfg.motion.move_timeout_ms)
        .map(Duration::from_millis)
}

/// Print one result line, as JSON or as text.
fn emit(json_mode: bool, value: serde_json::Value, text: String) {
    if json_mode {
        println!("{value}");
    } else {
        println!("{text}");
    }
}

pub fn list_stages(catalog: &StageCatalog, json_mode: bool) {
    if json_mode {
        let stages: Vec<_> = catalog
            .iter()
            .map(|(name, s)| {
                json!({
                    "name": name,
                    "um_per_count": s.scale_um_per_count(),
                    "limit_um": s.limit_um(),
                })
            })
            .collect();
        println!("{}", json!({ "stages": stages }));
        return;
    }
    println!("{:<12} {:>12} {:>12}", "model", "um/count", "+/-limit um");
    for (name, s) in catalog.iter() {
        println!(
            "{:<12} {:>12.7} {:>12.1}",
            name,
            s.scale_um_per_count(),
            s.limit_um()
        );
    }
}

pub fn execute(
    ctrl: &mut StageController<DynTransport>,
    cfg: &mcm_config::Config,
    cmd: &Commands,
    json_mode: bool,
) -> mcm_core::error::Result<()> {
    match *cmd {
        Commands::Position { channel } => {
            let um = ctrl.position_um(channel)?;
            emit(
                json_mode,
                json!({ "channel": channel, "position_um": um }),
                format!("channel {channel}: {um:.3} um"),
            );
        }
        Commands::Counts { channel } => {
            let counts = ctrl.position_encoder_counts(channel)?;
            emit(
                json_mode,
                json!({ "channel": channel, "counts": counts }),
                format!("channel {channel}: {counts} counts"),
            );
        }
        Commands::Limits { channel } => {
            let (lo, hi) = ctrl.position_limits_um(channel)?;
            emit(
                json_mode,
                json!({ "channel": channel, "min_um": lo, "max_um": hi }),
                format!("channel {channel}: {lo:.1} .. {hi:.1} um"),
            );
        }
        Commands::Move {
            channel,
            um,
            relative,
            timeout_ms,
            no_wait,
        } => {
            let wait = move_wait(cfg, timeout_ms, no_wait);
            let legal = ctrl.move_um(channel, um, relative, wait)?;
            let arrived = wait.is_some();
            emit(
                json_mode,
                json!({
                    "channel": channel,
                    "commanded_um": legal,
                    "arrived": arrived,
                }),
                if arrived {
                    format!("channel {channel}: moved to {legal:.3} um")
                } else {
                    format!("channel {channel}: moving to {legal:.3} um")
                },
            );
        }
        Commands::Zero { channel, yes } => {
            if !yes {
                eyre::bail!(
                    "zeroing redefines the origin of channel {channel}; pass --yes to confirm"
                );
            }
            ctrl.zero_encoder(channel)?;
            emit(
                json_mode,
                json!({ "channel": channel, "counts": 0 }),
                format!("channel {channel}: encoder zeroed"),
            );
        }
        Commands::SelfCheck => {
            let active: Vec<u8> = ctrl.channels().collect();
            let mut report = Vec::with_capacity(active.len());
            for channel in active {
                let um = ctrl.position_um(channel)?;
                report.push((channel, um));
            }
            if json_mode {
                let channels: Vec<_> = report
                    .iter()
                    .map(|(ch, um)| json!({ "channel": ch, "position_um": um }))
                    .collect();
                println!("{}", json!({ "ok": true, "channels": channels }));
            } else {
                for (ch, um) in &report {
                    println!("channel {ch}: {um:.3} um");
                }
                println!("ok");
            }
        }
        Commands::Stages => {
            // handled before a device is opened
        }
    }
    Ok(())
}
