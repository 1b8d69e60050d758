mod cli;
mod error_fmt;
mod run;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    // Flushes the log file when dropped, so it must outlive the command.
    let mut file_guard = None;
    if let Err(err) = real_main(cli, &mut file_guard) {
        tracing::debug!(error = ?err, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        drop(file_guard);
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli, file_guard: &mut Option<WorkerGuard>) -> eyre::Result<()> {
    let mut cfg = load_config(&cli.config)?;
    if let Some(port) = &cli.port {
        cfg.port.name = Some(port.clone());
    }
    *file_guard = init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let csv_models = match &cli.stages_csv {
        Some(path) => mcm_config::load_stage_models_csv(path)?,
        None => Vec::new(),
    };
    let catalog = run::assemble_catalog(&cfg, &csv_models)?;

    if !cli.cmd.needs_device() {
        run::list_stages(&catalog, cli.json);
        return Ok(());
    }

    let transport = run::open_transport(&cfg)?;
    let mut ctrl = run::build_controller(&cfg, catalog, transport)?;
    let result = run::execute(&mut ctrl, &cfg, &cli.cmd, cli.json);
    // Report the command's own error ahead of a failure to close.
    match (result, ctrl.close()) {
        (Err(e), _) => Err(e),
        (Ok(()), close) => close,
    }
}

fn load_config(path: &Path) -> eyre::Result<mcm_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = mcm_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Console logs go to stderr so stdout carries only results.
fn init_tracing(cli: &Cli, logging: &mcm_config::Logging) -> eyre::Result<Option<WorkerGuard>> {
    let level = cli
        .log_level
        .as_deref()
        .or(logging.level.as_deref())
        .unwrap_or("warn");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let mut guard = None;
    let file = match &logging.file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(guard)
}
