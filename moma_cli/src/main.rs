#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `moma`: force-guided mobile manipulation against the simulated robot.

mod cli;
mod error_fmt;
mod session;
mod trajectory;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use moma_config::{Config, Logging};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::session::RunOptions;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            tracing::debug!("{e:?}");
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    // flushes the log file when dropped
    let _file_guard = init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    if !cli.json {
        color_eyre::install()?;
    }

    match cli.cmd {
        Commands::Run {
            duration_ms,
            skip_calibration,
            align,
            trajectory,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install Ctrl-C handler")?;

            let opts = RunOptions {
                duration_ms,
                skip_calibration,
                align,
                trajectory,
            };
            let report = session::run_session(&cfg, &opts, &shutdown)?;
            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!("{}", report.render_human());
            }
        }
        Commands::Check => {
            let report = session::check(&cfg)?;
            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!("{}", report.render_human());
            }
        }
        Commands::Profile { until, step } => {
            for sample in session::profile_samples(&cfg, until, step)? {
                println!("{}", serde_json::to_string(&sample)?);
            }
        }
    }
    Ok(())
}

/// Built-in defaults when no file is given; validated either way.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let cfg = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("read config {}", path.display()))?;
            moma_config::load_toml(&text)
                .wrap_err_with(|| format!("parse config {}", path.display()))?
        }
        None => Config::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn init_tracing(
    json: bool,
    level: &str,
    logging: &Logging,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    // RUST_LOG wins over --log-level
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid --log-level '{level}'"))?;
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let mut guard = None;
    let file = match &logging.file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file must name a file"))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
                .wrap_err("invalid logging.level")?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(guard)
}
