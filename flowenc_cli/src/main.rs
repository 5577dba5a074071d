#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `flowenc`: virtual quadrature encoder CLI.

mod cli;
mod error_fmt;
mod logging;
#[cfg(unix)]
mod rt;
mod run;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use flowenc_core::error::Result;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    // Clap exits with code 2 on usage errors before anything else runs.
    let cli = Cli::parse();
    let _ = color_eyre::install();
    let _ = JSON_MODE.set(cli.json);

    let cfg = run::load_config(&cli.config);
    logging::init(cli.json, &cli.log_level, cfg.as_ref().ok().map(|c| &c.logging));

    let result = cfg.and_then(|cfg| dispatch(&cli, &cfg));
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            std::process::exit(exit_code_for_error(&e));
        }
    }
}

fn dispatch(cli: &Cli, cfg: &flowenc_config::Config) -> Result<()> {
    let scale = run::load_pixel_scale(cli.calibration.as_deref())?;

    match &cli.cmd {
        Commands::Health => {
            run::calibration_for(cfg, scale.as_ref())?;
            if cli.json {
                println!("{}", serde_json::json!({ "status": "ok" }));
            } else {
                println!("ok");
            }
            Ok(())
        }
        Commands::SelfCheck { simulate } => {
            let (dx, dy) = run::self_check(cfg, *simulate)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "status": "ok", "dx": dx, "dy": dy })
                );
            } else {
                println!("self-check ok: dx={dx} dy={dy}");
            }
            Ok(())
        }
        Commands::Run {
            cycles,
            simulate,
            stats,
            report_ms,
            rt,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                tracing::warn!(error = %e, "could not install Ctrl-C handler");
            }
            let args = run::RunArgs {
                cycles: *cycles,
                simulate: *simulate,
                stats: *stats,
                report_ms: *report_ms,
                rt: *rt,
            };
            let summary = run::run_encoder(cfg, scale.as_ref(), &args, shutdown)?;
            run::print_summary(&summary, cfg.encoder.pulses_per_rev, cli.json, *stats);
            Ok(())
        }
    }
}
