#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
//! `glyco`: run the decision engine from the command line.

mod audit_file;
mod cli;
mod error_fmt;
mod logging;
mod run;

use clap::Parser;
use eyre::Result;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn dispatch(cli: Cli) -> Result<()> {
    let cfg = run::load_config(cli.config.as_deref())?;
    logging::init_tracing(&cli.log_level, cli.json, &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "configuration loaded");

    match cli.cmd {
        Commands::Advise {
            history,
            iob,
            now_ms,
            night,
        } => run::run_advise(&cfg, &history, iob, now_ms, night, cli.json),
        Commands::Replay { trace, audit } => run::run_replay(&cfg, &trace, audit, cli.json),
        Commands::SelfCheck => run::run_self_check(&cfg, cli.config.as_deref(), cli.json),
    }
}

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = dispatch(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}
