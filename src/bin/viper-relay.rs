// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use viper_relay_gateway::{
    cli::{load_config, run, Cli, CliError, EXIT_CONFIG, EXIT_NETWORK},
    relay::{CallContext, ReqwestPost},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = match load_config(&cli, |name| std::env::var(name).ok()) {
        Ok(config) => config,
        Err(e) => return fail(CliError::from(e)),
    };
    init_tracing(config.log_format);

    let http = match ReqwestPost::new() {
        Ok(http) => Arc::new(http),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_NETWORK);
        }
    };

    let relay = &config.relay;
    let ctx = CallContext::new()
        .with_timeout(relay.request_timeout * relay.max_attempts.saturating_add(1));

    let outcome = tokio::select! {
        outcome = run(&cli, &config, http, &ctx) => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling relay");
            ctx.cancel();
            return ExitCode::from(EXIT_NETWORK);
        }
    };

    match outcome {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn fail(err: CliError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err.exit_code())
}
