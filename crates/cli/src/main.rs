// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use agentmux::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.uninstall {
        std::process::exit(agentmux::uninstall::run(&cli));
    }

    match agentmux::run::run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {err:#}");
            std::process::exit(1);
        }
    }
}
