// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface (spec §6 "CLI surface (UI collaborator, out of
//! scope but standardized)"). The UI this spec defers to is out of scope;
//! the two flags it standardizes are not.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "agentmux", version, about = "SSH agent multiplexer for Windows credential managers.")]
pub struct Cli {
    /// Path to the persisted JSON configuration document. Defaults to
    /// `%APPDATA%\ssh-agent-proxy\config.json`.
    #[arg(long, env = "AGENTMUX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Remove the persisted configuration and exit.
    #[arg(long, alias = "reset")]
    pub uninstall: bool,
}
