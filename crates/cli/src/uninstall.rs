// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `--uninstall` / `--reset` (spec §6). Environment-variable
//! installation/uninstallation itself is out of scope (spec §1); this
//! removes the one piece of persisted state this binary owns.

use crate::cli::Cli;
use crate::run::resolve_config_path;

/// Returns the process exit code (spec §6: "0 on clean termination,
/// non-zero on startup refusal").
pub fn run(cli: &Cli) -> i32 {
    let path = match resolve_config_path(cli) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };

    match std::fs::remove_file(&path) {
        Ok(()) => {
            println!("removed {}", path.display());
            0
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            println!("no configuration found at {}", path.display());
            0
        }
        Err(err) => {
            eprintln!("error: failed to remove {}: {err}", path.display());
            1
        }
    }
}
