// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows process control (spec §4.4).
//!
//! Enumeration and cross-session termination shell out to PowerShell's CIM
//! cmdlets (`Get-CimInstance` / `Invoke-CimMethod -MethodName Terminate`) —
//! spec §9 is explicit that the contract, not the mechanism, is normative,
//! and names this as the reference mechanism (SPEC_FULL.md §D.4).
//! `tokio::process::Command` is already pulled in through `tokio`'s `full`
//! feature, so no new dependency is needed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::sleep;

use agentmux_core::{AgentError, ProcessController};

const DETACHED_PROCESS: u32 = 0x0000_0008;
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Total time to wait for a terminated process to actually vanish before
/// giving up and logging (spec §4.4).
const TERMINATE_POLL_BUDGET: Duration = Duration::from_secs(5);
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct WindowsProcessController;

impl WindowsProcessController {
    async fn run_powershell(&self, script: &str) -> Result<std::process::Output, AgentError> {
        Command::new("powershell.exe")
            .args(["-NoProfile", "-NonInteractive", "-Command", script])
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "failed to spawn powershell.exe");
                AgentError::ProcessControlFailure
            })
    }
}

#[async_trait]
impl ProcessController for WindowsProcessController {
    async fn is_running(&self, process_name: &str) -> Result<bool, AgentError> {
        let script = format!(
            "(Get-CimInstance -ClassName Win32_Process -Filter \"Name='{}'\" | Measure-Object).Count",
            escape_filter(process_name)
        );
        let output = self.run_powershell(&script).await?;
        let count: u64 = String::from_utf8_lossy(&output.stdout).trim().parse().unwrap_or(0);
        Ok(count > 0)
    }

    async fn terminate(&self, process_name: &str) -> Result<(), AgentError> {
        let script = format!(
            "Get-CimInstance -ClassName Win32_Process -Filter \"Name='{}'\" | Invoke-CimMethod -MethodName Terminate",
            escape_filter(process_name)
        );
        if let Err(err) = self.run_powershell(&script).await {
            tracing::warn!(error = %err, process = process_name, "terminate invocation failed");
        }

        let mut waited = Duration::ZERO;
        while waited < TERMINATE_POLL_BUDGET {
            if !self.is_running(process_name).await.unwrap_or(false) {
                return Ok(());
            }
            sleep(TERMINATE_POLL_INTERVAL).await;
            waited += TERMINATE_POLL_INTERVAL;
        }
        tracing::warn!(process = process_name, "still running after the termination poll budget");
        Ok(())
    }

    async fn launch_detached(&self, process_name: &str, exe_path: &str) -> Result<(), AgentError> {
        if self.is_running(process_name).await.unwrap_or(false) {
            return Ok(());
        }

        let is_bare_command = !exe_path.contains(['\\', '/']);
        if !is_bare_command && tokio::fs::metadata(exe_path).await.is_err() {
            tracing::warn!(path = exe_path, "backend executable not found, skipping launch");
            return Ok(());
        }

        // DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP: the child survives
        // this process's exit and isn't reaped with it (spec §4.4).
        // kill_on_drop(false) is tokio's default, stated explicitly here
        // because surviving our own exit is the entire point of this call.
        match Command::new(exe_path)
            .creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
            .kill_on_drop(false)
            .spawn()
        {
            Ok(_child) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, path = exe_path, "failed to launch backend");
                Err(AgentError::ProcessControlFailure)
            }
        }
    }
}

fn escape_filter(process_name: &str) -> String {
    process_name.replace('\'', "''")
}
