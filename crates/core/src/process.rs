// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-control abstraction the router is generic over (spec §4.4).
//!
//! The contract, not the mechanism, is normative (spec §9): "kill everything
//! named X, in any session, best-effort" and "launch detached so the
//! router's own exit doesn't reap the child". The binary crate supplies a
//! concrete Windows implementation; this crate only needs the trait to drive
//! the switch/sign state machines against an in-memory double.

use async_trait::async_trait;

use crate::error::AgentError;

/// Enumerates, terminates, and launches backend processes (spec §4.4).
///
/// Every method is best-effort: a [`ProcessControlFailure`] is logged by the
/// caller and the state machine continues rather than aborting the request.
///
/// [`ProcessControlFailure`]: AgentError::ProcessControlFailure
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// True if at least one process named `process_name` is currently running.
    async fn is_running(&self, process_name: &str) -> Result<bool, AgentError>;

    /// Terminate every process named `process_name`, in any session.
    /// Polls for up to 5s for the process to vanish; logs and returns
    /// normally (not an error) if it does not (spec §4.4).
    async fn terminate(&self, process_name: &str) -> Result<(), AgentError>;

    /// Launch `process_name` from `exe_path` detached from the router's own
    /// process tree, unless it is already running. A bare command (no path
    /// separator) is resolved via `PATH`; an absolute/relative path that
    /// doesn't exist on disk is logged and skipped rather than attempted
    /// (spec §4.4).
    async fn launch_detached(&self, process_name: &str, exe_path: &str) -> Result<(), AgentError>;
}
