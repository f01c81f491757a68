// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the routing engine.
//!
//! The router never lets an error escape to a client: every handled frame
//! resolves to a well-formed response. These codes exist for logging and for
//! picking the next step in the sign/list state machines, not for wire
//! encoding.

use std::fmt;

/// Router-internal error taxonomy (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentError {
    /// Protocol violation on either pipe. Not fatal — closes the connection.
    MalformedFrame,
    /// Could not open the backend pipe within the connect timeout.
    NotConnected,
    /// Backend reached, replied with `failure`. Never cached.
    SignRefused,
    /// Process enumeration, termination, or launch failed.
    ProcessControlFailure,
    /// Writing the configuration file failed.
    PersistenceFailure,
    /// Shutdown requested mid-operation.
    Cancelled,
}

impl AgentError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::NotConnected => "NOT_CONNECTED",
            Self::SignRefused => "SIGN_REFUSED",
            Self::ProcessControlFailure => "PROCESS_CONTROL_FAILURE",
            Self::PersistenceFailure => "PERSISTENCE_FAILURE",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// True for errors that should poison the (fingerprint, backend) failure
    /// cache. Only connection failures qualify (spec §4.6, §8).
    pub fn is_cacheable_connection_failure(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
