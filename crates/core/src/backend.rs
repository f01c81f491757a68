// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend configuration and the short-lived backend client (spec §3, §4.2).

use std::sync::Arc;
use std::time::Duration;

use crate::codec::{
    self, Frame, SSH_AGENTC_REQUEST_IDENTITIES, SSH_AGENTC_SIGN_REQUEST, SSH_AGENT_IDENTITIES_ANSWER,
    SSH_AGENT_SIGN_RESPONSE,
};
use crate::error::AgentError;
use crate::identity::Identity;
use crate::transport::PipeConnector;

/// Connect timeout for the shared backend pipe (spec §4.2).
pub const BACKEND_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Immutable configuration record for one backend (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    pub name: String,
    pub process_name: String,
    pub executable_path: String,
    pub priority: i32,
    /// True for a backend that acquires the shared pipe the moment it
    /// starts and only prompts for unlock when identities are listed, not
    /// when it is merely running (the Bitwarden-shaped case in spec §4.7's
    /// startup-detection heuristic). False for a backend that can list
    /// without ever unlocking (the 1Password-shaped case). This is the
    /// per-backend idiosyncrasy spec §1(e) calls out; the two-backend
    /// heuristic in [`crate::router`] degrades to `current_backend = None`
    /// once more than one `steals_pipe_on_start` backend is running, per
    /// spec §9's instruction never to pin a wrong guess.
    pub steals_pipe_on_start: bool,
}

/// Sort a backend list in priority order (lower sorts first), as every
/// scan/switch-order operation in the router requires (spec §4.7).
pub fn sorted_by_priority(backends: &[BackendSpec]) -> Vec<BackendSpec> {
    let mut sorted = backends.to_vec();
    sorted.sort_by_key(|b| b.priority);
    sorted
}

/// A single-use connector to the shared backend pipe. Every method opens its
/// own connection; the router must not assume two calls reach the same
/// process (spec §4.2).
pub struct BackendClient {
    connector: Arc<dyn PipeConnector>,
    backend_pipe_name: String,
}

impl BackendClient {
    pub fn new(connector: Arc<dyn PipeConnector>, backend_pipe_name: impl Into<String>) -> Self {
        Self { connector, backend_pipe_name: backend_pipe_name.into() }
    }

    async fn connect(&self) -> Result<Box<dyn crate::transport::AgentStream>, AgentError> {
        self.connector
            .connect(&self.backend_pipe_name, BACKEND_CONNECT_TIMEOUT)
            .await
            .map_err(|_| AgentError::NotConnected)
    }

    /// Request the backend's identity list. Any response other than
    /// `identities-answer` is treated as "no identities" (spec §4.2).
    pub async fn request_identities(&self) -> Result<Vec<Identity>, AgentError> {
        let mut stream = self.connect().await?;
        codec::write_frame(&mut stream, SSH_AGENTC_REQUEST_IDENTITIES, &[])
            .await
            .map_err(|_| AgentError::NotConnected)?;
        let frame = codec::read_frame(&mut stream).await?;
        match frame {
            Some(Frame { msg_type: SSH_AGENT_IDENTITIES_ANSWER, payload }) => {
                codec::parse_identities_answer(&payload)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Sign `data` with `key_blob`. Any response other than `sign-response`
    /// yields `Ok(None)`. A connection failure yields `Err(NotConnected)`.
    pub async fn sign(
        &self,
        key_blob: &[u8],
        data: &[u8],
        flags: u32,
    ) -> Result<Option<Vec<u8>>, AgentError> {
        let mut stream = self.connect().await?;
        let payload = codec::encode_sign_request(key_blob, data, flags);
        codec::write_frame(&mut stream, SSH_AGENTC_SIGN_REQUEST, &payload)
            .await
            .map_err(|_| AgentError::NotConnected)?;
        let frame = codec::read_frame(&mut stream).await?;
        match frame {
            Some(Frame { msg_type: SSH_AGENT_SIGN_RESPONSE, payload }) => {
                let sig = codec::parse_sign_response(&payload)?;
                Ok(Some(sig))
            }
            _ => Ok(None),
        }
    }

    /// Opaque one-shot round trip for message types the router doesn't
    /// interpret (spec §4.2, §4.7).
    pub async fn forward(&self, request: &Frame) -> Result<Option<Frame>, AgentError> {
        let mut stream = self.connect().await?;
        codec::write_frame(&mut stream, request.msg_type, &request.payload)
            .await
            .map_err(|_| AgentError::NotConnected)?;
        codec::read_frame(&mut stream).await
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
