// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstractions the routing engine is generic over.
//!
//! The engine never touches a Windows named pipe directly — the binary
//! crate supplies concrete implementations of these traits (backed by
//! `tokio::net::windows::named_pipe`) so this crate stays testable with an
//! in-memory double on any host OS.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream to either pipe.
pub trait AgentStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AgentStream for T {}

/// Context about the peer on the front pipe, obtained via the OS pipe API
/// (spec §4.3). `pid` feeds the optional connection-hint enrichment; the
/// router treats the hint itself as opaque.
#[derive(Debug, Clone, Default)]
pub struct PeerContext {
    pub peer_pid: Option<u32>,
}

/// Connects to the shared backend pipe on demand (spec §4.2). Each call
/// opens a fresh connection — the router must never assume two calls land on
/// the same backend process.
#[async_trait]
pub trait PipeConnector: Send + Sync {
    async fn connect(
        &self,
        pipe_name: &str,
        timeout: Duration,
    ) -> std::io::Result<Box<dyn AgentStream>>;
}

/// Accepts connections on the front pipe (spec §4.3).
#[async_trait]
pub trait PipeListener: Send {
    async fn accept(&mut self) -> std::io::Result<(Box<dyn AgentStream>, PeerContext)>;
}
