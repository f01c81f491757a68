// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The proxy server (spec §4.3): accepts connections on the front pipe, reads
//! framed requests, dispatches each to the [`Router`], and writes framed
//! responses.
//!
//! The server itself never touches a real Windows named pipe — it is generic
//! over [`PipeListener`], so the binary crate's
//! `tokio::net::windows::named_pipe`-backed listener and this crate's
//! in-memory test double share the same accept/dispatch loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::router::Router;
use crate::transport::{AgentStream, PeerContext, PipeListener};

/// Accept connections on `listener` until `cancellation` fires. Each accepted
/// connection is handled on its own task so a slow sign on one connection
/// never blocks another's frame I/O — only the router's single exclusive
/// lock (spec §5) serializes the state-mutating work itself.
pub async fn serve(mut listener: impl PipeListener, router: Arc<Router>, cancellation: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!("proxy server shutting down, no longer accepting connections");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let router = Arc::clone(&router);
                        let cancellation = cancellation.clone();
                        tokio::spawn(handle_connection(stream, peer, router, cancellation));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept connection on front pipe");
                    }
                }
            }
        }
    }
}

/// Read one frame, dispatch it, write the response, repeat — until a clean
/// EOF, a decode error, or cancellation. On any decode error the connection
/// is closed without attempting recovery (spec §4.3).
async fn handle_connection(
    mut stream: Box<dyn AgentStream>,
    peer: PeerContext,
    router: Arc<Router>,
    cancellation: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancellation.cancelled() => return,
            frame = codec::read_frame(&mut stream) => frame,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(error = %err, "closing connection on malformed frame");
                return;
            }
        };

        let response = router.dispatch(frame, peer.clone()).await;
        if let Err(err) = codec::write_frame(&mut stream, response.msg_type, &response.payload).await {
            tracing::debug!(error = %err, "failed to write response, closing connection");
            return;
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
