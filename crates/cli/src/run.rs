// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level wiring: load configuration, build the engine, drive the proxy
//! server loop until shutdown (spec §4.3, §4.7, §5).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use agentmux_core::router::NullHintResolver;
use agentmux_core::selector::NullSelector;
use agentmux_core::{serve, Router, RouterInit, RouterTiming};

use crate::cli::Cli;
use crate::config::{ConfigDoc, FileMappingPersister};
use crate::pipe::{WindowsPipeConnector, WindowsPipeListener};
use crate::process::WindowsProcessController;

/// Initialize `tracing` from `RUST_LOG`, defaulting to `info` (teacher
/// convention, `crates/mux/src/main.rs`). `try_init` so it's harmless to
/// call more than once, e.g. from an integration test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// `%APPDATA%\ssh-agent-proxy\config.json`, unless overridden on the
/// command line (spec §6: "Configuration file path is external to the
/// core").
pub fn resolve_config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    let appdata = std::env::var_os("APPDATA")
        .ok_or_else(|| anyhow::anyhow!("APPDATA is not set; pass --config explicitly"))?;
    Ok(PathBuf::from(appdata).join("ssh-agent-proxy").join("config.json"))
}

/// Run the proxy until Ctrl-C. Returns once the server loop has drained.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    init_tracing();

    let config_path = resolve_config_path(&cli)?;
    let doc = ConfigDoc::load(&config_path)?;

    let backends = doc.backend_specs();
    let default_backend = if doc.default_agent.is_empty() {
        backends.first().map(|b| b.name.clone()).unwrap_or_default()
    } else {
        doc.default_agent.clone()
    };
    let proxy_pipe_name = doc.proxy_pipe_name.clone();
    let backend_pipe_name = doc.backend_pipe_name.clone();
    let host_hints = doc.host_hints();
    let mapping_records = doc.mapping_entries();
    let failure_cache_ttl = Duration::from_secs(doc.failure_cache_ttl_seconds);

    let persister = Arc::new(FileMappingPersister::new(config_path, doc));
    let connector = Arc::new(WindowsPipeConnector);
    let process = Arc::new(WindowsProcessController);
    let cancellation = CancellationToken::new();

    let init = RouterInit {
        backends,
        default_backend,
        backend_pipe_name,
        host_hints,
        mapping_records,
        failure_cache_ttl,
        timing: RouterTiming::default(),
        connector,
        process,
        persister,
        selector: Arc::new(NullSelector),
        hint_resolver: Arc::new(NullHintResolver),
        cancellation: cancellation.clone(),
    };

    let router = Arc::new(Router::new(init).await);
    let listener = WindowsPipeListener::bind(&proxy_pipe_name)?;

    tracing::info!(pipe = %proxy_pipe_name, "accepting connections on the front pipe");

    let server_cancellation = cancellation.clone();
    let server_router = Arc::clone(&router);
    let server = tokio::spawn(async move { serve(listener, server_router, server_cancellation).await });

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown requested");
    cancellation.cancel();
    if let Err(err) = server.await {
        tracing::warn!(error = %err, "proxy server task ended abnormally");
    }

    Ok(())
}
