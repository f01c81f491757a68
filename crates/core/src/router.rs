// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The router state machine (spec §3 "Router state", §4.7, §5, §9).
//!
//! One [`Router`] owns the mutable state shared by every connection. Every
//! externally observable operation — dispatching a client frame, the manual
//! `switch_to`, `rescan` — takes the single exclusive lock for its entire
//! duration, including any backend switch and retries. The shared backend
//! pipe is a singleton; pipelining concurrent switches against it is unsafe,
//! so this engine deliberately serializes rather than finely locking
//! (spec §5, §9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::backend::{sorted_by_priority, BackendClient, BackendSpec};
use crate::codec::{
    self, Frame, SSH_AGENTC_REQUEST_IDENTITIES, SSH_AGENTC_SIGN_REQUEST, SSH_AGENT_IDENTITIES_ANSWER,
    SSH_AGENT_SIGN_RESPONSE,
};
use crate::error::AgentError;
use crate::failure_cache::FailureCache;
use crate::host_hint::{self, HostHint};
use crate::identity::{fingerprint_of, Identity};
use crate::mapping::{MappingEntry, MappingPersister, MappingStore};
use crate::process::ProcessController;
use crate::selector::{KeySelector, NullSelector, Selection};
use crate::transport::PeerContext;
use crate::transport::PipeConnector;

/// Resolves the opaque "connection hint" string for a peer pid (spec §1,
/// §4.7 step 5). Inspecting the peer process's command line to produce this
/// string is an optional external enrichment and out of scope here; the
/// router only ever treats the result as an opaque token for host-hint
/// matching.
#[async_trait]
pub trait ConnectionHintResolver: Send + Sync {
    async fn resolve(&self, peer_pid: Option<u32>) -> Option<String>;
}

/// A resolver that never produces a hint — used when the enrichment
/// collaborator isn't wired up.
pub struct NullHintResolver;

#[async_trait]
impl ConnectionHintResolver for NullHintResolver {
    async fn resolve(&self, _peer_pid: Option<u32>) -> Option<String> {
        None
    }
}

/// Tunable delays in the sign/switch state machines (spec §4.7). Production
/// defaults follow spec.md's literal numbers; tests inject millisecond-scale
/// values so the suite doesn't block on wall-clock waits.
#[derive(Debug, Clone)]
pub struct RouterTiming {
    /// Wait after launching a backend before trusting it owns the pipe.
    pub backend_switch_wait: Duration,
    /// Max attempts to observe a non-empty identity list after a switch.
    pub trigger_unlock_attempts: u32,
    /// Spacing between trigger-unlock attempts.
    pub trigger_unlock_interval: Duration,
    /// Max sign attempts once the target backend owns the pipe.
    pub sign_retry_attempts: u32,
    /// Spacing between sign retries.
    pub sign_retry_interval: Duration,
    /// Wait after relaunching a backend whose pipe appeared orphaned.
    pub orphan_retry_wait: Duration,
}

impl Default for RouterTiming {
    fn default() -> Self {
        Self {
            backend_switch_wait: Duration::from_secs(3),
            trigger_unlock_attempts: 10,
            trigger_unlock_interval: Duration::from_secs(2),
            sign_retry_attempts: 5,
            sign_retry_interval: Duration::from_secs(2),
            orphan_retry_wait: Duration::from_secs(3),
        }
    }
}

/// Everything the router needs to come up (spec §4.7 "Startup").
pub struct RouterInit {
    pub backends: Vec<BackendSpec>,
    pub default_backend: String,
    pub backend_pipe_name: String,
    pub host_hints: Vec<HostHint>,
    pub mapping_records: HashMap<String, MappingEntry>,
    pub failure_cache_ttl: Duration,
    pub timing: RouterTiming,
    pub connector: Arc<dyn PipeConnector>,
    pub process: Arc<dyn ProcessController>,
    pub persister: Arc<dyn MappingPersister>,
    pub selector: Arc<dyn KeySelector>,
    pub hint_resolver: Arc<dyn ConnectionHintResolver>,
    pub cancellation: CancellationToken,
}

impl RouterInit {
    /// A minimal init for tests: no backends, no host hints, a selector and
    /// hint resolver that never narrow or enrich anything, spec-default
    /// timing overridden to be fast.
    pub fn bare(
        connector: Arc<dyn PipeConnector>,
        process: Arc<dyn ProcessController>,
        persister: Arc<dyn MappingPersister>,
    ) -> Self {
        Self {
            backends: Vec::new(),
            default_backend: String::new(),
            backend_pipe_name: "openssh-ssh-agent".to_owned(),
            host_hints: Vec::new(),
            mapping_records: HashMap::new(),
            failure_cache_ttl: Duration::from_secs(60),
            timing: RouterTiming {
                backend_switch_wait: Duration::from_millis(5),
                trigger_unlock_attempts: 3,
                trigger_unlock_interval: Duration::from_millis(2),
                sign_retry_attempts: 3,
                sign_retry_interval: Duration::from_millis(2),
                orphan_retry_wait: Duration::from_millis(5),
            },
            connector,
            process,
            persister,
            selector: Arc::new(NullSelector),
            hint_resolver: Arc::new(NullHintResolver),
            cancellation: CancellationToken::new(),
        }
    }
}

/// The router's mutable state (spec §3 "Router state").
struct RouterState {
    current_backend: Option<String>,
    mapping: MappingStore,
    all_keys: Vec<Identity>,
    keys_scanned: bool,
    failure_cache: FailureCache,
}

/// The request-routing engine (spec §4.7).
pub struct Router {
    state: Mutex<RouterState>,
    backends: Vec<BackendSpec>,
    default_backend: String,
    backend_pipe_name: String,
    host_hints: Vec<HostHint>,
    timing: RouterTiming,
    connector: Arc<dyn PipeConnector>,
    process: Arc<dyn ProcessController>,
    persister: Arc<dyn MappingPersister>,
    selector: Arc<dyn KeySelector>,
    hint_resolver: Arc<dyn ConnectionHintResolver>,
    cancellation: CancellationToken,
}

impl Router {
    /// Build a router from persisted configuration and detect the current
    /// backend from running processes, never from the pipe itself —
    /// querying the pipe can itself trigger an unlock dialog on certain
    /// backends (spec §4.7 "Startup" step 3).
    pub async fn new(init: RouterInit) -> Self {
        let backends = sorted_by_priority(&init.backends);
        let (mapping, cached_identities) = MappingStore::load_from_config(init.mapping_records);
        let keys_scanned = mapping.distinct_backend_count() >= 2;
        let current_backend = match detect_current_backend(&backends, init.process.as_ref()).await {
            Ok(backend) => backend,
            Err(err) => {
                tracing::warn!(error = %err, "current-backend detection failed at startup");
                None
            }
        };

        let state = RouterState {
            current_backend,
            mapping,
            all_keys: dedup_identities(cached_identities),
            keys_scanned,
            failure_cache: FailureCache::new(init.failure_cache_ttl),
        };

        Self {
            state: Mutex::new(state),
            backends,
            default_backend: init.default_backend,
            backend_pipe_name: init.backend_pipe_name,
            host_hints: init.host_hints,
            timing: init.timing,
            connector: init.connector,
            process: init.process,
            persister: init.persister,
            selector: init.selector,
            hint_resolver: init.hint_resolver,
            cancellation: init.cancellation,
        }
    }

    /// Entry point for one client frame (spec §4.3, §4.7). Never returns an
    /// error to the caller — every handled message resolves to a
    /// well-formed frame (spec §7).
    pub async fn dispatch(&self, frame: Frame, peer: PeerContext) -> Frame {
        if self.cancellation.is_cancelled() {
            return Frame::failure();
        }
        match frame.msg_type {
            SSH_AGENTC_REQUEST_IDENTITIES => self.handle_list_identities(peer).await,
            SSH_AGENTC_SIGN_REQUEST => self.handle_sign(&frame.payload).await,
            _ => self.forward_opaque(&frame).await,
        }
    }

    // -- Identity listing (spec §4.7 "Identity listing") --------------------

    async fn handle_list_identities(&self, peer: PeerContext) -> Frame {
        let mut state = self.state.lock().await;

        let mut candidates = if state.keys_scanned && !state.all_keys.is_empty() {
            state.all_keys.clone()
        } else if self.backends.len() == 1 {
            let only_backend = self.backends[0].clone();
            self.single_backend_scan(&mut state, &only_backend).await
        } else {
            self.merged_scan(&mut state).await
        };
        drop(state);

        if candidates.is_empty() {
            return Frame::failure();
        }
        if self.cancellation.is_cancelled() {
            return Frame::failure();
        }

        let hint = self.hint_resolver.resolve(peer.peer_pid).await;
        let mut hint_matched = false;
        if let Some(hint) = hint.as_deref() {
            if let Some(fingerprint) = host_hint::first_match(&self.host_hints, hint) {
                host_hint::reorder_to_front(&mut candidates, fingerprint);
                hint_matched = true;
            }
        }

        if !hint_matched && candidates.len() > 1 && self.backends.len() > 1 {
            if let Selection::Picked(fingerprint) = self.selector.select(&candidates).await {
                candidates.retain(|id| id.fingerprint() == fingerprint);
            }
        }

        Frame::new(SSH_AGENT_IDENTITIES_ANSWER, codec::encode_identities_answer(&candidates))
    }

    /// Exactly one backend configured: forward the listing verbatim and
    /// seed the mapping/cache from it (spec §4.7 step 2).
    async fn single_backend_scan(&self, state: &mut RouterState, backend: &BackendSpec) -> Vec<Identity> {
        if let Err(err) = self.process.launch_detached(&backend.process_name, &backend.executable_path).await {
            tracing::warn!(error = %err, backend = %backend.name, "failed to ensure backend running for listing");
        }
        match self.cancellable(self.backend_client().request_identities()).await {
            Some(Ok(ids)) => {
                state.all_keys = dedup_identities(ids.clone());
                for id in &ids {
                    state.mapping.record(id.fingerprint(), backend.name.clone(), Some(id.key_blob.clone()), Some(id.comment.clone()));
                }
                self.persist(state).await;
                state.keys_scanned = true;
                state.all_keys.clone()
            }
            Some(Err(err)) => {
                tracing::debug!(error = %err, backend = %backend.name, "backend unreachable for listing");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Multiple backends and no cached listing: scan each in priority order,
    /// deduplicate by fingerprint, attribute newly discovered keys to the
    /// backend that first reported them (spec §4.7 step 3).
    async fn merged_scan(&self, state: &mut RouterState) -> Vec<Identity> {
        state.all_keys.clear();
        for backend in &self.backends {
            if self.cancellation.is_cancelled() {
                break;
            }
            if let Err(err) = self.process.launch_detached(&backend.process_name, &backend.executable_path).await {
                tracing::warn!(error = %err, backend = %backend.name, "failed to ensure backend running during scan");
            }
            match self.cancellable(self.backend_client().request_identities()).await {
                Some(Ok(ids)) => {
                    for id in ids {
                        let fingerprint = id.fingerprint();
                        if state.all_keys.iter().any(|existing| existing.fingerprint() == fingerprint) {
                            continue;
                        }
                        state.mapping.record(fingerprint, backend.name.clone(), Some(id.key_blob.clone()), Some(id.comment.clone()));
                        state.all_keys.push(id);
                    }
                }
                Some(Err(err)) => {
                    tracing::debug!(error = %err, backend = %backend.name, "backend unreachable during merged scan");
                }
                None => break,
            }
        }
        self.persist(state).await;
        state.keys_scanned = true;
        state.all_keys.clone()
    }

    // -- Sign requests (spec §4.7 "Sign request") ----------------------------

    async fn handle_sign(&self, payload: &[u8]) -> Frame {
        let (key_blob, data, flags) = match codec::parse_sign_request(payload) {
            Ok(parsed) => parsed,
            Err(_) => return Frame::failure(),
        };
        let fingerprint = fingerprint_of(&key_blob);

        let mut state = self.state.lock().await;

        match detect_current_backend(&self.backends, self.process.as_ref()).await {
            Ok(detected) => state.current_backend = detected,
            Err(err) => tracing::warn!(error = %err, "current-backend detection failed during sign"),
        }

        let explicit_mapping = state.mapping.backend_for(&fingerprint).map(str::to_owned);
        let target = explicit_mapping
            .clone()
            .or_else(|| state.current_backend.clone())
            .unwrap_or_else(|| self.default_backend.clone());

        // Step A: target is already believed to own the pipe.
        if state.current_backend.as_deref() == Some(target.as_str()) {
            if let Some(signature) = self.try_sign_current(&mut state, &target, &fingerprint, &key_blob, &data, flags).await {
                self.record_and_persist(&mut state, &fingerprint, &target, &key_blob).await;
                return signed_response(signature);
            }
            if self.cancellation.is_cancelled() {
                return Frame::failure();
            }
        }

        // Step B: partial switch to the target.
        if state.current_backend.as_deref() != Some(target.as_str()) {
            if let Some(signature) = self.try_partial_switch(&mut state, &target, &fingerprint, &key_blob, &data, flags).await {
                self.record_and_persist(&mut state, &fingerprint, &target, &key_blob).await;
                return signed_response(signature);
            }
            if self.cancellation.is_cancelled() {
                return Frame::failure();
            }
        }

        // Step C: only when the fingerprint had no explicit mapping — an
        // explicitly mapped key must wait on its own backend (spec §4.7).
        if explicit_mapping.is_none() {
            for backend in self.backends.iter().filter(|b| b.name != target) {
                if self.cancellation.is_cancelled() {
                    return Frame::failure();
                }
                if state.failure_cache.is_failing(&backend.name, &fingerprint) {
                    continue;
                }
                if let Some(signature) = self.try_full_switch(&mut state, backend, &fingerprint, &key_blob, &data, flags).await {
                    self.record_and_persist(&mut state, &fingerprint, &backend.name, &key_blob).await;
                    return signed_response(signature);
                }
            }
        }

        Frame::failure()
    }

    /// Step A (spec §4.7): sign against the backend already believed
    /// current. A connection failure against a list-without-unlock backend
    /// is treated as a possibly orphaned pipe: terminate and relaunch that
    /// backend, wait, and retry once before giving up.
    async fn try_sign_current(
        &self,
        state: &mut RouterState,
        backend_name: &str,
        fingerprint: &str,
        key_blob: &[u8],
        data: &[u8],
        flags: u32,
    ) -> Option<Vec<u8>> {
        if state.failure_cache.is_failing(backend_name, fingerprint) {
            return None;
        }

        match self.cancellable(self.backend_client().sign(key_blob, data, flags)).await {
            Some(Ok(Some(signature))) => Some(signature),
            Some(Ok(None)) => {
                tracing::debug!(backend = backend_name, "sign refused by current backend");
                None
            }
            Some(Err(_)) => {
                state.failure_cache.record_failure(backend_name, fingerprint);

                let Some(spec) = self.backend_spec(backend_name).cloned() else {
                    return None;
                };
                let still_running = self.process.is_running(&spec.process_name).await.unwrap_or(true);
                if !still_running {
                    // spec §4.7 state-machine summary: Known(n) -> None.
                    state.current_backend = None;
                    return None;
                }

                if spec.steals_pipe_on_start {
                    return None;
                }

                // Orphaned pipe: the backend process is alive but nobody is
                // serving it. Restart it and retry once (spec §4.7 step A).
                if let Err(err) = self.process.terminate(&spec.process_name).await {
                    tracing::warn!(error = %err, backend = backend_name, "failed to terminate orphaned backend");
                }
                if let Err(err) = self.process.launch_detached(&spec.process_name, &spec.executable_path).await {
                    tracing::warn!(error = %err, backend = backend_name, "failed to relaunch orphaned backend");
                }
                self.sleep(self.timing.orphan_retry_wait).await;
                if self.cancellation.is_cancelled() {
                    return None;
                }

                match self.cancellable(self.backend_client().sign(key_blob, data, flags)).await {
                    Some(Ok(Some(signature))) => {
                        state.failure_cache.clear(backend_name, fingerprint);
                        Some(signature)
                    }
                    _ => None,
                }
            }
            None => None,
        }
    }

    /// Step B (spec §4.7): terminate only the current backend, launch the
    /// target, wait, then trigger-unlock and retry signing.
    async fn try_partial_switch(
        &self,
        state: &mut RouterState,
        target: &str,
        fingerprint: &str,
        key_blob: &[u8],
        data: &[u8],
        flags: u32,
    ) -> Option<Vec<u8>> {
        if state.failure_cache.is_failing(target, fingerprint) {
            return None;
        }
        let Some(target_spec) = self.backend_spec(target).cloned() else {
            return None;
        };

        if let Some(current_name) = state.current_backend.clone() {
            if let Some(current_spec) = self.backend_spec(&current_name) {
                if let Err(err) = self.process.terminate(&current_spec.process_name).await {
                    tracing::warn!(error = %err, backend = %current_name, "failed to terminate current backend during partial switch");
                }
            }
        }
        if let Err(err) = self.process.launch_detached(&target_spec.process_name, &target_spec.executable_path).await {
            tracing::warn!(error = %err, backend = target, "failed to launch target backend during partial switch");
        }
        self.sleep(self.timing.backend_switch_wait).await;
        if self.cancellation.is_cancelled() {
            return None;
        }
        state.current_backend = Some(target.to_owned());

        self.trigger_unlock().await;
        if self.cancellation.is_cancelled() {
            return None;
        }

        for attempt in 0..self.timing.sign_retry_attempts {
            if self.cancellation.is_cancelled() {
                return None;
            }
            match self.cancellable(self.backend_client().sign(key_blob, data, flags)).await {
                Some(Ok(Some(signature))) => {
                    state.failure_cache.clear(target, fingerprint);
                    return Some(signature);
                }
                Some(Ok(None)) => {
                    tracing::debug!(backend = target, attempt, "sign refused during partial switch, awaiting user authentication");
                }
                Some(Err(_)) => {
                    state.failure_cache.record_failure(target, fingerprint);
                    return None;
                }
                None => return None,
            }
            if attempt + 1 < self.timing.sign_retry_attempts {
                self.sleep(self.timing.sign_retry_interval).await;
            }
        }
        None
    }

    /// Step C (spec §4.7): full switch to one remaining backend.
    async fn try_full_switch(
        &self,
        state: &mut RouterState,
        backend: &BackendSpec,
        fingerprint: &str,
        key_blob: &[u8],
        data: &[u8],
        flags: u32,
    ) -> Option<Vec<u8>> {
        self.terminate_all().await;
        if let Err(err) = self.process.launch_detached(&backend.process_name, &backend.executable_path).await {
            tracing::warn!(error = %err, backend = %backend.name, "failed to launch backend during full switch");
        }
        self.sleep(self.timing.backend_switch_wait).await;
        if self.cancellation.is_cancelled() {
            return None;
        }
        state.current_backend = Some(backend.name.clone());

        match self.cancellable(self.backend_client().sign(key_blob, data, flags)).await {
            Some(Ok(Some(signature))) => {
                state.failure_cache.clear(&backend.name, fingerprint);
                Some(signature)
            }
            Some(Ok(None)) => {
                tracing::debug!(backend = %backend.name, "sign refused during full switch");
                None
            }
            Some(Err(_)) => {
                state.failure_cache.record_failure(&backend.name, fingerprint);
                None
            }
            None => None,
        }
    }

    /// Issue list-identities against the pipe until a non-empty answer comes
    /// back, forcing the unlock prompt on backends that only fire it on
    /// listing, not on sign (spec §4.7 step B, GLOSSARY "Trigger-unlock").
    async fn trigger_unlock(&self) {
        for _ in 0..self.timing.trigger_unlock_attempts {
            if self.cancellation.is_cancelled() {
                return;
            }
            if let Some(Ok(ids)) = self.cancellable(self.backend_client().request_identities()).await {
                if !ids.is_empty() {
                    return;
                }
            }
            self.sleep(self.timing.trigger_unlock_interval).await;
        }
    }

    async fn record_and_persist(&self, state: &mut RouterState, fingerprint: &str, backend: &str, key_blob: &[u8]) {
        if state.mapping.has_cached_blob_for(fingerprint, backend) {
            return;
        }
        let comment = state.all_keys.iter().find(|id| id.fingerprint() == fingerprint).map(|id| id.comment.clone());
        state.mapping.record(fingerprint, backend, Some(key_blob.to_vec()), comment);
        self.persist(state).await;
    }

    // -- Manual commands (spec §4.7 "Manual commands") -----------------------

    /// `launch_others` covers the optional trailing step in spec.md's
    /// `switch_to`: "launch the target … then (if requested) launch the
    /// others" — left as caller-controlled since spec.md doesn't specify
    /// what gates that request.
    pub async fn switch_to(&self, name: &str, force: bool, launch_others: bool) -> Result<(), AgentError> {
        let mut state = self.state.lock().await;
        if !force && state.current_backend.as_deref() == Some(name) {
            return Ok(());
        }
        let Some(target) = self.backend_spec(name).cloned() else {
            return Err(AgentError::ProcessControlFailure);
        };

        self.terminate_all().await;
        self.process.launch_detached(&target.process_name, &target.executable_path).await?;
        self.sleep(self.timing.backend_switch_wait).await;
        if self.cancellation.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        state.current_backend = Some(name.to_owned());

        if launch_others {
            for backend in &self.backends {
                if backend.name == name {
                    continue;
                }
                if let Err(err) = self.process.launch_detached(&backend.process_name, &backend.executable_path).await {
                    tracing::warn!(error = %err, backend = %backend.name, "failed to launch secondary backend during switch_to");
                }
            }
        }
        Ok(())
    }

    pub async fn rescan(&self) -> Vec<Identity> {
        let mut state = self.state.lock().await;
        state.all_keys.clear();
        state.keys_scanned = false;
        self.merged_scan(&mut state).await
    }

    // -- Opaque forwarding (spec §4.7 "Opaque forwarding") -------------------

    async fn forward_opaque(&self, frame: &Frame) -> Frame {
        let _state = self.state.lock().await;
        match self.cancellable(self.backend_client().forward(frame)).await {
            Some(Ok(Some(response))) => response,
            _ => Frame::failure(),
        }
    }

    // -- Shared helpers -------------------------------------------------------

    fn backend_client(&self) -> BackendClient {
        BackendClient::new(Arc::clone(&self.connector), self.backend_pipe_name.clone())
    }

    fn backend_spec(&self, name: &str) -> Option<&BackendSpec> {
        self.backends.iter().find(|b| b.name == name)
    }

    async fn terminate_all(&self) {
        for backend in &self.backends {
            if let Err(err) = self.process.terminate(&backend.process_name).await {
                tracing::warn!(error = %err, backend = %backend.name, "failed to terminate backend");
            }
        }
    }

    async fn persist(&self, state: &RouterState) {
        if let Err(err) = self.persister.persist(state.mapping.entries()).await {
            tracing::warn!(error = %err, "failed to persist mapping (best-effort)");
        }
    }

    /// Cancellation-aware sleep: returns early if shutdown is signalled
    /// mid-wait (spec §5 "Cancellation").
    async fn sleep(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancellation.cancelled() => {}
        }
    }

    /// Races `fut` against the cancellation signal. `None` if cancellation
    /// fires first. Every backend pipe connect/list/sign/forward is a
    /// suspension point that must observe cancellation, not just the
    /// explicit retry sleeps (spec §5 "Suspension points").
    async fn cancellable<T>(&self, fut: impl std::future::Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => None,
            value = fut => Some(value),
        }
    }
}

fn signed_response(signature: Vec<u8>) -> Frame {
    Frame::new(SSH_AGENT_SIGN_RESPONSE, codec::encode_sign_response(&signature))
}

fn dedup_identities(ids: Vec<Identity>) -> Vec<Identity> {
    let mut out: Vec<Identity> = Vec::with_capacity(ids.len());
    for id in ids {
        let fingerprint = id.fingerprint();
        if !out.iter().any(|existing: &Identity| existing.fingerprint() == fingerprint) {
            out.push(id);
        }
    }
    out
}

/// Detect which backend currently owns the shared pipe from running
/// processes alone — never by querying the pipe itself, which can trigger
/// an unlock dialog on some backends (spec §4.7 "Startup" step 3,
/// §9 "Pipe-owner detection heuristic is explicitly a heuristic").
///
/// Degrades to `None` outside the canonical two-backend shape rather than
/// pinning a guess (spec §9).
pub async fn detect_current_backend(
    backends: &[BackendSpec],
    process: &dyn ProcessController,
) -> Result<Option<String>, AgentError> {
    let mut steals_on_start_running = Vec::new();
    let mut list_without_unlock_running = Vec::new();

    for backend in backends {
        if process.is_running(&backend.process_name).await? {
            if backend.steals_pipe_on_start {
                steals_on_start_running.push(backend);
            } else {
                list_without_unlock_running.push(backend);
            }
        }
    }

    if steals_on_start_running.len() == 1 {
        return Ok(Some(steals_on_start_running[0].name.clone()));
    }
    if steals_on_start_running.is_empty() && list_without_unlock_running.len() == 1 {
        return Ok(Some(list_without_unlock_running[0].name.clone()));
    }
    Ok(None)
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
