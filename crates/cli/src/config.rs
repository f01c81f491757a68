// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted JSON configuration (spec §6) and its translation into the
//! engine's startup inputs.
//!
//! `agentmux-core` never touches a filesystem; this module owns the on-disk
//! document, load/save, and the one [`MappingPersister`] implementation that
//! rewrites the `keyMappings` section after every mutation while carrying
//! every other field (including keys this binary doesn't recognize) through
//! unchanged.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use agentmux_core::{AgentError, BackendSpec, HostHint, MappingEntry, MappingPersister};

fn default_proxy_pipe_name() -> String {
    "ssh-agent-proxy".to_owned()
}

fn default_backend_pipe_name() -> String {
    "openssh-ssh-agent".to_owned()
}

fn default_failure_cache_ttl() -> u64 {
    60
}

fn default_key_selection_timeout() -> u64 {
    30
}

/// One entry of the `agents` map (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    #[serde(rename = "processName")]
    pub process_name: String,
    #[serde(rename = "exePath")]
    pub exe_path: String,
    pub priority: i32,
    /// Not part of spec.md's external schema table; records which of the
    /// two canonical pipe-ownership idiosyncrasies (spec §4.7 startup step
    /// 3) this backend follows. Absent in an older config, it defaults to
    /// `false` — the "lists without unlocking" shape.
    #[serde(rename = "stealsPipeOnStart", default)]
    pub steals_pipe_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMappingRecord {
    pub fingerprint: String,
    #[serde(rename = "keyBlob", skip_serializing_if = "Option::is_none")]
    pub key_blob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostKeyMappingRecord {
    pub pattern: String,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The persisted configuration document (spec §6). Unrecognized top-level
/// keys round-trip through `extra` rather than being dropped on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDoc {
    #[serde(rename = "proxyPipeName", default = "default_proxy_pipe_name")]
    pub proxy_pipe_name: String,
    #[serde(rename = "backendPipeName", default = "default_backend_pipe_name")]
    pub backend_pipe_name: String,
    #[serde(default)]
    pub agents: HashMap<String, AgentRecord>,
    #[serde(rename = "defaultAgent", default)]
    pub default_agent: String,
    #[serde(rename = "keyMappings", default)]
    pub key_mappings: Vec<KeyMappingRecord>,
    #[serde(rename = "hostKeyMappings", default)]
    pub host_key_mappings: Vec<HostKeyMappingRecord>,
    #[serde(rename = "failureCacheTtlSeconds", default = "default_failure_cache_ttl")]
    pub failure_cache_ttl_seconds: u64,
    #[serde(rename = "keySelectionTimeoutSeconds", default = "default_key_selection_timeout")]
    pub key_selection_timeout_seconds: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ConfigDoc {
    fn default() -> Self {
        Self {
            proxy_pipe_name: default_proxy_pipe_name(),
            backend_pipe_name: default_backend_pipe_name(),
            agents: HashMap::new(),
            default_agent: String::new(),
            key_mappings: Vec::new(),
            host_key_mappings: Vec::new(),
            failure_cache_ttl_seconds: default_failure_cache_ttl(),
            key_selection_timeout_seconds: default_key_selection_timeout(),
            extra: serde_json::Map::new(),
        }
    }
}

impl ConfigDoc {
    /// Load from `path`, falling back to a default document on first run.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Write atomically: a sibling temp file, then rename over the target
    /// (spec §4.5, §5).
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.flush()?;
        tmp.persist(path)?;
        Ok(())
    }

    pub fn backend_specs(&self) -> Vec<BackendSpec> {
        let mut specs: Vec<BackendSpec> = self
            .agents
            .iter()
            .map(|(name, record)| BackendSpec {
                name: name.clone(),
                process_name: record.process_name.clone(),
                executable_path: record.exe_path.clone(),
                priority: record.priority,
                steals_pipe_on_start: record.steals_pipe_on_start,
            })
            .collect();
        specs.sort_by_key(|s| s.priority);
        specs
    }

    /// Decode into the in-memory mapping records the engine wants at
    /// startup. A blob that fails base64 decoding is dropped silently,
    /// matching spec §4.5 `load_from_config` — the fingerprint→backend
    /// entry itself is still kept.
    pub fn mapping_entries(&self) -> HashMap<String, MappingEntry> {
        self.key_mappings
            .iter()
            .map(|record| {
                let key_blob = record
                    .key_blob
                    .as_deref()
                    .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64).ok());
                (
                    record.fingerprint.clone(),
                    MappingEntry { backend: record.agent.clone(), key_blob, comment: record.comment.clone() },
                )
            })
            .collect()
    }

    pub fn host_hints(&self) -> Vec<HostHint> {
        self.host_key_mappings
            .iter()
            .map(|record| HostHint {
                pattern: record.pattern.clone(),
                fingerprint: record.fingerprint.clone(),
                description: record.description.clone(),
            })
            .collect()
    }
}

/// [`MappingPersister`] backed by the JSON document on disk. Only the
/// `keyMappings` section is rewritten on every mutation; every other field —
/// including keys this binary doesn't recognize — is carried over from the
/// document the engine started with.
pub struct FileMappingPersister {
    path: PathBuf,
    template: tokio::sync::Mutex<ConfigDoc>,
}

impl FileMappingPersister {
    pub fn new(path: PathBuf, template: ConfigDoc) -> Self {
        Self { path, template: tokio::sync::Mutex::new(template) }
    }
}

#[async_trait]
impl MappingPersister for FileMappingPersister {
    async fn persist(&self, entries: &HashMap<String, MappingEntry>) -> Result<(), AgentError> {
        let snapshot = {
            let mut doc = self.template.lock().await;
            doc.key_mappings = entries
                .iter()
                .map(|(fingerprint, entry)| KeyMappingRecord {
                    fingerprint: fingerprint.clone(),
                    key_blob: entry
                        .key_blob
                        .as_deref()
                        .map(|blob| base64::engine::general_purpose::STANDARD.encode(blob)),
                    comment: entry.comment.clone(),
                    agent: entry.backend.clone(),
                })
                .collect();
            doc.clone()
        };
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || snapshot.save(&path)).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "failed to persist configuration");
                Err(AgentError::PersistenceFailure)
            }
            Err(err) => {
                tracing::warn!(error = %err, "persistence task panicked");
                Err(AgentError::PersistenceFailure)
            }
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
