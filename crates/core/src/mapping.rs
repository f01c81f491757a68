// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted fingerprint-to-backend mapping (spec §3, §4.5).
//!
//! The mapping only ever grows and updates in place; there is no eviction
//! beyond the manual `rescan` and `switch_to` commands clearing entries
//! explicitly. The cached public-key blob lets the router answer an
//! identity listing at startup without any backend pipe I/O (spec §3, §4.7
//! step 1).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::identity::Identity;

/// Persists the mapping after every change (spec §3 invariant, §4.5, §5).
///
/// The binary crate's JSON configuration layer implements this with an
/// atomic temp-file-rename write; the engine itself never touches a
/// filesystem. A persistence failure is logged and swallowed — spec §7
/// `PersistenceFailure` is best-effort, the in-memory state and the client
/// response are unaffected.
#[async_trait]
pub trait MappingPersister: Send + Sync {
    async fn persist(&self, entries: &HashMap<String, MappingEntry>) -> Result<(), AgentError>;
}

/// One fingerprint's last-known owning backend, as held in memory. The disk
/// representation (base64-encoded blob, `agent` instead of `backend`) is
/// owned by the binary crate's configuration layer; this type holds already
/// decoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub backend: String,
    pub key_blob: Option<Vec<u8>>,
    pub comment: Option<String>,
}

/// In-memory view of the persisted mapping, keyed by fingerprint.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    entries: HashMap<String, MappingEntry>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, MappingEntry>) -> Self {
        Self { entries }
    }

    /// Reconstruct a store from already-decoded persisted records, and
    /// separately hand back the subset with a cached blob as ready-to-serve
    /// [`Identity`] values (spec §4.5 `load_from_config`). A record whose
    /// blob failed base64 decoding upstream (reported here as
    /// `key_blob: None`) still seeds the fingerprint→backend mapping; it's
    /// only dropped from the cached identity list, matching spec.md's
    /// "records whose cached blob fails base64 decoding are dropped
    /// silently".
    pub fn load_from_config(
        records: impl IntoIterator<Item = (String, MappingEntry)>,
    ) -> (Self, Vec<Identity>) {
        let mut entries = HashMap::new();
        let mut cached = Vec::new();
        for (fingerprint, entry) in records {
            if let Some(blob) = &entry.key_blob {
                cached.push(Identity::new(blob.clone(), entry.comment.clone().unwrap_or_default()));
            }
            entries.insert(fingerprint, entry);
        }
        (Self { entries }, cached)
    }

    pub fn entries(&self) -> &HashMap<String, MappingEntry> {
        &self.entries
    }

    /// The backend last known to own `fingerprint`, if any.
    pub fn backend_for(&self, fingerprint: &str) -> Option<&str> {
        self.entries.get(fingerprint).map(|e| e.backend.as_str())
    }

    /// True if `fingerprint` already has a cached blob recorded against
    /// `backend` — the short-circuit condition in spec §4.5 `put`.
    pub fn has_cached_blob_for(&self, fingerprint: &str, backend: &str) -> bool {
        self.entries.get(fingerprint).is_some_and(|e| e.backend == backend && e.key_blob.is_some())
    }

    /// Record that `fingerprint` is now owned by `backend`. Overwrites any
    /// prior owner — the mapping always reflects the most recent sighting.
    pub fn record(
        &mut self,
        fingerprint: impl Into<String>,
        backend: impl Into<String>,
        key_blob: Option<Vec<u8>>,
        comment: Option<String>,
    ) {
        self.entries.insert(fingerprint.into(), MappingEntry { backend: backend.into(), key_blob, comment });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of distinct backend names referenced by the current entries.
    /// Used at startup to decide whether to skip the cold scan (spec §4.7
    /// step 2: "if the loaded mappings reference two or more distinct
    /// backends, set `keys_scanned = true`").
    pub fn distinct_backend_count(&self) -> usize {
        self.entries.values().map(|e| e.backend.as_str()).collect::<std::collections::HashSet<_>>().len()
    }
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
