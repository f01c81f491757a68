// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-hint based identity reordering (spec §3 "HostHint → fingerprint",
//! §4.7 step 5).
//!
//! The router never derives a connection hint itself — that enrichment
//! (inspecting the peer process's command line for a hostname or repo) is an
//! optional external collaborator, and the router treats its output as an
//! opaque string. This module only owns the pattern-matching rule once a
//! hint is in hand.

use serde::{Deserialize, Serialize};

/// One persisted host-hint rule (spec §3, §6 `hostKeyMappings`).
///
/// `pattern` is `host[:owner/*]` or `host:*`. First match wins; patterns are
/// evaluated in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostHint {
    pub pattern: String,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Does `hint` (an opaque connection-hint string, conventionally
/// `host:owner/repo` but the router never inspects that shape itself) match
/// `pattern`?
///
/// A pattern of `host:*` matches any hint for that host regardless of
/// owner/repo. A pattern of `host:owner/*` matches any repo under that
/// owner. A bare `host` pattern (no `:`) matches by host prefix alone.
fn pattern_matches(pattern: &str, hint: &str) -> bool {
    match pattern.split_once(':') {
        Some((host, rest)) => {
            let Some((hint_host, hint_rest)) = hint.split_once(':') else {
                return false;
            };
            if host != hint_host {
                return false;
            }
            if rest == "*" {
                return true;
            }
            match rest.strip_suffix("/*") {
                Some(owner) => hint_rest.split_once('/').map(|(o, _)| o) == Some(owner),
                None => rest == hint_rest,
            }
        }
        None => hint.split_once(':').map(|(h, _)| h).unwrap_or(hint) == pattern,
    }
}

/// First fingerprint among `hints` whose pattern matches `connection_hint`,
/// in list order.
pub fn first_match<'a>(hints: &'a [HostHint], connection_hint: &str) -> Option<&'a str> {
    hints
        .iter()
        .find(|hint| pattern_matches(&hint.pattern, connection_hint))
        .map(|hint| hint.fingerprint.as_str())
}

/// Move the identity whose fingerprint is `fingerprint` to the front of
/// `identities`, leaving the relative order of the rest unchanged. No-op if
/// the fingerprint isn't present.
pub fn reorder_to_front(identities: &mut Vec<crate::identity::Identity>, fingerprint: &str) {
    if let Some(pos) = identities.iter().position(|id| id.fingerprint() == fingerprint) {
        let picked = identities.remove(pos);
        identities.insert(0, picked);
    }
}

#[cfg(test)]
#[path = "host_hint_tests.rs"]
mod tests;
