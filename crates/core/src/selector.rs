// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interface to the key-selection dialog (spec §1, §4.7 step 5).
//!
//! The dialog itself — its rendering, its auto-select timeout — is the
//! terminal/tray UI's concern and explicitly out of scope (spec §1). The
//! router only needs to ask "given these candidates, which one (if any) did
//! the user pick", and must fall back to the unrestricted list when the
//! dialog is unavailable, cancelled, or simply not wired up (e.g. a
//! non-interactive install, or the in-memory fake used by tests).

use async_trait::async_trait;

use crate::identity::Identity;

/// Outcome of presenting a key-selection dialog to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The user picked one fingerprint from the candidate list.
    Picked(String),
    /// The dialog was cancelled, timed out, or declined to narrow the list.
    Unrestricted,
}

/// Presents a choice among multiple available identities (spec §4.7 step 5).
#[async_trait]
pub trait KeySelector: Send + Sync {
    async fn select(&self, candidates: &[Identity]) -> Selection;
}

/// A selector that never narrows the list — used when the environment is
/// non-interactive or no UI collaborator is wired up.
pub struct NullSelector;

#[async_trait]
impl KeySelector for NullSelector {
    async fn select(&self, _candidates: &[Identity]) -> Selection {
        Selection::Unrestricted
    }
}
