// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity and fingerprint types (spec §3).

use sha2::{Digest, Sha256};

/// A public key blob paired with a human-readable comment, as exchanged by
/// the agent protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key_blob: Vec<u8>,
    pub comment: String,
}

impl Identity {
    pub fn new(key_blob: Vec<u8>, comment: impl Into<String>) -> Self {
        Self { key_blob, comment: comment.into() }
    }

    /// First 16 uppercase hex characters of SHA-256 over the key blob.
    ///
    /// Collisions over this truncated 64-bit space are ignored — the caller
    /// is responsible for globally-unique keys in practice (spec §3).
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.key_blob)
    }
}

/// Standalone fingerprint derivation, usable before an `Identity` is built
/// (e.g. from a bare key blob in a sign request).
pub fn fingerprint_of(key_blob: &[u8]) -> String {
    let digest = Sha256::digest(key_blob);
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{byte:02X}"));
    }
    hex
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
