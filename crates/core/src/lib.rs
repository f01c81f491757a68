// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request-routing engine: wire codec, backend client, mapping store,
//! failure cache, and the router state machine that ties them together.
//!
//! This crate is platform-independent. It never touches a Windows named pipe
//! or a process table directly — the binary crate supplies concrete
//! implementations of [`transport::PipeConnector`], [`transport::PipeListener`],
//! and [`process::ProcessController`], so the engine compiles and is
//! unit-testable on any host OS even though the product only ships for
//! Windows.

pub mod backend;
pub mod codec;
pub mod error;
pub mod failure_cache;
pub mod host_hint;
pub mod identity;
pub mod mapping;
pub mod process;
pub mod router;
pub mod selector;
pub mod server;
pub mod transport;

pub use backend::{BackendClient, BackendSpec};
pub use codec::Frame;
pub use error::AgentError;
pub use failure_cache::FailureCache;
pub use host_hint::HostHint;
pub use identity::{fingerprint_of, Identity};
pub use mapping::{MappingEntry, MappingPersister, MappingStore};
pub use process::ProcessController;
pub use router::{Router, RouterInit, RouterTiming};
pub use selector::{KeySelector, Selection};
pub use server::serve;
pub use transport::{AgentStream, PeerContext, PipeConnector, PipeListener};
