// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box fakes for exercising `agentmux-core` purely through its public
//! surface: a scripted world of backend processes, driven end to end
//! through the real wire codec and [`agentmux_core::serve`] rather than by
//! calling `Router::dispatch` directly. This doubles as a check that the
//! public API crates/cli needs to wire up a real binary against is actually
//! sufficient.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::duplex;
use tokio::sync::mpsc;

use agentmux_core::mapping::MappingEntry;
use agentmux_core::{
    codec, AgentError, AgentStream, Identity, MappingPersister, PeerContext, PipeConnector, PipeListener,
    ProcessController,
};

/// One backend's scripted behavior: whether it is reachable, and what it
/// answers to a list/sign request. `None` for a list/sign slot means "answer
/// the prior scripted value again" (sticky-last-value), so a short script
/// can describe an indefinitely repeating steady state.
#[derive(Default)]
pub struct BackendScript {
    pub list_answers: Vec<Vec<Identity>>,
    pub sign_answers: Vec<Option<Vec<u8>>>,
}

fn at_sticky<T: Clone>(values: &[T], call_index: usize) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    Some(values[call_index.min(values.len() - 1)].clone())
}

/// A world of named backend processes shared between a [`WorldProcess`] and
/// a [`WorldConnector`].
#[derive(Default)]
pub struct World {
    running: Mutex<HashSet<String>>,
    scripts: Mutex<HashMap<String, BackendScript>>,
    list_calls: Mutex<HashMap<String, usize>>,
    sign_calls: Mutex<HashMap<String, usize>>,
    pub terminate_log: Mutex<Vec<String>>,
    pub launch_log: Mutex<Vec<String>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, backend: &str, running: bool) {
        let mut set = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running {
            set.insert(backend.to_owned());
        } else {
            set.remove(backend);
        }
    }

    pub fn script(&self, backend: &str, script: BackendScript) {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner()).insert(backend.to_owned(), script);
    }

    fn next_list(&self, backend: &str) -> Vec<Identity> {
        let mut calls = self.list_calls.lock().unwrap_or_else(|e| e.into_inner());
        let idx = *calls.entry(backend.to_owned()).and_modify(|n| *n += 1).or_insert(0);
        let scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.get(backend).and_then(|s| at_sticky(&s.list_answers, idx)).unwrap_or_default()
    }

    fn next_sign(&self, backend: &str) -> Option<Vec<u8>> {
        let mut calls = self.sign_calls.lock().unwrap_or_else(|e| e.into_inner());
        let idx = *calls.entry(backend.to_owned()).and_modify(|n| *n += 1).or_insert(0);
        let scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.get(backend).and_then(|s| at_sticky(&s.sign_answers, idx)).flatten()
    }
}

/// [`ProcessController`] backed by a [`World`]. Launching a backend marks it
/// running; there is exactly one shared pipe name in these tests, so the
/// connector always serves whichever backend was launched or set running
/// most recently via [`World::set_running`]/[`WorldProcess::launch_detached`].
pub struct WorldProcess {
    pub world: std::sync::Arc<World>,
}

#[async_trait]
impl ProcessController for WorldProcess {
    async fn is_running(&self, process_name: &str) -> Result<bool, AgentError> {
        Ok(self.world.running.lock().unwrap_or_else(|e| e.into_inner()).contains(process_name))
    }

    async fn terminate(&self, process_name: &str) -> Result<(), AgentError> {
        self.world.terminate_log.lock().unwrap_or_else(|e| e.into_inner()).push(process_name.to_owned());
        self.world.set_running(process_name, false);
        Ok(())
    }

    async fn launch_detached(&self, process_name: &str, _exe_path: &str) -> Result<(), AgentError> {
        self.world.launch_log.lock().unwrap_or_else(|e| e.into_inner()).push(process_name.to_owned());
        self.world.set_running(process_name, true);
        Ok(())
    }
}

/// [`PipeConnector`] backed by a [`World`]. A connection only succeeds
/// against a process the world currently has running; once connected, a
/// background task answers list/sign/forward requests from that backend's
/// script.
pub struct WorldConnector {
    pub world: std::sync::Arc<World>,
}

#[async_trait]
impl PipeConnector for WorldConnector {
    async fn connect(
        &self,
        pipe_name: &str,
        _timeout: Duration,
    ) -> std::io::Result<Box<dyn AgentStream>> {
        if !self.world.running.lock().unwrap_or_else(|e| e.into_inner()).contains(pipe_name) {
            return Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "backend not running"));
        }
        let (client, mut server) = duplex(64 * 1024);
        let world = std::sync::Arc::clone(&self.world);
        let backend = pipe_name.to_owned();
        tokio::spawn(async move {
            while let Ok(Some(frame)) = codec::read_frame(&mut server).await {
                let response = match frame.msg_type {
                    codec::SSH_AGENTC_REQUEST_IDENTITIES => {
                        let identities = world.next_list(&backend);
                        codec::Frame::new(codec::SSH_AGENT_IDENTITIES_ANSWER, codec::encode_identities_answer(&identities))
                    }
                    codec::SSH_AGENTC_SIGN_REQUEST => match world.next_sign(&backend) {
                        Some(sig) => codec::Frame::new(codec::SSH_AGENT_SIGN_RESPONSE, codec::encode_sign_response(&sig)),
                        None => codec::Frame::failure(),
                    },
                    _ => codec::Frame::failure(),
                };
                if codec::write_frame(&mut server, response.msg_type, &response.payload).await.is_err() {
                    return;
                }
            }
        });
        Ok(Box::new(client))
    }
}

/// [`MappingPersister`] that just records every call, for assertions.
#[derive(Default)]
pub struct RecordingPersister {
    pub history: Mutex<Vec<HashMap<String, MappingEntry>>>,
}

#[async_trait]
impl MappingPersister for RecordingPersister {
    async fn persist(&self, entries: &HashMap<String, MappingEntry>) -> Result<(), AgentError> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).push(entries.clone());
        Ok(())
    }
}

/// A [`PipeListener`] fed by pushing connections through an unbounded
/// channel, so a test can open as many front-pipe connections as it likes
/// without a real OS pipe.
pub struct ChannelListener {
    pub incoming: mpsc::UnboundedReceiver<(Box<dyn AgentStream>, PeerContext)>,
}

#[async_trait]
impl PipeListener for ChannelListener {
    async fn accept(&mut self) -> std::io::Result<(Box<dyn AgentStream>, PeerContext)> {
        self.incoming.recv().await.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }
}

/// Build a `(sender, listener)` pair: push `(stream, peer)` tuples on the
/// sender to simulate a client connecting to the front pipe.
pub fn channel_listener() -> (mpsc::UnboundedSender<(Box<dyn AgentStream>, PeerContext)>, ChannelListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelListener { incoming: rx })
}
