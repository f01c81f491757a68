// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios (spec §8) driven entirely through the public
//! surface: real wire bytes in and out of [`agentmux_core::serve`], never a
//! direct call to a router-internal method.

use std::sync::Arc;
use std::time::Duration;

use agentmux_core::router::NullHintResolver;
use agentmux_core::selector::NullSelector;
use agentmux_core::{codec, serve, BackendSpec, Router, RouterInit, RouterTiming};
use tokio::io::duplex;
use tokio_util::sync::CancellationToken;

use agentmux_specs::{channel_listener, BackendScript, RecordingPersister, World, WorldConnector, WorldProcess};

fn fast_timing() -> RouterTiming {
    RouterTiming {
        backend_switch_wait: Duration::from_millis(5),
        trigger_unlock_attempts: 5,
        trigger_unlock_interval: Duration::from_millis(2),
        sign_retry_attempts: 5,
        sign_retry_interval: Duration::from_millis(2),
        orphan_retry_wait: Duration::from_millis(5),
    }
}

fn backend(name: &str, priority: i32, steals_pipe_on_start: bool) -> BackendSpec {
    BackendSpec {
        name: name.to_owned(),
        process_name: name.to_owned(),
        executable_path: name.to_owned(),
        priority,
        steals_pipe_on_start,
    }
}

async fn spawn_server(router: Arc<Router>) -> (tokio::io::DuplexStream, CancellationToken) {
    let (tx, listener) = channel_listener();
    let cancellation = CancellationToken::new();
    let server_cancellation = cancellation.clone();
    tokio::spawn(async move { serve(listener, router, server_cancellation).await });

    let (client, server) = duplex(64 * 1024);
    tx.send((Box::new(server), Default::default())).unwrap();
    (client, cancellation)
}

#[tokio::test]
async fn lists_and_signs_a_single_backend_identity_over_the_real_wire() {
    let world = Arc::new(World::new());
    world.set_running("A", true);
    let identity = agentmux_core::Identity::new(vec![1, 2, 3], "laptop".to_owned());
    world.script(
        "A",
        BackendScript { list_answers: vec![vec![identity.clone()]], sign_answers: vec![Some(vec![9, 9, 9])] },
    );

    let init = RouterInit {
        backends: vec![backend("A", 0, false)],
        default_backend: "A".to_owned(),
        backend_pipe_name: "A".to_owned(),
        host_hints: Vec::new(),
        mapping_records: Default::default(),
        failure_cache_ttl: Duration::from_secs(60),
        timing: fast_timing(),
        connector: Arc::new(WorldConnector { world: Arc::clone(&world) }),
        process: Arc::new(WorldProcess { world: Arc::clone(&world) }),
        persister: Arc::new(RecordingPersister::default()),
        selector: Arc::new(NullSelector),
        hint_resolver: Arc::new(NullHintResolver),
        cancellation: CancellationToken::new(),
    };
    let router = Arc::new(Router::new(init).await);
    let (mut client, _cancellation) = spawn_server(router).await;

    codec::write_frame(&mut client, codec::SSH_AGENTC_REQUEST_IDENTITIES, &[]).await.unwrap();
    let listing = codec::read_frame(&mut client).await.unwrap().unwrap();
    assert_eq!(listing.msg_type, codec::SSH_AGENT_IDENTITIES_ANSWER);
    let decoded = codec::parse_identities_answer(&listing.payload).unwrap();
    assert_eq!(decoded, vec![identity.clone()]);

    let sign_payload = codec::encode_sign_request(&identity.key_blob, b"hello", 0);
    codec::write_frame(&mut client, codec::SSH_AGENTC_SIGN_REQUEST, &sign_payload).await.unwrap();
    let signed = codec::read_frame(&mut client).await.unwrap().unwrap();
    assert_eq!(signed.msg_type, codec::SSH_AGENT_SIGN_RESPONSE);
    assert_eq!(codec::parse_sign_response(&signed.payload).unwrap(), vec![9, 9, 9]);
}

#[tokio::test]
async fn switches_backends_over_the_real_wire_when_the_mapped_owner_differs_from_current() {
    let world = Arc::new(World::new());
    world.set_running("A", true);
    let fingerprint_key = vec![4, 5, 6];
    world.script("B", BackendScript { list_answers: vec![vec![]], sign_answers: vec![Some(vec![7, 7])] });

    let mut mapping_records = std::collections::HashMap::new();
    mapping_records.insert(
        agentmux_core::fingerprint_of(&fingerprint_key),
        agentmux_core::MappingEntry { backend: "B".to_owned(), key_blob: None, comment: None },
    );

    let init = RouterInit {
        backends: vec![backend("A", 0, false), backend("B", 1, true)],
        default_backend: "A".to_owned(),
        backend_pipe_name: "shared".to_owned(),
        host_hints: Vec::new(),
        mapping_records,
        failure_cache_ttl: Duration::from_secs(60),
        timing: fast_timing(),
        connector: Arc::new(WorldConnector { world: Arc::clone(&world) }),
        process: Arc::new(WorldProcess { world: Arc::clone(&world) }),
        persister: Arc::new(RecordingPersister::default()),
        selector: Arc::new(NullSelector),
        hint_resolver: Arc::new(NullHintResolver),
        cancellation: CancellationToken::new(),
    };
    let router = Arc::new(Router::new(init).await);
    let (mut client, _cancellation) = spawn_server(router).await;

    let sign_payload = codec::encode_sign_request(&fingerprint_key, b"hello", 0);
    codec::write_frame(&mut client, codec::SSH_AGENTC_SIGN_REQUEST, &sign_payload).await.unwrap();
    let signed = codec::read_frame(&mut client).await.unwrap().unwrap();
    assert_eq!(signed.msg_type, codec::SSH_AGENT_SIGN_RESPONSE);
    assert_eq!(codec::parse_sign_response(&signed.payload).unwrap(), vec![7, 7]);

    assert!(world.terminate_log.lock().unwrap().contains(&"A".to_owned()));
    assert!(world.launch_log.lock().unwrap().contains(&"B".to_owned()));
}

#[tokio::test]
async fn a_declared_zero_length_frame_closes_its_connection_but_not_a_sibling_connection() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let world = Arc::new(World::new());
    world.set_running("A", true);
    world.script(
        "A",
        BackendScript { list_answers: vec![vec![]], sign_answers: vec![] },
    );

    let init = RouterInit {
        backends: vec![backend("A", 0, false)],
        default_backend: "A".to_owned(),
        backend_pipe_name: "A".to_owned(),
        host_hints: Vec::new(),
        mapping_records: Default::default(),
        failure_cache_ttl: Duration::from_secs(60),
        timing: fast_timing(),
        connector: Arc::new(WorldConnector { world: Arc::clone(&world) }),
        process: Arc::new(WorldProcess { world: Arc::clone(&world) }),
        persister: Arc::new(RecordingPersister::default()),
        selector: Arc::new(NullSelector),
        hint_resolver: Arc::new(NullHintResolver),
        cancellation: CancellationToken::new(),
    };
    let router = Arc::new(Router::new(init).await);
    let (tx, listener) = channel_listener();
    let cancellation = CancellationToken::new();
    let server_cancellation = cancellation.clone();
    tokio::spawn(async move { serve(listener, router, server_cancellation).await });

    let (mut bad_client, bad_server) = duplex(64 * 1024);
    tx.send((Box::new(bad_server), Default::default())).unwrap();
    bad_client.write_all(&[0u8, 0, 0, 0]).await.unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(bad_client.read(&mut buf).await.unwrap(), 0, "malformed connection must be closed");

    let (mut good_client, good_server) = duplex(64 * 1024);
    tx.send((Box::new(good_server), Default::default())).unwrap();
    codec::write_frame(&mut good_client, codec::SSH_AGENTC_REQUEST_IDENTITIES, &[]).await.unwrap();
    let response = codec::read_frame(&mut good_client).await.unwrap().unwrap();
    assert_eq!(response.msg_type, codec::SSH_AGENT_FAILURE, "empty candidate list still yields a well-formed frame");
}

#[tokio::test]
async fn manual_switch_to_terminates_every_other_configured_backend_and_launches_the_target() {
    let world = Arc::new(World::new());
    world.set_running("A", true);

    let init = RouterInit {
        backends: vec![backend("A", 0, false), backend("B", 1, true)],
        default_backend: "A".to_owned(),
        backend_pipe_name: "shared".to_owned(),
        host_hints: Vec::new(),
        mapping_records: Default::default(),
        failure_cache_ttl: Duration::from_secs(60),
        timing: fast_timing(),
        connector: Arc::new(WorldConnector { world: Arc::clone(&world) }),
        process: Arc::new(WorldProcess { world: Arc::clone(&world) }),
        persister: Arc::new(RecordingPersister::default()),
        selector: Arc::new(NullSelector),
        hint_resolver: Arc::new(NullHintResolver),
        cancellation: CancellationToken::new(),
    };
    let router = Router::new(init).await;

    router.switch_to("B", true, false).await.unwrap();

    assert!(world.terminate_log.lock().unwrap().contains(&"A".to_owned()));
    assert!(world.launch_log.lock().unwrap().contains(&"B".to_owned()));
}
