//! Integration tests driving the full HTTP surface against real `NodeState`
//! instances bound to loopback sockets (spec.md §8's seed scenarios).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use hkv_common::dto::{CacheResponse, SetRequest};
use hkv_common::{NodeConfig, NodeId};
use hkv_engine::KVEngine;
use hkv_server::{coordinator, server, NodeState};

static NEXT_PORT: AtomicU16 = AtomicU16::new(18100);

fn next_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::Relaxed)
}

fn config_for(node_id: &str, address: &str, cluster_nodes: BTreeMap<String, String>) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        address: address.to_string(),
        cluster_nodes,
        cache_size: 1000,
        byte_budget: None,
        virtual_nodes: 32,
        sweep_interval_ms: 50,
        migration_timeout_ms: 2_000,
        health_check_timeout_ms: 2_000,
        log_format: "pretty".to_string(),
    }
}

/// Starts a node's HTTP listener in the background and waits for it to be
/// ready to accept connections.
async fn spawn_node(config: &NodeConfig) -> (Arc<NodeState>, Arc<Notify>) {
    let state = NodeState::new(config).expect("node state should construct from a valid config");
    let shutdown = Arc::new(Notify::new());

    let address = state.address.clone();
    let server_state = Arc::clone(&state);
    let server_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = server::run(&address, server_state, server_shutdown).await;
    });

    wait_until_listening(&state.address).await;
    (state, shutdown)
}

/// Polls the listen address until a TCP connect succeeds, instead of a fixed
/// sleep, so the test isn't flaky under load.
async fn wait_until_listening(address: &str) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(address).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("node at {address} never started accepting connections");
}

#[tokio::test]
async fn single_node_set_get_delete_roundtrip() {
    let port = next_port();
    let address = format!("127.0.0.1:{port}");
    let mut nodes = BTreeMap::new();
    nodes.insert("N1".to_string(), address.clone());
    let config = config_for("N1", &address, nodes);
    let (_state, shutdown) = spawn_node(&config).await;

    let client = reqwest::Client::new();
    let cache_url = format!("http://{address}/api/v1/cache/user:1");

    let put_resp = client
        .put(&cache_url)
        .json(&SetRequest { value: "alice".to_string(), ttl_secs: None })
        .send()
        .await
        .unwrap();
    assert!(put_resp.status().is_success());
    let put_body: CacheResponse = put_resp.json().await.unwrap();
    assert_eq!(put_body.value.as_deref(), Some("alice"));
    assert_eq!(put_body.node_id, "N1");

    let get_resp = client.get(&cache_url).send().await.unwrap();
    let get_body: CacheResponse = get_resp.json().await.unwrap();
    assert!(get_body.found);
    assert_eq!(get_body.value.as_deref(), Some("alice"));

    let delete_resp = client.delete(&cache_url).send().await.unwrap();
    assert!(delete_resp.status().is_success());

    let get_after_delete: CacheResponse = client.get(&cache_url).send().await.unwrap().json().await.unwrap();
    assert!(!get_after_delete.found);
    assert_eq!(get_after_delete.value, None);

    shutdown.notify_waiters();
}

#[tokio::test]
async fn cross_node_routing_is_transparent_to_the_caller() {
    let port_a = next_port();
    let port_b = next_port();
    let addr_a = format!("127.0.0.1:{port_a}");
    let addr_b = format!("127.0.0.1:{port_b}");

    let mut nodes = BTreeMap::new();
    nodes.insert("A".to_string(), addr_a.clone());
    nodes.insert("B".to_string(), addr_b.clone());

    let (_state_a, shutdown_a) = spawn_node(&config_for("A", &addr_a, nodes.clone())).await;
    let (_state_b, shutdown_b) = spawn_node(&config_for("B", &addr_b, nodes)).await;

    let client = reqwest::Client::new();
    let put_url = format!("http://{addr_a}/api/v1/cache/order:42");

    let put_resp = client
        .put(&put_url)
        .json(&SetRequest { value: "shipped".to_string(), ttl_secs: None })
        .send()
        .await
        .unwrap();
    assert!(put_resp.status().is_success());

    // Whichever of A/B actually owns the key, asking *either* node for it
    // must return the same value: the non-owner forwards, it doesn't miss.
    for addr in [&addr_a, &addr_b] {
        let url = format!("http://{addr}/api/v1/cache/order:42");
        let resp: CacheResponse = client.get(&url).send().await.unwrap().json().await.unwrap();
        assert!(resp.found, "key should be reachable via {addr}");
        assert_eq!(resp.value.as_deref(), Some("shipped"));
    }

    shutdown_a.notify_waiters();
    shutdown_b.notify_waiters();
}

#[tokio::test]
async fn adding_a_node_migrates_reassigned_keys_off_the_original_owner() {
    let port_a = next_port();
    let port_b = next_port();
    let addr_a = format!("127.0.0.1:{port_a}");
    let addr_b = format!("127.0.0.1:{port_b}");

    let mut single = BTreeMap::new();
    single.insert("A".to_string(), addr_a.clone());
    let (state_a, shutdown_a) = spawn_node(&config_for("A", &addr_a, single)).await;

    let mut both = BTreeMap::new();
    both.insert("A".to_string(), addr_a.clone());
    both.insert("B".to_string(), addr_b.clone());
    let (state_b, shutdown_b) = spawn_node(&config_for("B", &addr_b, both)).await;

    // Seed 200 keys while A is still the sole owner of everything.
    let client = reqwest::Client::new();
    for i in 0..200 {
        let url = format!("http://{addr_a}/api/v1/cache/key-{i}");
        client
            .put(&url)
            .json(&SetRequest { value: format!("v{i}"), ttl_secs: None })
            .send()
            .await
            .unwrap();
    }
    assert_eq!(state_a.engine.size(), 200);

    let outcome = coordinator::add_node(&state_a, NodeId::new("B"), addr_b.clone())
        .await
        .expect("add_node should succeed");
    assert!(outcome.keys_migrated > 0, "expected some keys to move to the new node");

    // Every migrated key must now be readable from B's local engine, and A
    // no longer has to forward for them (it already deleted its copy).
    assert_eq!(state_a.engine.size() as u64 + outcome.keys_migrated, 200);
    assert!(state_b.engine.size() as u64 >= outcome.keys_migrated);

    // Transparent reads against either node still resolve every key.
    for i in 0..200 {
        let url = format!("http://{addr_a}/api/v1/cache/key-{i}");
        let resp: CacheResponse = client.get(&url).send().await.unwrap().json().await.unwrap();
        assert!(resp.found, "key-{i} should still be reachable after migration");
        assert_eq!(resp.value.as_deref(), Some(format!("v{i}").as_str()));
    }

    shutdown_a.notify_waiters();
    shutdown_b.notify_waiters();
}

#[tokio::test]
async fn health_and_admin_endpoints_report_node_state() {
    let port = next_port();
    let address = format!("127.0.0.1:{port}");
    let mut nodes = BTreeMap::new();
    nodes.insert("N1".to_string(), address.clone());
    let (_state, shutdown) = spawn_node(&config_for("N1", &address, nodes)).await;

    let client = reqwest::Client::new();

    let health: hkv_common::dto::HealthResponse = client
        .get(format!("http://{address}/api/v1/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.node_id, "N1");

    let cluster: hkv_common::dto::ClusterInfoResponse = client
        .get(format!("http://{address}/admin/cluster"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cluster.node_id, "N1");
    assert_eq!(cluster.virtual_nodes, 32);
    assert_eq!(cluster.nodes.get("N1").map(String::as_str), Some(address.as_str()));

    let rebalance = client
        .post(format!("http://{address}/admin/cluster/rebalance"))
        .send()
        .await
        .unwrap();
    assert_eq!(rebalance.status(), reqwest::StatusCode::NOT_IMPLEMENTED);

    shutdown.notify_waiters();
}

#[tokio::test]
async fn client_library_fails_over_to_a_reachable_node() {
    let port = next_port();
    let address = format!("127.0.0.1:{port}");
    let mut nodes = BTreeMap::new();
    nodes.insert("N1".to_string(), address.clone());
    let (_state, shutdown) = spawn_node(&config_for("N1", &address, nodes)).await;

    let config = hkv_client::ClientConfig {
        seeds: vec!["127.0.0.1:1".to_string(), address.clone()],
        timeout: Duration::from_millis(500),
        retry_count: 3,
        failure_threshold: 1,
        health_check: None,
    };
    let client = hkv_client::KVClient::new(config);

    let resp = client.set("session:1", "token").await.expect("set should eventually reach N1");
    assert_eq!(resp.node_id, "N1");

    let resp = client.get("session:1").await.expect("get should eventually reach N1");
    assert_eq!(resp.value.as_deref(), Some("token"));

    client.close();
    shutdown.notify_waiters();
}
