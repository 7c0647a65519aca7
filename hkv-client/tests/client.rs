use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use hkv_client::{ClientConfig, KVClient};

/// Spawns a minimal single-shot HTTP/1.1 server that replies to every
/// request with `body`, then stops. Good enough to drive the client's
/// request/response path without pulling in a full HTTP server crate for
/// tests.
fn spawn_http_stub(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                if line == "\r\n" {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    addr
}

#[tokio::test]
async fn get_against_single_healthy_peer_succeeds() {
    let body = r#"{"key":"user:1","value":"Alice","found":true,"node_id":"N1"}"#;
    let addr = spawn_http_stub(body);

    let client = KVClient::new(ClientConfig {
        seeds: vec![addr],
        health_check: None,
        ..ClientConfig::default()
    });

    let resp = client.get("user:1").await.expect("get should succeed");
    assert_eq!(resp.value.as_deref(), Some("Alice"));
    assert!(resp.found);

    client.close();
}

#[tokio::test]
async fn failover_skips_unreachable_peer() {
    // "127.0.0.1:1" is not listening, so the first attempt fails fast and
    // the client must rotate to the second, healthy peer.
    let body = r#"{"key":"user:2","value":"Bob","found":true,"node_id":"N2"}"#;
    let good_addr = spawn_http_stub(body);

    let client = KVClient::new(ClientConfig {
        seeds: vec!["127.0.0.1:1".to_string(), good_addr],
        retry_count: 3,
        failure_threshold: 1,
        health_check: None,
        timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    });

    let resp = client.get("user:2").await.expect("get should eventually succeed");
    assert_eq!(resp.value.as_deref(), Some("Bob"));

    client.close();
}

#[tokio::test]
async fn node_status_reflects_failed_peer() {
    let client = KVClient::new(ClientConfig {
        seeds: vec!["127.0.0.1:1".to_string()],
        retry_count: 1,
        failure_threshold: 1,
        health_check: None,
        timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    });

    let _ = client.get("whatever").await;

    let status = client.get_node_status();
    assert_eq!(status.get("127.0.0.1:1"), Some(&false));

    client.close();
}
