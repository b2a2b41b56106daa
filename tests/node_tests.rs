//! Supervising node tests
//!
//! Whole nodes on loopback, stopped by a timer instead of Ctrl+C.

mod common;

use std::time::Duration;

use beacon_mesh::config::NodeConfig;
use beacon_mesh::Node;

use common::{free_port, peers};

fn node_config(address: u16, group: &[(&str, u16)], heartbeat_ms: u64) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.address = address;
    config.node.heartbeat_interval_ms = heartbeat_ms;
    config.peers = peers(group);
    config.transport.warmup_ms = 300;
    config.transport.bind_retry_interval_ms = 20;
    config.transport.connect_retry_initial_ms = 10;
    config.transport.connect_retry_max_ms = 50;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lone_node_keeps_leadership() {
    let port = free_port();
    let config = node_config(port, &[("self", port)], 50);

    let stats = Node::new(&config)
        .run_until(tokio::time::sleep(Duration::from_millis(1500)))
        .await
        .unwrap();

    assert!(stats.heartbeats_sent > 0);
    assert_eq!(stats.stand_downs, 0);
    assert!(stats.messages_received > 0, "own heartbeats should come back");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slower_node_stands_down() {
    let fast = free_port();
    let slow = free_port();
    let group = [("fast", fast), ("slow", slow)];

    let fast_node = Node::new(&node_config(fast, &group, 50));
    let slow_node = Node::new(&node_config(slow, &group, 400));

    let (fast_stats, slow_stats) = tokio::join!(
        fast_node.run_until(tokio::time::sleep(Duration::from_millis(2500))),
        slow_node.run_until(tokio::time::sleep(Duration::from_millis(2500))),
    );
    let fast_stats = fast_stats.unwrap();
    let slow_stats = slow_stats.unwrap();

    assert!(fast_stats.heartbeats_sent > 0);
    assert!(slow_stats.stand_downs > 0, "slow node should see the fast node's heartbeats");
    assert!(slow_stats.messages_received > 0);
}

#[tokio::test]
async fn test_shutdown_before_ready() {
    let port = free_port();
    let mut config = node_config(port, &[], 50);
    config.transport.warmup_ms = 10_000;

    let stats = Node::new(&config)
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(stats.heartbeats_sent, 0);
    assert_eq!(stats.messages_received, 0);
}

#[tokio::test]
async fn test_bind_timeout_surfaces_error() {
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let mut config = node_config(port, &[], 50);
    config.transport.bind_timeout_ms = 100;

    let err = Node::new(&config)
        .run_until(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, beacon_mesh::Error::BindTimeout { .. }));
    assert_eq!(err.exit_code(), 30);
}
