//! Waiting for launched storage processes to register

mod common;

use common::{cluster, register, BASE_PORT};
use ringkv::coordination::Coordination;
use ringkv::coordinator::EvictionPolicy;
use ringkv::Error;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_times_out_with_too_few_registrations() {
    let (ecs, coord) = cluster(3).await;
    register(&coord, BASE_PORT).await;
    register(&coord, BASE_PORT + 1).await;

    let started = Instant::now();
    assert!(!ecs.await_nodes(3, Duration::from_millis(500)).await.unwrap());
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_returns_once_the_last_node_registers() {
    let (ecs, coord) = cluster(3).await;
    register(&coord, BASE_PORT).await;
    register(&coord, BASE_PORT + 1).await;

    let late = coord.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        register(&late, BASE_PORT + 2).await;
    });

    let started = Instant::now();
    assert!(ecs.await_nodes(3, Duration::from_millis(500)).await.unwrap());
    assert!(started.elapsed() < Duration::from_millis(500));

    // those three are accounted for now
    assert!(!ecs.await_nodes(1, Duration::from_millis(50)).await.unwrap());
}

#[tokio::test]
async fn test_zero_count_is_immediate() {
    let (ecs, _) = cluster(1).await;
    assert!(ecs.await_nodes(0, Duration::from_millis(10)).await.unwrap());
}

#[tokio::test]
async fn test_removal_drops_the_registration() {
    let (ecs, coord) = cluster(2).await;
    let added = ecs.add_nodes(2, 64, EvictionPolicy::Fifo).await.unwrap();
    for node in &added {
        register(&coord, node.port).await;
    }
    assert!(ecs.await_nodes(2, Duration::from_millis(200)).await.unwrap());

    ecs.remove_nodes(&[added[0].name.clone()]).await.unwrap();
    let path = ecs.paths().registration(added[0].port);
    assert!(coord.exists(&path).await.unwrap().is_none());

    // re-adding and re-registering the same server counts as one new node
    let again = ecs.add_nodes(1, 64, EvictionPolicy::Fifo).await.unwrap();
    register(&coord, again[0].port).await;
    assert!(ecs.await_nodes(1, Duration::from_millis(200)).await.unwrap());
}

#[tokio::test]
async fn test_does_not_block_other_operations() {
    let (ecs, _) = cluster(2).await;

    let waiter = {
        let ecs = ecs.clone();
        tokio::spawn(async move { ecs.await_nodes(1, Duration::from_millis(300)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // the coordinator lock is free while the waiter sleeps
    let added = tokio::time::timeout(
        Duration::from_millis(200),
        ecs.add_nodes(1, 64, EvictionPolicy::Lfu),
    )
    .await
    .expect("add_nodes blocked behind await_nodes")
    .unwrap();
    assert_eq!(added.len(), 1);

    assert!(!waiter.await.unwrap().unwrap());
}

#[tokio::test]
async fn test_disconnect_while_waiting() {
    let (ecs, coord) = cluster(1).await;
    let waiter = {
        let ecs = ecs.clone();
        tokio::spawn(async move { ecs.await_nodes(1, Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    coord.disconnect();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::CoordinationUnavailable(_))));
}
