//! Status changes, revival timers and backoff policy.

use std::sync::Arc;
use std::time::Duration;

use node_pool::config::{parse_config, ConfigError};
use node_pool::transport::TransportRequest;
use node_pool::{DeadTimeout, Pool, PoolBuilder, PoolConfig, Status};
use reqwest::Method;

mod common;
use common::{assert_partition, host, ScriptedTransport};

fn pool_on(transport: &Arc<ScriptedTransport>, dead_timeout_ms: u64) -> Pool {
    Pool::builder()
        .dead_timeout(DeadTimeout::Flat)
        .dead_timeout_ms(dead_timeout_ms)
        .transport(transport.clone())
        .build()
        .unwrap()
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn dead_connection_leaves_the_alive_list() {
    let transport = ScriptedTransport::new();
    let pool = pool_on(&transport, 60_000);
    pool.set_hosts([host(9200), host(9201)]);

    let conn = pool.connection(&host(9200)).unwrap();
    conn.set_status(Status::Dead);

    let alive = pool.get_connections();
    assert_eq!(alive.len(), 1);
    assert_eq!(alive[0].host(), &host(9201));
    assert!(Arc::ptr_eq(&pool.dead_connections()[0], &conn));
    assert_eq!(pool.pending_revivals(), 1);
    assert_partition(&pool);
}

#[tokio::test(start_paused = true)]
async fn redeath_replaces_the_timer() {
    let transport = ScriptedTransport::new();
    let pool = pool_on(&transport, 60_000);
    pool.set_hosts([host(9200)]);
    let conn = pool.connection(&host(9200)).unwrap();

    conn.set_status(Status::Dead);
    let first_id = pool.revival_timer_id(&conn).unwrap();
    let first_deadline = pool.revival_deadline(&conn).unwrap();

    tokio::time::advance(Duration::from_millis(100)).await;
    conn.set_status(Status::Dead);

    assert_eq!(conn.deaths(), 2);
    assert_ne!(pool.revival_timer_id(&conn), Some(first_id));
    assert!(pool.revival_deadline(&conn).unwrap() > first_deadline);
    assert_eq!(pool.pending_revivals(), 1);
    assert_eq!(pool.dead_connections().len(), 1);
}

#[tokio::test]
async fn reasserting_alive_keeps_order() {
    let transport = ScriptedTransport::new();
    let pool = pool_on(&transport, 60_000);
    pool.set_hosts([host(9200), host(9201), host(9202)]);
    let before: Vec<String> = pool.get_connections().iter().map(|c| c.key()).collect();

    pool.connection(&host(9200)).unwrap().set_status(Status::Alive);

    let after: Vec<String> = pool.get_connections().iter().map(|c| c.key()).collect();
    assert_eq!(before, after);
    assert_eq!(pool.pending_revivals(), 0);
}

#[tokio::test]
async fn revived_connection_goes_to_the_back() {
    let transport = ScriptedTransport::new();
    let pool = pool_on(&transport, 60_000);
    pool.set_hosts([host(9200), host(9201)]);
    let conn = pool.connection(&host(9200)).unwrap();

    conn.set_status(Status::Dead);
    conn.set_status(Status::Alive);

    let alive = pool.get_connections();
    assert!(Arc::ptr_eq(&alive[1], &conn));
    assert_eq!(conn.deaths(), 0);
    assert!(pool.revival_deadline(&conn).is_none());
    assert!(pool.dead_connections().is_empty());
}

#[tokio::test]
async fn failed_request_reports_the_connection_dead() {
    let transport = ScriptedTransport::new();
    let pool = pool_on(&transport, 60_000);
    pool.set_hosts([host(9200)]);
    let conn = pool.connection(&host(9200)).unwrap();
    transport.set_down(conn.host(), true);

    let result = conn.request(TransportRequest::new(Method::GET, "/")).await;

    assert!(result.is_err());
    assert_eq!(conn.status(), Status::Dead);
    assert!(pool.get_connections().is_empty());
    assert_eq!(pool.dead_connections().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_timer_revives_a_healthy_node() {
    let transport = ScriptedTransport::new();
    let pool = pool_on(&transport, 1_000);
    pool.set_hosts([host(9200)]);
    let conn = pool.connection(&host(9200)).unwrap();

    conn.set_status(Status::Dead);
    tokio::time::sleep(Duration::from_millis(999)).await;
    settle().await;
    assert_eq!(conn.status(), Status::Dead);
    assert!(transport.pings().is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    settle().await;

    assert_eq!(transport.pings(), vec![conn.key()]);
    assert_eq!(conn.status(), Status::Alive);
    assert_eq!(pool.get_connections().len(), 1);
    assert_eq!(pool.pending_revivals(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_timer_rearms_a_failing_node() {
    let transport = ScriptedTransport::new();
    let pool = pool_on(&transport, 1_000);
    pool.set_hosts([host(9200)]);
    let conn = pool.connection(&host(9200)).unwrap();
    transport.set_down(conn.host(), true);

    conn.set_status(Status::Dead);
    let first_deadline = pool.revival_deadline(&conn).unwrap();

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    settle().await;

    assert_eq!(transport.pings().len(), 1);
    assert_eq!(conn.status(), Status::Dead);
    assert_eq!(conn.deaths(), 2);
    assert!(pool.revival_deadline(&conn).unwrap() >= first_deadline + Duration::from_millis(1_000));
    assert_eq!(pool.pending_revivals(), 1);
}

#[tokio::test]
async fn policy_comes_from_config() {
    let config = parse_config(
        r#"
        dead_timeout_ms = 10000
        calc_dead_timeout = "flat"
        hosts = ["localhost:9200"]
        "#,
    )
    .unwrap();
    let pool = PoolBuilder::from_config(&config)
        .unwrap()
        .transport(ScriptedTransport::new())
        .build()
        .unwrap();

    assert_eq!(pool.dead_timeout_policy().name(), "flat");
    assert_eq!(pool.calc_dead_timeout(10, 5000), 5000);
    assert_eq!(pool.len(), 1);

    let config = parse_config("max_dead_timeout_ms = 20000").unwrap();
    let pool = PoolBuilder::from_config(&config)
        .unwrap()
        .transport(ScriptedTransport::new())
        .build()
        .unwrap();

    assert_eq!(pool.dead_timeout_policy().name(), "exponential");
    assert_eq!(pool.calc_dead_timeout(0, 1000), 1000);
    assert_eq!(pool.calc_dead_timeout(4, 1000), 4000);
    assert_eq!(pool.calc_dead_timeout(100, 1000), 20000);
}

#[test]
fn unknown_policy_fails_at_construction() {
    let config = PoolConfig {
        calc_dead_timeout: "linear".to_string(),
        ..Default::default()
    };

    match PoolBuilder::from_config(&config) {
        Err(ConfigError::UnknownDeadTimeoutPolicy(e)) => assert_eq!(e.0, "linear"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("unknown policy was accepted"),
    }
    assert!(matches!(
        parse_config(r#"calc_dead_timeout = "linear""#),
        Err(ConfigError::Validation(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn snapshot_lists_dead_nodes_in_revival_order() {
    let transport = ScriptedTransport::new();
    let pool = pool_on(&transport, 10_000);
    pool.set_hosts([host(9200), host(9201), host(9202)]);

    pool.connection(&host(9201)).unwrap().set_status(Status::Dead);
    tokio::time::advance(Duration::from_millis(1_000)).await;
    pool.connection(&host(9200)).unwrap().set_status(Status::Dead);

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.alive, vec![host(9202).key()]);
    assert_eq!(snapshot.dead.len(), 2);
    assert_eq!(snapshot.dead[0].host, host(9201).key());
    assert_eq!(snapshot.dead[0].retry_in_ms, 9_000);
    assert_eq!(snapshot.dead[1].host, host(9200).key());
    assert_eq!(snapshot.dead[1].retry_in_ms, 10_000);
    assert!(snapshot.dead.iter().all(|d| d.deaths == 1));
}
