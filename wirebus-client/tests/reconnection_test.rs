//! Client reconnection integration tests
//!
//! Tests for automatic reconnection, the retry budget and the terminal
//! `Failed` state.

mod common;

use common::{event, eventually, unused_addr, MockWsServer};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wirebus_client::{
    ClientBuilder, ClientConfig, ConnectionState, ExponentialBackoff, FnResolver,
    LifecycleEvent, ReconnectionStrategy,
};
use wirebus_core::Error;

const WAIT: Duration = Duration::from_secs(5);

fn fast_config(max_attempts: u32) -> ClientConfig {
    ClientConfig {
        base_reconnect_delay_ms: 20,
        max_reconnect_delay_ms: 100,
        max_reconnect_attempts: max_attempts,
        default_request_timeout_ms: 2_000,
    }
}

#[tokio::test]
async fn test_reconnect_after_connection_drop() {
    let server = MockWsServer::new().await;
    let client = ClientBuilder::new(server.url())
        .config(fast_config(5))
        .connect()
        .await
        .unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    client.on_lifecycle(move |event| {
        if let LifecycleEvent::StateChanged { to, .. } = event {
            sink.lock().unwrap().push(to.clone());
        }
    });

    server.drop_connections();

    assert!(eventually(WAIT, || server.connection_count() == 2).await);
    client.wait_until_connected(WAIT).await.unwrap();
    assert_eq!(client.reconnect_attempts(), 0);

    let states = states.lock().unwrap().clone();
    assert_eq!(states[0], ConnectionState::Disconnected);
    assert_eq!(states[1], ConnectionState::Reconnecting { attempt: 1 });
    assert_eq!(states.last(), Some(&ConnectionState::Connected));

    client.disconnect().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_subscriptions_survive_reconnect() {
    let server = MockWsServer::new().await;
    let client = ClientBuilder::new(server.url())
        .config(fast_config(5))
        .connect()
        .await
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = client.subscribe("health", move |data| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(data);
        }
    });

    server.drop_connections();
    assert!(eventually(WAIT, || server.connection_count() == 2).await);
    client.wait_until_connected(WAIT).await.unwrap();

    server.push(event("health", json!("ok")));
    assert!(eventually(WAIT, || seen.lock().unwrap().len() == 1).await);

    client.disconnect().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_pending_request_fails_fast_on_drop() {
    let server = MockWsServer::new().await;
    let client = ClientBuilder::new(server.url())
        .config(fast_config(5))
        .connect()
        .await
        .unwrap();

    let timeout = Duration::from_secs(10);
    let started = std::time::Instant::now();
    let handle = client
        .begin_request("slow_report", json!({}), timeout)
        .await
        .unwrap();

    server.drop_connections();

    let result: Result<serde_json::Value, Error> = handle.response().await;
    assert_eq!(result.unwrap_err(), Error::ConnectionLost);
    assert!(started.elapsed() < timeout);

    client.disconnect().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_send_while_reconnecting_is_not_connected() {
    let addr = unused_addr().await;
    let client = ClientBuilder::new(format!("ws://{}", addr))
        .config(ClientConfig {
            base_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 1_000,
            ..fast_config(5)
        })
        .build()
        .unwrap();

    client.connect().unwrap();
    let mut rx = client.watch_state();
    tokio::time::timeout(
        WAIT,
        rx.wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. })),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(
        client.send("health", json!({})).await.unwrap_err(),
        Error::NotConnected
    );

    client.disconnect().await;
}

#[tokio::test]
async fn test_fails_after_max_attempts_and_stops_opening() {
    let addr = unused_addr().await;
    let client = ClientBuilder::new(format!("ws://{}", addr))
        .config(fast_config(3))
        .build()
        .unwrap();

    let connecting = Arc::new(AtomicUsize::new(0));
    let terminal = Arc::new(Mutex::new(None));
    {
        let connecting = Arc::clone(&connecting);
        let terminal = Arc::clone(&terminal);
        client.on_lifecycle(move |event| match event {
            LifecycleEvent::StateChanged {
                to: ConnectionState::Connecting,
                ..
            } => {
                connecting.fetch_add(1, Ordering::SeqCst);
            }
            LifecycleEvent::Error(e) => {
                *terminal.lock().unwrap() = Some(e.clone());
            }
            _ => {}
        });
    }

    client.connect().unwrap();
    let result = client.wait_until_connected(WAIT).await;
    assert_eq!(
        result.unwrap_err(),
        Error::MaxReconnectAttemptsExceeded { attempts: 3 }
    );
    assert_eq!(client.state(), ConnectionState::Failed);
    assert_eq!(
        *terminal.lock().unwrap(),
        Some(Error::MaxReconnectAttemptsExceeded { attempts: 3 })
    );

    // Three consecutive failures, then nothing more
    assert_eq!(connecting.load(Ordering::SeqCst), 3);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(connecting.load(Ordering::SeqCst), 3);
    assert_eq!(client.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_manual_connect_after_failed_resets_counter() {
    let dead = format!("ws://{}", unused_addr().await);
    let server = MockWsServer::new().await;

    // Endpoint is resolved per attempt, so it can be repointed between opens
    let target = Arc::new(Mutex::new(dead));
    let resolver_target = Arc::clone(&target);
    let client = ClientBuilder::new(server.url())
        .with_endpoint_resolver(FnResolver(move || Ok(resolver_target.lock().unwrap().clone())))
        .config(fast_config(2))
        .build()
        .unwrap();

    client.connect().unwrap();
    assert!(client.wait_until_connected(WAIT).await.is_err());
    assert_eq!(client.state(), ConnectionState::Failed);
    assert_eq!(client.reconnect_attempts(), 2);

    *target.lock().unwrap() = server.url();
    client.connect().unwrap();
    client.wait_until_connected(WAIT).await.unwrap();
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(server.connection_count(), 1);

    client.disconnect().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_explicit_strategy_overrides_config() {
    struct CountingStrategy(Arc<AtomicUsize>);

    impl ReconnectionStrategy for CountingStrategy {
        fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }

        fn reset(&mut self) {}
    }

    let addr = unused_addr().await;
    let consulted = Arc::new(AtomicUsize::new(0));
    let client = ClientBuilder::new(format!("ws://{}", addr))
        .config(fast_config(10))
        .with_reconnect(Box::new(CountingStrategy(Arc::clone(&consulted))))
        .build()
        .unwrap();

    client.connect().unwrap();
    assert!(client.wait_until_connected(WAIT).await.is_err());
    assert_eq!(consulted.load(Ordering::SeqCst), 1);
}

#[test]
fn test_backoff_delays_non_decreasing_and_capped() {
    let mut backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(2))
        .with_max_attempts(8)
        .without_jitter();

    let delays: Vec<Duration> = (1..=8).map(|a| backoff.next_delay(a).unwrap()).collect();
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(delays[0], Duration::from_millis(100));
    assert_eq!(*delays.last().unwrap(), Duration::from_secs(2));
    assert!(backoff.next_delay(9).is_none());
}
