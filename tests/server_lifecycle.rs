//! Shutdown path of the served process

mod common;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::FakeLauncher;
use rfrender::config::ServiceConfig;
use rfrender::server::serve;
use rfrender::{EngineManager, EngineStatus};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn config() -> ServiceConfig {
    ServiceConfig::try_parse_from(["rfrender", "--secret", "s", "--shutdown-grace-ms", "1000"])
        .unwrap()
}

#[tokio::test]
async fn test_signal_stops_server_and_engine() {
    let (launcher, counters) = FakeLauncher::new();
    let manager = Arc::new(EngineManager::new(launcher));
    manager.acquire_engine().await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let config = config();

    let served = tokio::spawn({
        let manager = manager.clone();
        async move {
            serve(listener, manager, &config, async move {
                let _ = rx.await;
            })
            .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), served)
        .await
        .expect("serve did not return after the signal")
        .expect("serve task panicked");

    assert!(result.is_ok());
    assert_eq!(counters.engine_closes(), 1);
    assert_eq!(manager.status(), EngineStatus::Stopped);
}

#[tokio::test]
async fn test_signal_with_cold_engine_exits_cleanly() {
    let (launcher, counters) = FakeLauncher::new();
    let manager = Arc::new(EngineManager::new(launcher));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let result = serve(listener, manager.clone(), &config(), async {}).await;

    assert!(result.is_ok());
    assert_eq!(counters.launches(), 0);
    assert_eq!(counters.engine_closes(), 0);
    assert_eq!(manager.status(), EngineStatus::Stopped);
}
