//! Process lifecycle: bind, serve, and tear down on SIGTERM/SIGINT.
//!
//! Shutdown stops accepting connections, lets in-flight renders drain for up
//! to the grace period and then stops the engine so no Chrome process
//! outlives the service.

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::ServiceConfig;
use crate::http::{router, AppState};
use crate::{EngineLauncher, EngineManager, RenderPipeline};

/// Serve on `listener` until `signal` resolves, then drain and stop the engine.
pub async fn serve<L, S>(
    listener: TcpListener,
    manager: Arc<EngineManager<L>>,
    config: &ServiceConfig,
    signal: S,
) -> std::io::Result<()>
where
    L: EngineLauncher,
    S: Future<Output = ()> + Send,
{
    let pipeline = RenderPipeline::new(manager.clone(), config.pipeline_config());
    let secret = config.secret();
    if secret.is_none() {
        warn!("No render secret configured; every /render request will be rejected");
    }
    let app = router(AppState::new(pipeline, secret), config.body_limit_bytes());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .into_future(),
    );

    let result = tokio::select! {
        joined = &mut server => {
            // The server stopped without being asked to.
            flatten(joined)
        }
        _ = signal => {
            info!("Shutdown requested, draining in-flight requests");
            let _ = stop_tx.send(());
            match tokio::time::timeout(config.shutdown_grace(), &mut server).await {
                Ok(joined) => flatten(joined),
                Err(_) => {
                    warn!(
                        "In-flight requests did not finish within {}ms",
                        config.shutdown_grace_ms
                    );
                    server.abort();
                    Ok(())
                }
            }
        }
    };

    let grace = config.shutdown_grace();
    if tokio::time::timeout(grace, manager.shutdown_engine())
        .await
        .is_err()
    {
        warn!("Engine shutdown exceeded {}ms, exiting anyway", grace.as_millis());
    }
    info!("Render service stopped");

    result
}

fn flatten(
    joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> std::io::Result<()> {
    match joined {
        Ok(res) => res,
        Err(e) => {
            error!("Server task failed: {}", e);
            Err(std::io::Error::other(e.to_string()))
        }
    }
}

/// Bind the configured address and serve until SIGTERM or Ctrl-C.
pub async fn run<L: EngineLauncher>(config: ServiceConfig, launcher: L) -> std::io::Result<()> {
    let manager = Arc::new(EngineManager::new(launcher));
    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("Render service listening on {}", listener.local_addr()?);
    serve(listener, manager, &config, shutdown_signal()).await
}

/// Resolves on the first SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
