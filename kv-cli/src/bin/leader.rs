use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use log::info;

use kvcli::server::config::LeaderConfig;
use kvcli::server::leader::{router, AppState};
use kvcli::trace;

#[tokio::main]
async fn main() -> Result<()> {
    let log_dir = format!(
        "{}/.kvcli",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    );
    let _guards = trace::init_logging(&log_dir, &trace::level_from_env()).await?;

    let config = LeaderConfig::from_env();
    info!(
        "leader starting: followers={:?} write_quorum={} min_delay={:?} max_delay={:?}",
        config.followers, config.write_quorum, config.min_delay, config.max_delay
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("leader listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight replication tasks is not awaited: they are detached and complete independently");
}
