//! 主应用程序入口
//!
//! 启动论坛实时聊天的 Axum WebSocket 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{ChatGateway, ChatGatewayDependencies, ConnectionRegistry, RoomGate, SystemClock};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgChatAccessRepository, PgMessageStore, PgSessionRepository};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;

    let shutdown = CancellationToken::new();

    let gate = RoomGate::new(Arc::new(PgChatAccessRepository::new(pg_pool.clone())));
    let registry = ConnectionRegistry::start(gate, config.presence_interval(), shutdown.clone());

    let gateway = Arc::new(
        ChatGateway::new(ChatGatewayDependencies {
            authenticator: Arc::new(PgSessionRepository::new(pg_pool.clone())),
            registry,
            message_store: Arc::new(PgMessageStore::new(pg_pool)),
            clock: Arc::new(SystemClock),
        })
        .with_write_timeout(config.write_timeout()),
    );

    let app = router(AppState::from_config(gateway, &config));
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    tracing::info!("聊天服务启动在 http://{}", config.bind_address());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("聊天服务已停止");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
    tracing::info!("收到关闭信号");
    shutdown.cancel();
}
