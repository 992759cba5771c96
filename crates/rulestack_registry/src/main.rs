use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rulestack_registry::config::Config;
use rulestack_registry::middleware::rate_limit;
use rulestack_registry::state::AppState;
use rulestack_registry::{app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    fs_err::create_dir_all(&config.storage_dir)?;
    let pool = db::connect(&config.database_url).await?;

    let state = AppState::new(
        pool,
        config.storage_dir.clone(),
        &config.jwt_secret,
        config.jwt_ttl_hours,
    );
    let _reaper = rate_limit::spawn_reaper(Arc::clone(&state.rate_limiter));
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("rulestack registry listening on {}", config.addr);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;
    Ok(())
}
