use std::sync::Arc;

use bifl_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, PgCatalog, RedisSessionStore},
    services::{CompletionProvider, OpenAiProvider, UnconfiguredProvider},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bifl_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Catalog
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let catalog = Arc::new(PgCatalog::new(pool));

    // Session snapshots
    let redis_client = create_redis_client(&config.redis_url)?;
    let (store, writer_handle) = RedisSessionStore::new(redis_client, config.session_ttl_secs);

    // AI re-ranking
    let completion: Arc<dyn CompletionProvider> = match config.ai_api_key.clone() {
        Some(key) if !key.trim().is_empty() => Arc::new(OpenAiProvider::new(
            key,
            config.ai_api_url.clone(),
            config.ai_model.clone(),
            config.ai_timeout(),
        )?),
        _ => {
            tracing::warn!("AI_API_KEY not set, recommendations use heuristic ranking only");
            Arc::new(UnconfiguredProvider)
        }
    };
    tracing::info!(provider = completion.name(), model = %config.ai_model, "Completion provider ready");

    let state = AppState::from_backends(catalog, Arc::new(store), completion, config.ai_timeout());
    let flush_handle = state
        .sessions
        .clone()
        .spawn_flush_task(config.flush_interval(), config.session_idle());

    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Persist resident sessions, then drain pending snapshot writes
    flush_handle.shutdown().await;
    writer_handle.shutdown().await;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
