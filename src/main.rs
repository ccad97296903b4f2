use anyhow::Context;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tenant_scope::app::{app, AppState};
use tenant_scope::config;
use tenant_scope::database::{DatabaseManager, PgScopePool, PgTenantRegistry};
use tenant_scope::tenancy::Tenancy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = config::config();
    tracing::info!("Starting tenant-scope in {:?} mode", config.environment);

    let database = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    let registry = PgTenantRegistry::new(
        database.pool().clone(),
        &config.tenancy.shared_schema,
        &config.database.registry_table,
    )?;
    let pool = PgScopePool::new(database.clone());

    // Refuse to serve without a usable registry
    let tenancy = Tenancy::initialize(config, Arc::new(registry), Arc::new(pool))
        .await
        .context("tenant registry bootstrap failed")?;

    let mut router = app(AppState::new(tenancy));
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router).await.context("server")?;
    database.close().await;
    Ok(())
}
