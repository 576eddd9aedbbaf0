use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_bff::{
    config::AppConfig,
    db::{create_orm_conn, pool_of, run_migrations},
    idempotency::{IdempotencyStore, MemoryIdempotencyStore, PgIdempotencyStore},
    routes::create_app,
    state::AppState,
    upstream::CoreClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront_bff=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let core = Arc::new(CoreClient::new(&config.core)?);

    let (idempotency, audit) = match &config.database_url {
        Some(database_url) => {
            let orm = create_orm_conn(database_url).await?;
            run_migrations(&orm).await?;
            let pool = pool_of(&orm);
            let store: Arc<dyn IdempotencyStore> = Arc::new(PgIdempotencyStore::new(orm));
            (store, Some(pool))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL is not set; idempotency keys are kept in memory and audit logging is off"
            );
            let store: Arc<dyn IdempotencyStore> = Arc::new(MemoryIdempotencyStore::new());
            (store, None)
        }
    };

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    tracing::info!(core = %config.core.base_url, "core upstream configured");

    let app = create_app(AppState::new(config, core, idempotency, audit));

    tracing::info!("listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
