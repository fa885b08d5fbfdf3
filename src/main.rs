use std::sync::Arc;
use std::time::Duration;

use sportmates::core::auth::{AuthApiState, AuthService, BcryptHasher, JwtService, app_router};
use sportmates::core::cache::{MemorySessionStore, RedisSessionStore, SessionStore};
use sportmates::core::config::{AuthSettings, Config};
use sportmates::core::db::{
    CredentialStore, DbConfig, MemoryCredentialStore, UserRepository, create_pool_with_migrations,
    health_check,
};
use sportmates::core::messaging::{
    ChannelEmailPublisher, DEFAULT_QUEUE_CAPACITY, spawn_email_logger,
};
use tracing_subscriber::EnvFilter;

/// How often expired in-memory cache entries are swept
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load application config from environment variables
    let config = Config::from_env();
    let settings = AuthSettings::from_env();
    let jwt = JwtService::from_env()?;

    // Log config status (without revealing secrets)
    tracing::info!(
        database = config.has_database(),
        redis = config.has_redis(),
        revoke_on_refresh_mismatch = settings.revoke_on_refresh_mismatch,
        "Config loaded"
    );

    let users: Arc<dyn CredentialStore> = if config.has_database() {
        let pool = create_pool_with_migrations(&DbConfig::from_env()?).await?;
        health_check(&pool).await?;
        tracing::info!("Using PostgreSQL credential store");
        Arc::new(UserRepository::new(pool))
    } else {
        tracing::warn!("DATABASE_URL not set, users are kept in memory");
        Arc::new(MemoryCredentialStore::new())
    };

    let sessions: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisSessionStore::connect(url).await?;
            tracing::info!("Using Redis session store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("REDIS_URL not set, sessions are kept in memory");
            let store = Arc::new(MemorySessionStore::new());
            spawn_cache_purger(store.clone());
            store
        }
    };

    let (publisher, email_rx) = ChannelEmailPublisher::new(DEFAULT_QUEUE_CAPACITY);
    spawn_email_logger(email_rx);

    let auth_service = AuthService::new(
        users,
        sessions,
        Arc::new(jwt),
        Arc::new(BcryptHasher::new(settings.bcrypt_cost)),
    )
    .with_settings(settings)
    .with_email_publisher(Arc::new(publisher));

    let app = app_router(AuthApiState { auth_service }, config.request_timeout);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_cache_purger(store: Arc<MemorySessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired cache entries");
            }
        }
    });
}
