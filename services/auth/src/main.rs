use std::sync::Arc;

use anyhow::Result;
use common::{
    cache::{RedisConfig, RedisPool},
    database,
    session::{RedisSessionStore, SessionResolver, SessionStore},
    token::{JwtConfig, JwtService},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod authenticator;
mod error;
mod middleware;
mod models;
mod password;
mod rate_limiter;
mod repositories;
mod routes;
mod settings;
mod validation;

use crate::{
    authenticator::SessionAuthenticator,
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::{UserRepository, UserStore},
    settings::Settings,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub authenticator: SessionAuthenticator,
    pub resolver: SessionResolver,
    pub users: Arc<dyn UserStore>,
    pub rate_limiter: RateLimiter,
    pub settings: Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting authentication service");

    let settings = Settings::load()?;

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::migrate(&pool).await?;

    // Initialize Redis connection pool
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    let jwt_service = JwtService::new(JwtConfig::from_env()?);

    let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(pool));
    let sessions: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(redis_pool));

    let app_state = AppState {
        authenticator: SessionAuthenticator::new(
            users.clone(),
            sessions.clone(),
            jwt_service.clone(),
            settings.session_ttl(),
            settings.session_store_timeout(),
        ),
        resolver: SessionResolver::new(sessions, jwt_service, settings.session_store_timeout()),
        users,
        rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
        settings: settings.clone(),
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("Authentication service listening on {}", settings.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
