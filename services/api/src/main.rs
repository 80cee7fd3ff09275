use std::sync::Arc;

use anyhow::Result;
use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig, init_pool},
    session::{RedisSessionStore, SessionResolver},
    token::{JwtConfig, JwtService},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod calculator;
mod error;
mod invoicing;
mod middleware;
mod models;
mod repositories;
mod routes;
mod settings;
mod state;

use crate::{
    invoicing::InvoiceManager,
    repositories::{InvoiceRepository, PaymentRepository, PaymentStore},
    settings::Settings,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting API service");

    let settings = Settings::load()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::migrate(&pool).await?;

    let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
    let jwt_service = JwtService::new(JwtConfig::from_env()?);

    // Initialize repositories
    let payments: Arc<dyn PaymentStore> = Arc::new(PaymentRepository::new(pool.clone()));
    let invoices = InvoiceManager::new(
        Arc::new(InvoiceRepository::new(pool)),
        payments.clone(),
        settings.invoice_due_days,
    );

    let app_state = AppState {
        resolver: SessionResolver::new(
            Arc::new(RedisSessionStore::new(redis_pool)),
            jwt_service,
            settings.session_store_timeout(),
        ),
        payments,
        invoices,
    };

    info!("API service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("API service listening on {}", settings.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
