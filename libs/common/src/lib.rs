//! Common library for the fee ledger services
//!
//! This crate provides functionality shared by the auth and api services:
//! database connectivity, the Redis-backed session store, bearer tokens,
//! roles, and the authorization gate both services enforce.
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use common::{
//!     cache::{RedisConfig, RedisPool},
//!     session::{RedisSessionStore, SessionResolver},
//!     token::{JwtConfig, JwtService},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
//!     let jwt_service = JwtService::new(JwtConfig::from_env()?);
//!     let resolver = SessionResolver::new(
//!         Arc::new(RedisSessionStore::new(redis_pool)),
//!         jwt_service,
//!         Duration::from_secs(5),
//!     );
//!     let session = resolver.resolve(Some("session-id"), None).await;
//!     println!("resolved: {}", session.is_ok());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod roles;
pub mod session;
pub mod token;
