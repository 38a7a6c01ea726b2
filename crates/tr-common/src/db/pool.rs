use deadpool_postgres::{
    Config, CreatePoolError, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime,
};
use std::str::FromStr;
use thiserror::Error;
use tokio_postgres::NoTls;

pub type PgPool = Pool;

/// The renumbering pass runs on exactly one connection.
pub const RENUMBER_POOL_SIZE: usize = 1;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidConfig(String),
    #[error("failed to create database pool: {0}")]
    PoolCreation(#[from] CreatePoolError),
}

/// Build a pool for `db_url` without opening a connection yet.
pub fn create_pool_from_url(db_url: &str, max_size: usize) -> Result<PgPool, DbPoolError> {
    if db_url.trim().is_empty() {
        return Err(DbPoolError::InvalidConfig("database url is empty".into()));
    }
    let _ = tokio_postgres::Config::from_str(db_url)
        .map_err(|e| DbPoolError::InvalidConfig(e.to_string()))?;

    let mut cfg = Config::new();
    cfg.url = Some(db_url.to_string());
    cfg.pool = Some(PoolConfig::new(max_size.max(1)));

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(DbPoolError::PoolCreation)
}
