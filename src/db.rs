use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DbConfig;
use crate::error::StoreError;

pub async fn connect(cfg: &DbConfig) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(cfg.query_timeout())
        .connect(&cfg.url)
        .await
        .context("connect to database")?;
    Ok(db)
}

/// Runs a store operation under a deadline.
///
/// On timeout the inner future is dropped, and with it any open
/// transaction, which sqlx rolls back.
pub async fn timed<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => {
            tracing::warn!(?limit, "store operation timed out");
            Err(StoreError::Timeout)
        }
    }
}
