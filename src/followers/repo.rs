use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::timed, error::StoreError};

#[async_trait]
pub trait FollowerStore: Send + Sync {
    /// `NotFound` when the target user does not exist, `Conflict` when the
    /// relationship already does.
    async fn follow(&self, follower_id: Uuid, user_id: Uuid) -> Result<(), StoreError>;

    /// `NotFound` when there was nothing to remove.
    async fn unfollow(&self, follower_id: Uuid, user_id: Uuid) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgFollowerStore {
    db: PgPool,
    timeout: Duration,
}

impl PgFollowerStore {
    pub fn new(db: PgPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl FollowerStore for PgFollowerStore {
    async fn follow(&self, follower_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        timed(self.timeout, async {
            let res = sqlx::query(
                r#"
                INSERT INTO followers (user_id, follower_id)
                SELECT $1, $2
                 WHERE EXISTS (SELECT 1 FROM users WHERE id = $1)
                "#,
            )
            .bind(user_id)
            .bind(follower_id)
            .execute(&self.db)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    StoreError::NotFound
                }
                other => StoreError::from(other),
            })?;
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn unfollow(&self, follower_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        timed(self.timeout, async {
            let res = sqlx::query("DELETE FROM followers WHERE user_id = $1 AND follower_id = $2")
                .bind(user_id)
                .bind(follower_id)
                .execute(&self.db)
                .await?;
            if res.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}
