use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewPost, Post, INITIAL_VERSION};
use crate::{db::timed, error::StoreError};

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, new_post: &NewPost) -> Result<Post, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Post, StoreError>;

    /// Writes `post`'s mutable fields only if the stored version still
    /// equals `post.version`. Returns the row as written, at `version + 1`.
    ///
    /// Fails with `Stale` when the row moved on and `NotFound` when it is
    /// gone.
    async fn update(&self, post: &Post) -> Result<Post, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgPostStore {
    db: PgPool,
    timeout: Duration,
}

impl PgPostStore {
    pub fn new(db: PgPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create(&self, new_post: &NewPost) -> Result<Post, StoreError> {
        timed(self.timeout, async {
            let post = sqlx::query_as::<_, Post>(
                r#"
                INSERT INTO posts (user_id, title, content, tags, version)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, user_id, title, content, tags, created_at, updated_at, version
                "#,
            )
            .bind(new_post.user_id)
            .bind(&new_post.title)
            .bind(&new_post.content)
            .bind(&new_post.tags)
            .bind(INITIAL_VERSION)
            .fetch_one(&self.db)
            .await
            .map_err(|e| match e {
                // the author row is gone
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    StoreError::NotFound
                }
                other => StoreError::from(other),
            })?;
            Ok(post)
        })
        .await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Post, StoreError> {
        timed(self.timeout, async {
            let post = sqlx::query_as::<_, Post>(
                r#"
                SELECT id, user_id, title, content, tags, created_at, updated_at, version
                FROM posts
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_one(&self.db)
            .await?;
            Ok(post)
        })
        .await
    }

    async fn update(&self, post: &Post) -> Result<Post, StoreError> {
        timed(self.timeout, async {
            let updated = sqlx::query_as::<_, Post>(
                r#"
                UPDATE posts
                   SET title = $1, content = $2, version = version + 1, updated_at = now()
                 WHERE id = $3 AND version = $4
                RETURNING id, user_id, title, content, tags, created_at, updated_at, version
                "#,
            )
            .bind(&post.title)
            .bind(&post.content)
            .bind(post.id)
            .bind(post.version)
            .fetch_optional(&self.db)
            .await?;

            if let Some(updated) = updated {
                return Ok(updated);
            }

            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1)",
            )
            .bind(post.id)
            .fetch_one(&self.db)
            .await?;
            Err(if exists {
                StoreError::Stale
            } else {
                StoreError::NotFound
            })
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        timed(self.timeout, async {
            let res = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
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

#[cfg(test)]
mod tests {
    use super::*;

    async fn author(pool: &PgPool) -> Uuid {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ('a', 'a@x.com', 'h')
            RETURNING id
            "#,
        )
        .fetch_one(pool)
        .await
        .unwrap()
    }

    fn new_post(user_id: Uuid) -> NewPost {
        NewPost {
            user_id,
            title: "hello".into(),
            content: "first".into(),
            tags: vec!["intro".into()],
        }
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn versioned_update_against_postgres(pool: PgPool) {
        let store = PgPostStore::new(pool.clone(), Duration::from_secs(5));
        let post = store.create(&new_post(author(&pool).await)).await.unwrap();
        assert_eq!(post.version, INITIAL_VERSION);
        assert_eq!(post.tags, vec!["intro".to_string()]);

        let mut edit = post.clone();
        edit.title = "v1".into();
        let updated = store.update(&edit).await.unwrap();
        assert_eq!(updated.version, 1);

        // same read version again
        assert!(matches!(store.update(&edit).await, Err(StoreError::Stale)));

        store.delete(post.id).await.unwrap();
        assert!(matches!(store.update(&updated).await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete(post.id).await, Err(StoreError::NotFound)));
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn post_by_missing_author_is_not_found(pool: PgPool) {
        let store = PgPostStore::new(pool, Duration::from_secs(5));
        let err = store.create(&new_post(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
