use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::invitations::{self, InvitationToken};
use super::repo_types::{NewUser, User, UserChanges, UserCredentials};
use crate::{db::timed, error::StoreError};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Registration: user and invitation commit together or not at all.
    async fn create_and_invite(
        &self,
        new_user: &NewUser,
        token: &InvitationToken,
        ttl: time::Duration,
    ) -> Result<User, StoreError>;

    /// Returns the id of the user that was activated.
    async fn activate(&self, plaintext_token: &str) -> Result<Uuid, StoreError>;

    /// Deletes the user and its invitations in one transaction.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<UserCredentials, StoreError>;

    async fn update(&self, id: Uuid, changes: &UserChanges) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(db: PgPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_and_invite(
        &self,
        new_user: &NewUser,
        token: &InvitationToken,
        ttl: time::Duration,
    ) -> Result<User, StoreError> {
        timed(
            self.timeout,
            invitations::create_and_invite(&self.db, new_user, token, ttl),
        )
        .await
    }

    async fn activate(&self, plaintext_token: &str) -> Result<Uuid, StoreError> {
        timed(self.timeout, invitations::activate(&self.db, plaintext_token)).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        timed(self.timeout, invitations::delete_user(&self.db, id)).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        timed(self.timeout, async {
            let user = sqlx::query_as::<_, User>(
                r#"
                SELECT u.id, u.username, u.email, u.created_at, u.is_active,
                       r.level AS role_level
                  FROM users AS u
                  JOIN roles AS r ON r.id = u.role_id
                 WHERE u.id = $1
                "#,
            )
            .bind(id)
            .fetch_one(&self.db)
            .await?;
            Ok(user)
        })
        .await
    }

    async fn get_by_email(&self, email: &str) -> Result<UserCredentials, StoreError> {
        timed(self.timeout, async {
            let creds = sqlx::query_as::<_, UserCredentials>(
                r#"
                SELECT u.id, u.username, u.email, u.created_at, u.is_active,
                       r.level AS role_level, u.password_hash
                  FROM users AS u
                  JOIN roles AS r ON r.id = u.role_id
                 WHERE u.email = $1
                "#,
            )
            .bind(email)
            .fetch_one(&self.db)
            .await?;
            Ok(creds)
        })
        .await
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> Result<User, StoreError> {
        timed(self.timeout, async {
            let user = sqlx::query_as::<_, User>(
                r#"
                WITH updated AS (
                    UPDATE users
                       SET username      = COALESCE($1, username),
                           email         = COALESCE($2, email),
                           password_hash = COALESCE($3, password_hash)
                     WHERE id = $4
                    RETURNING id, username, email, created_at, is_active, role_id
                )
                SELECT u.id, u.username, u.email, u.created_at, u.is_active,
                       r.level AS role_level
                  FROM updated AS u
                  JOIN roles AS r ON r.id = u.role_id
                "#,
            )
            .bind(changes.username.as_deref())
            .bind(changes.email.as_deref())
            .bind(changes.password_hash.as_deref())
            .bind(id)
            .fetch_one(&self.db)
            .await?;
            Ok(user)
        })
        .await
    }
}
