//! Registration → invitation → activation, each step a single transaction.
//!
//! Only the SHA-256 digest of an invitation token is ever written. The
//! plaintext goes to the caller once, to be mailed, and is then forgotten.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use super::repo_types::{NewUser, User};
use crate::roles::repo_types::ROLE_USER;
use crate::error::StoreError;

/// A freshly generated, unguessable invitation token.
#[derive(Clone)]
pub struct InvitationToken {
    plaintext: String,
}

impl InvitationToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self {
            plaintext: hex::encode(bytes),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.plaintext
    }

    pub fn digest(&self) -> String {
        digest_token(&self.plaintext)
    }

    pub fn into_plaintext(self) -> String {
        self.plaintext
    }
}

impl std::fmt::Debug for InvitationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InvitationToken(..)")
    }
}

/// One-way digest under which invitation tokens are stored and looked up.
pub fn digest_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

// ---- Transaction steps ----

async fn insert_user_tx(
    tx: &mut Transaction<'_, Postgres>,
    new_user: &NewUser,
) -> Result<User, StoreError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        WITH inserted AS (
            INSERT INTO users (username, email, password_hash, is_active, role_id)
            VALUES ($1, $2, $3, FALSE, (SELECT id FROM roles WHERE name = $4))
            RETURNING id, username, email, created_at, is_active, role_id
        )
        SELECT i.id, i.username, i.email, i.created_at, i.is_active, r.level AS role_level
          FROM inserted AS i
          JOIN roles AS r ON r.id = i.role_id
        "#,
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(&new_user.password_hash)
    .bind(ROLE_USER)
    .fetch_one(&mut **tx)
    .await?;
    Ok(user)
}

async fn insert_invitation_tx(
    tx: &mut Transaction<'_, Postgres>,
    token_hash: &str,
    user_id: Uuid,
    expiry: OffsetDateTime,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO user_invitations (token_hash, user_id, expiry)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(expiry)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Locks the matching invitation so a concurrent activation with the same
/// token finds nothing once this one commits.
async fn find_invited_user_tx(
    tx: &mut Transaction<'_, Postgres>,
    token_hash: &str,
) -> Result<Uuid, StoreError> {
    let user_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT u.id
          FROM users AS u
          JOIN user_invitations AS ui ON ui.user_id = u.id
         WHERE ui.token_hash = $1 AND ui.expiry > $2
         LIMIT 1
           FOR UPDATE OF ui
        "#,
    )
    .bind(token_hash)
    .bind(OffsetDateTime::now_utc())
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(StoreError::NotFound)?;
    Ok(user_id)
}

async fn mark_active_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<(), StoreError> {
    let res = sqlx::query("UPDATE users SET is_active = TRUE WHERE id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

async fn delete_invitations_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<u64, StoreError> {
    let res = sqlx::query("DELETE FROM user_invitations WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected())
}

async fn delete_user_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<(), StoreError> {
    let res = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

// ---- Workflow ----

/// Inserts an inactive user and its invitation, or nothing at all.
pub async fn create_and_invite(
    db: &PgPool,
    new_user: &NewUser,
    token: &InvitationToken,
    ttl: Duration,
) -> Result<User, StoreError> {
    let mut tx = db.begin().await?;
    let user = insert_user_tx(&mut tx, new_user).await?;
    insert_invitation_tx(
        &mut tx,
        &token.digest(),
        user.id,
        OffsetDateTime::now_utc() + ttl,
    )
    .await?;
    tx.commit().await?;

    info!(user_id = %user.id, "user created with pending invitation");
    Ok(user)
}

/// Flips the invited user to active and burns every invitation it had.
///
/// Unknown, used and expired tokens all come back as `NotFound`.
pub async fn activate(db: &PgPool, plaintext_token: &str) -> Result<Uuid, StoreError> {
    let mut tx = db.begin().await?;
    let user_id = find_invited_user_tx(&mut tx, &digest_token(plaintext_token)).await?;
    mark_active_tx(&mut tx, user_id).await?;
    let removed = delete_invitations_tx(&mut tx, user_id).await?;
    tx.commit().await?;

    info!(user_id = %user_id, invitations_removed = removed, "user activated");
    Ok(user_id)
}

/// Removes the user's invitations, then the user.
pub async fn delete_user(db: &PgPool, user_id: Uuid) -> Result<(), StoreError> {
    let mut tx = db.begin().await?;
    let removed = delete_invitations_tx(&mut tx, user_id).await?;
    delete_user_tx(&mut tx, user_id).await?;
    tx.commit().await?;

    debug!(user_id = %user_id, invitations_removed = removed, "user deleted");
    Ok(())
}
