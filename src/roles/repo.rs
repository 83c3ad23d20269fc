use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use super::repo_types::Role;
use crate::{db::timed, error::StoreError};

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Role, StoreError>;
}

#[derive(Clone)]
pub struct PgRoleStore {
    db: PgPool,
    timeout: Duration,
}

impl PgRoleStore {
    pub fn new(db: PgPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn get_by_name(&self, name: &str) -> Result<Role, StoreError> {
        timed(self.timeout, async {
            let role = sqlx::query_as::<_, Role>(
                "SELECT id, name, level, description FROM roles WHERE name = $1",
            )
            .bind(name)
            .fetch_one(&self.db)
            .await?;
            Ok(role)
        })
        .await
    }
}
