use tracing::debug;
use uuid::Uuid;

use super::{
    cache::UserCache,
    repo::UserStore,
    repo_types::{User, UserChanges},
};
use crate::error::StoreError;

/// Cache-aside read: cache first, then the store, then populate.
pub async fn get_user(
    store: &dyn UserStore,
    cache: &dyn UserCache,
    id: Uuid,
) -> Result<User, StoreError> {
    if let Some(user) = cache.get(id).await {
        return Ok(user);
    }
    debug!(user_id = %id, "user cache miss");
    let user = store.get_by_id(id).await?;
    cache.set(&user).await;
    Ok(user)
}

pub async fn update_user(
    store: &dyn UserStore,
    cache: &dyn UserCache,
    id: Uuid,
    changes: &UserChanges,
) -> Result<User, StoreError> {
    let user = store.update(id, changes).await?;
    cache.invalidate(id).await;
    Ok(user)
}

pub async fn activate_user(
    store: &dyn UserStore,
    cache: &dyn UserCache,
    plaintext_token: &str,
) -> Result<Uuid, StoreError> {
    let id = store.activate(plaintext_token).await?;
    cache.invalidate(id).await;
    Ok(id)
}

pub async fn delete_user(
    store: &dyn UserStore,
    cache: &dyn UserCache,
    id: Uuid,
) -> Result<(), StoreError> {
    store.delete(id).await?;
    cache.invalidate(id).await;
    Ok(())
}
