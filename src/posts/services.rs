use tracing::{info, warn};
use uuid::Uuid;

use super::{
    repo::PostStore,
    repo_types::{Post, PostPatch},
};
use crate::{
    error::{AppError, StoreError},
    roles::{
        repo::RoleStore,
        repo_types::{ROLE_ADMIN, ROLE_MODERATOR},
    },
    users::repo_types::User,
};

/// Applies `patch` on top of a previously loaded `post` and writes it back
/// guarded by the version that was read. No locks are taken; a concurrent
/// writer that got there first turns this call into `Stale`.
///
/// A post whose version counter is exhausted can no longer be written and
/// fails with `Conflict`.
pub async fn apply_update(
    store: &dyn PostStore,
    mut post: Post,
    patch: PostPatch,
) -> Result<Post, StoreError> {
    let read_version = post.version;
    if read_version.checked_add(1).is_none() {
        warn!(post_id = %post.id, read_version, "post version counter exhausted");
        return Err(StoreError::Conflict);
    }
    patch.apply(&mut post);

    match store.update(&post).await {
        Ok(updated) => {
            info!(post_id = %updated.id, version = updated.version, "post updated");
            Ok(updated)
        }
        Err(StoreError::Stale) => {
            warn!(post_id = %post.id, read_version, "post update lost a version race");
            Err(StoreError::Stale)
        }
        Err(e) => Err(e),
    }
}

/// Authors may always touch their own posts. Anyone else needs a role at
/// least as high as `required`.
async fn check_post_ownership(
    roles: &dyn RoleStore,
    required: &str,
    post: &Post,
    editor: &User,
) -> Result<(), AppError> {
    if post.user_id == editor.id {
        return Ok(());
    }
    let role = roles.get_by_name(required).await?;
    if editor.role_level < role.level {
        warn!(post_id = %post.id, user_id = %editor.id, required, "post access denied");
        return Err(AppError::Forbidden);
    }
    info!(
        post_id = %post.id,
        user_id = %editor.id,
        role = required,
        "acting on post of another user"
    );
    Ok(())
}

/// Loads the post, checks that `editor` owns it or is a moderator, then
/// applies the patch.
///
/// `expected_version` lets a client pin the version it last saw; a mismatch
/// fails fast with `Stale` before any write.
pub async fn update_post(
    posts: &dyn PostStore,
    roles: &dyn RoleStore,
    id: Uuid,
    editor: &User,
    expected_version: Option<i32>,
    patch: PostPatch,
) -> Result<Post, AppError> {
    let post = posts.get_by_id(id).await?;
    check_post_ownership(roles, ROLE_MODERATOR, &post, editor).await?;
    if expected_version.is_some_and(|v| v != post.version) {
        return Err(AppError::Stale);
    }
    match apply_update(posts, post, patch).await {
        Ok(updated) => Ok(updated),
        Err(StoreError::Conflict) => Err(AppError::Conflict("post can no longer be edited".into())),
        Err(e) => Err(e.into()),
    }
}

/// Deletes the post if `editor` owns it or is an admin.
pub async fn delete_post(
    posts: &dyn PostStore,
    roles: &dyn RoleStore,
    id: Uuid,
    editor: &User,
) -> Result<(), AppError> {
    let post = posts.get_by_id(id).await?;
    check_post_ownership(roles, ROLE_ADMIN, &post, editor).await?;
    posts.delete(id).await?;
    info!(post_id = %id, user_id = %editor.id, "post deleted");
    Ok(())
}
