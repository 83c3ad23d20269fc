use serde::Serialize;
use sqlx::FromRow;

/// Role every registered account starts with.
pub const ROLE_USER: &str = "user";
/// May edit posts of other users.
pub const ROLE_MODERATOR: &str = "moderator";
/// May also delete posts of other users.
pub const ROLE_ADMIN: &str = "admin";

/// A named privilege tier. Higher `level` includes every lower one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub level: i32,
    pub description: String,
}
