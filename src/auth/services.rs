use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::{
    jwt::JwtKeys,
    password::{hash_password, verify_password, PasswordError},
};
use crate::{
    error::{AppError, StoreError},
    users::repo::UserStore,
};

pub const USERNAME_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 3;
pub const PASSWORD_MAX: usize = 72;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

lazy_static! {
    /// Verified against when the email is unknown, so that path costs the
    /// same Argon2 work as a wrong password.
    static ref DUMMY_HASH: Option<String> = hash_password("murmur-dummy-password").ok();
}

fn burn_password_check(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_username(username: &str) -> Result<(), AppError> {
    let len = username.chars().count();
    if len == 0 || len > USERNAME_MAX {
        return Err(AppError::validation(format!(
            "username must be 1 to {USERNAME_MAX} characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), AppError> {
    if !is_valid_email(email) {
        return Err(AppError::validation("invalid email"));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        return Err(AppError::validation(format!(
            "password must be {PASSWORD_MIN} to {PASSWORD_MAX} characters"
        )));
    }
    Ok(())
}

/// Exchanges credentials for a bearer token.
///
/// Unknown email, wrong password and a not yet activated account all come
/// back as the same `Unauthorized`.
pub async fn issue_token(
    users: &dyn UserStore,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> Result<String, AppError> {
    let creds = match users.get_by_email(email).await {
        Ok(c) => c,
        Err(StoreError::NotFound) => {
            burn_password_check(password);
            debug!("token request for unknown email");
            return Err(AppError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    };

    match verify_password(password, &creds.password_hash) {
        Ok(()) => {}
        Err(PasswordError::Mismatch) => {
            warn!(user_id = %creds.user.id, "token request with wrong password");
            return Err(AppError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    }

    if !creds.user.is_active {
        warn!(user_id = %creds.user.id, "token request for inactive account");
        return Err(AppError::Unauthorized);
    }

    Ok(keys.sign(creds.user.id)?)
}
