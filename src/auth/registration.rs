//! Registration as a two-step saga.
//!
//! Forward: persist the inactive user with its invitation, then mail the
//! activation link. If the mail step fails, committed steps are undone in
//! reverse order, so a registration either ends fully notified or leaves
//! nothing behind.

use thiserror::Error;
use time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::password::{hash_password, PasswordError};
use crate::{
    error::StoreError,
    mailer::{MailError, Mailer},
    users::{
        invitations::InvitationToken,
        repo::UserStore,
        repo_types::{NewUser, User},
    },
};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("could not hash password: {0}")]
    Hashing(#[from] PasswordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("welcome email failed, registration rolled back: {0}")]
    Mail(MailError),

    /// Mail failed and the rollback failed too. The user row is orphaned.
    #[error("welcome email failed ({mail}) and rollback of user {user_id} failed: {compensation}")]
    CompensationFailed {
        user_id: Uuid,
        mail: MailError,
        compensation: StoreError,
    },
}

/// Successful outcome. The plaintext token is only ever held here.
#[derive(Debug)]
pub struct Registered {
    pub user: User,
    pub token: InvitationToken,
}

/// A forward step that has committed and can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Committed {
    UserInvited { user_id: Uuid },
}

pub fn activation_url(frontend_url: &str, token: &str) -> String {
    format!("{}/confirm/{}", frontend_url.trim_end_matches('/'), token)
}

pub struct RegistrationSaga<'a> {
    users: &'a dyn UserStore,
    mailer: &'a dyn Mailer,
    invitation_ttl: Duration,
    frontend_url: &'a str,
    committed: Vec<Committed>,
}

impl<'a> RegistrationSaga<'a> {
    pub fn new(
        users: &'a dyn UserStore,
        mailer: &'a dyn Mailer,
        invitation_ttl: Duration,
        frontend_url: &'a str,
    ) -> Self {
        Self {
            users,
            mailer,
            invitation_ttl,
            frontend_url,
            committed: Vec::new(),
        }
    }

    pub async fn run(
        mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Registered, RegistrationError> {
        let new_user = NewUser {
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash: hash_password(password)?,
        };
        let token = InvitationToken::generate();

        // Nothing is committed if this fails.
        let user = self
            .users
            .create_and_invite(&new_user, &token, self.invitation_ttl)
            .await?;
        self.committed.push(Committed::UserInvited { user_id: user.id });

        let url = activation_url(self.frontend_url, token.as_str());
        if let Err(mail_err) = self
            .mailer
            .send_welcome(&user.username, &user.email, &url)
            .await
        {
            warn!(user_id = %user.id, error = %mail_err, "welcome email failed, compensating");
            return Err(self.compensate(mail_err).await);
        }

        info!(user_id = %user.id, "user registered and invited");
        Ok(Registered { user, token })
    }

    async fn compensate(&mut self, cause: MailError) -> RegistrationError {
        while let Some(step) = self.committed.pop() {
            match step {
                Committed::UserInvited { user_id } => {
                    if let Err(e) = self.users.delete(user_id).await {
                        error!(
                            %user_id,
                            mail_error = %cause,
                            error = %e,
                            "registration rollback failed, user left without invitation mail"
                        );
                        return RegistrationError::CompensationFailed {
                            user_id,
                            mail: cause,
                            compensation: e,
                        };
                    }
                    info!(%user_id, "registration rolled back");
                }
            }
        }
        RegistrationError::Mail(cause)
    }
}
