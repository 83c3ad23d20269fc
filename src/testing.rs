//! In-memory stand-ins for Postgres and SMTP, used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    auth::password::hash_password,
    error::StoreError,
    followers::repo::FollowerStore,
    mailer::{MailError, Mailer},
    posts::{
        repo::PostStore,
        repo_types::{NewPost, Post, INITIAL_VERSION},
    },
    roles::{
        repo::RoleStore,
        repo_types::{Role, ROLE_ADMIN, ROLE_MODERATOR, ROLE_USER},
    },
    users::{
        invitations::{digest_token, InvitationToken},
        repo::UserStore,
        repo_types::{NewUser, User, UserChanges, UserCredentials},
    },
};

/// Same rows as the roles migration seeds.
fn seeded_roles() -> Vec<Role> {
    [(1, ROLE_USER), (2, ROLE_MODERATOR), (3, ROLE_ADMIN)]
        .into_iter()
        .map(|(level, name)| Role {
            id: level,
            name: name.into(),
            level,
            description: String::new(),
        })
        .collect()
}

fn role_level(name: &str) -> Option<i32> {
    seeded_roles()
        .into_iter()
        .find(|r| r.name == name)
        .map(|r| r.level)
}

struct Invitation {
    token_hash: String,
    user_id: Uuid,
    expiry: OffsetDateTime,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserCredentials>,
    invitations: Vec<Invitation>,
    posts: HashMap<Uuid, Post>,
    followers: HashSet<(Uuid, Uuid)>,
    created: Vec<Uuid>,
}

/// Mirrors the transactional guarantees of the Postgres stores: each
/// operation takes the lock once and either applies fully or not at all.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    fail_deletes: AtomicBool,
    fail_invitation_inserts: AtomicBool,
}

impl InMemoryStore {
    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("store lock poisoned")
    }

    pub fn seed_user(&self, username: &str, email: &str, password: &str, active: bool) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            created_at: OffsetDateTime::now_utc(),
            is_active: active,
            role_level: role_level(ROLE_USER).expect("user role"),
        };
        let creds = UserCredentials {
            user: user.clone(),
            password_hash: hash_password(password).expect("hash"),
        };
        self.tables().users.insert(user.id, creds);
        user
    }

    /// Moves a user to another seeded role.
    pub fn assign_role(&self, id: Uuid, role: &str) {
        let level = role_level(role).expect("seeded role");
        if let Some(creds) = self.tables().users.get_mut(&id) {
            creds.user.role_level = level;
        }
    }

    /// Drops the row behind the store's back, bypassing the workflow.
    pub fn remove_user_row(&self, id: Uuid) {
        self.tables().users.remove(&id);
    }

    pub fn created_user_ids(&self) -> Vec<Uuid> {
        self.tables().created.clone()
    }

    pub fn user_count(&self) -> usize {
        self.tables().users.len()
    }

    pub fn total_invitations(&self) -> usize {
        self.tables().invitations.len()
    }

    pub fn invitation_count(&self, user_id: Uuid) -> usize {
        self.tables()
            .invitations
            .iter()
            .filter(|i| i.user_id == user_id)
            .count()
    }

    pub fn has_invitation_plaintext(&self, plaintext: &str) -> bool {
        self.tables()
            .invitations
            .iter()
            .any(|i| i.token_hash == plaintext)
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    pub fn fail_invitation_inserts(&self, on: bool) {
        self.fail_invitation_inserts.store(on, Ordering::SeqCst);
    }

    fn injected_failure() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_and_invite(
        &self,
        new_user: &NewUser,
        token: &InvitationToken,
        ttl: Duration,
    ) -> Result<User, StoreError> {
        let mut t = self.tables();
        let taken = t.users.values().any(|c| {
            c.user.email == new_user.email || c.user.username == new_user.username
        });
        if taken {
            return Err(StoreError::Conflict);
        }
        if self.fail_invitation_inserts.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            created_at: now,
            is_active: false,
            role_level: role_level(ROLE_USER).expect("user role"),
        };
        t.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash: new_user.password_hash.clone(),
            },
        );
        t.invitations.push(Invitation {
            token_hash: token.digest(),
            user_id: user.id,
            expiry: now + ttl,
        });
        t.created.push(user.id);
        Ok(user)
    }

    async fn activate(&self, plaintext_token: &str) -> Result<Uuid, StoreError> {
        let mut t = self.tables();
        let hash = digest_token(plaintext_token);
        let now = OffsetDateTime::now_utc();
        let user_id = t
            .invitations
            .iter()
            .find(|i| i.token_hash == hash && i.expiry > now)
            .map(|i| i.user_id)
            .ok_or(StoreError::NotFound)?;
        let creds = t.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        creds.user.is_active = true;
        t.invitations.retain(|i| i.user_id != user_id);
        Ok(user_id)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        let mut t = self.tables();
        if !t.users.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        t.invitations.retain(|i| i.user_id != id);
        t.users.remove(&id);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        self.tables()
            .users
            .get(&id)
            .map(|c| c.user.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<UserCredentials, StoreError> {
        self.tables()
            .users
            .values()
            .find(|c| c.user.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> Result<User, StoreError> {
        let mut t = self.tables();
        let clash = t.users.values().any(|c| {
            c.user.id != id
                && (changes.email.as_deref() == Some(c.user.email.as_str())
                    || changes.username.as_deref() == Some(c.user.username.as_str()))
        });
        if clash {
            return Err(StoreError::Conflict);
        }
        let creds = t.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(username) = &changes.username {
            creds.user.username = username.clone();
        }
        if let Some(email) = &changes.email {
            creds.user.email = email.clone();
        }
        if let Some(hash) = &changes.password_hash {
            creds.password_hash = hash.clone();
        }
        Ok(creds.user.clone())
    }
}

#[async_trait]
impl PostStore for InMemoryStore {
    async fn create(&self, new_post: &NewPost) -> Result<Post, StoreError> {
        let mut t = self.tables();
        // posts.user_id references users(id)
        if !t.users.contains_key(&new_post.user_id) {
            return Err(StoreError::NotFound);
        }
        let now = OffsetDateTime::now_utc();
        let post = Post {
            id: Uuid::new_v4(),
            user_id: new_post.user_id,
            title: new_post.title.clone(),
            content: new_post.content.clone(),
            tags: new_post.tags.clone(),
            created_at: now,
            updated_at: now,
            version: INITIAL_VERSION,
        };
        t.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Post, StoreError> {
        self.tables()
            .posts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, post: &Post) -> Result<Post, StoreError> {
        let mut t = self.tables();
        let stored = t.posts.get_mut(&post.id).ok_or(StoreError::NotFound)?;
        if stored.version != post.version {
            return Err(StoreError::Stale);
        }
        stored.title = post.title.clone();
        stored.content = post.content.clone();
        stored.version = post.version.checked_add(1).ok_or(StoreError::Conflict)?;
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables()
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl FollowerStore for InMemoryStore {
    async fn follow(&self, follower_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let mut t = self.tables();
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        if !t.followers.insert((follower_id, user_id)) {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn unfollow(&self, follower_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        if self.tables().followers.remove(&(follower_id, user_id)) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn get_by_name(&self, name: &str) -> Result<Role, StoreError> {
        seeded_roles()
            .into_iter()
            .find(|r| r.name == name)
            .ok_or(StoreError::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub username: String,
    pub email: String,
    pub activation_url: String,
}

/// Records deliveries; can be told to fail every send.
#[derive(Default)]
pub struct FakeMailer {
    fail: bool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<SentMail>>,
}

impl FakeMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send_welcome(
        &self,
        username: &str,
        email: &str,
        activation_url: &str,
    ) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MailError::Delivery("simulated outage".into()));
        }
        self.sent.lock().expect("mailer lock poisoned").push(SentMail {
            username: username.into(),
            email: email.into(),
            activation_url: activation_url.into(),
        });
        Ok(())
    }
}
