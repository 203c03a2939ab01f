//! Subscription store for the keyword relay.
//!
//! Holds users, keywords, and the many-to-many subscription edge between them. Users are never
//! removed: leaving sets a `deleted_at` marker, and a later join clears it on the same row.

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::base::types::{Res, Void};

pub mod surreal;

// Data types.

/// A user record in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Store-assigned row id; stable across soft-delete and restore.
    pub id: String,
    /// Opaque chat-account id.
    pub identity: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set while the user is soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the user is currently active (not soft-deleted).
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// The transport recipient for forwards to this user.
    pub fn recipient(&self) -> &str {
        &self.identity
    }
}

/// A keyword record in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Store-assigned row id.
    pub id: String,
    /// Case-sensitive token matched against message text.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Traits.

/// Generic database client trait that clients must implement.
///
/// This trait defines the storage operations behind the subscription lifecycle and the relay.
/// Implementing this trait allows different database backends to be used with the relay.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Defines tables, fields, and unique indexes. Safe to run on every startup.
    async fn migrate(&self) -> Void;

    /// Finds the user for `identity`, ignoring soft-deleted rows.
    async fn find_active_user(&self, identity: &str) -> Res<Option<User>>;

    /// Finds the user for `identity`, including soft-deleted rows.
    async fn find_any_user(&self, identity: &str) -> Res<Option<User>>;

    /// Creates the user, or clears the soft-delete marker on an existing row.
    ///
    /// Fails with [`RelayError::Conflict`](crate::base::error::RelayError::Conflict) if an active
    /// row already exists for `identity`.
    async fn create_or_restore_user(&self, identity: &str, display_name: &str) -> Res<User>;

    /// Soft-deletes the user. No error if the user is absent or already deleted.
    async fn delete_user(&self, identity: &str) -> Void;

    /// Creates the keyword unless one with the same name exists.
    ///
    /// Returns `true` if a row was created.
    async fn insert_keyword_if_absent(&self, name: &str) -> Res<bool>;

    /// Lists every keyword, ordered by name.
    async fn list_keywords(&self) -> Res<Vec<Keyword>>;

    /// Atomically sets the subscriptions of `user` to exactly `keywords`.
    async fn replace_user_keywords(&self, user: &User, keywords: &[Keyword]) -> Void;

    /// Lists the active users subscribed to `keyword`, ordered by identity.
    async fn list_subscribers(&self, keyword: &Keyword) -> Res<Vec<User>>;
}

// Structs.

/// Database client for the relay.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}
