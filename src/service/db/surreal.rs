//! SurrealDB implementation of the subscription store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    error::RelayError,
    types::{Res, Void},
};

use super::{DbClient, GenericDbClient, Keyword, User};

// Queries.

const SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS users SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS identity ON users TYPE string;
DEFINE FIELD IF NOT EXISTS display_name ON users TYPE string;
DEFINE FIELD IF NOT EXISTS created_at ON users TYPE datetime;
DEFINE FIELD IF NOT EXISTS updated_at ON users TYPE datetime;
DEFINE FIELD IF NOT EXISTS deleted_at ON users TYPE option<datetime>;
DEFINE INDEX IF NOT EXISTS users_identity ON users FIELDS identity UNIQUE;
DEFINE INDEX IF NOT EXISTS users_display_name ON users FIELDS display_name UNIQUE;

DEFINE TABLE IF NOT EXISTS keywords SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS name ON keywords TYPE string;
DEFINE FIELD IF NOT EXISTS created_at ON keywords TYPE datetime;
DEFINE FIELD IF NOT EXISTS updated_at ON keywords TYPE datetime;
DEFINE INDEX IF NOT EXISTS keywords_name ON keywords FIELDS name UNIQUE;

DEFINE TABLE IF NOT EXISTS user_keywords SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS user_id ON user_keywords TYPE record<users>;
DEFINE FIELD IF NOT EXISTS keyword_id ON user_keywords TYPE record<keywords>;
DEFINE INDEX IF NOT EXISTS user_keywords_pair ON user_keywords FIELDS user_id, keyword_id UNIQUE;
"#;

const USER_FIELDS: &str = "record::id(id) AS key, identity, display_name, \
    <string>created_at AS created_at, <string>updated_at AS updated_at, \
    IF deleted_at = NONE { NONE } ELSE { <string>deleted_at } AS deleted_at";

const KEYWORD_FIELDS: &str = "record::id(id) AS key, name, <string>created_at AS created_at, <string>updated_at AS updated_at";

// Rows.

#[derive(Debug, Deserialize)]
struct UserRow {
    key: String,
    identity: String,
    display_name: String,
    created_at: String,
    updated_at: String,
    #[serde(default)]
    deleted_at: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Res<Self> {
        Ok(User {
            id: row.key,
            identity: row.identity,
            display_name: row.display_name,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            deleted_at: row.deleted_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct KeywordRow {
    key: String,
    name: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<KeywordRow> for Keyword {
    type Error = anyhow::Error;

    fn try_from(row: KeywordRow) -> Res<Self> {
        Ok(Keyword {
            id: row.key,
            name: row.name,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

fn parse_datetime(value: &str) -> Res<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| anyhow::anyhow!("Invalid datetime `{}` in store row: {}", value, e))?
        .with_timezone(&Utc))
}

/// Whether the store rejected a write because the unique `index` already holds the value.
fn violates_index(err: &surrealdb::Error, index: &str) -> bool {
    err.to_string().contains(&format!("index `{index}` already contains"))
}

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Connects to the database named by the configuration and applies the schema.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::connect(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates an isolated in-memory database with the schema applied.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::memory().await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// SurrealDB client implementation.
#[derive(Clone)]
pub struct SurrealDbClient {
    db: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connect using the configured endpoint, credentials, namespace, and database.
    #[instrument(name = "SurrealDbClient::connect", skip_all, fields(endpoint = %config.db_endpoint))]
    pub async fn connect(config: &Config) -> Res<Self> {
        let db = any::connect(config.db_endpoint.as_str()).await?;

        // Authenticate only when credentials are configured (embedded engines need none).

        if let (Some(username), Some(password)) = (&config.db_username, &config.db_password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await?;
        }

        db.use_ns(config.db_namespace.as_str()).use_db(config.db_database.as_str()).await?;

        let client = Self { db };
        client.migrate().await?;

        info!("Database initialized successfully.");

        Ok(client)
    }

    /// Create an in-memory instance; every call yields a separate datastore.
    pub async fn memory() -> Res<Self> {
        let db = any::connect("mem://").await?;
        db.use_ns("test").use_db("test").await?;

        let client = Self { db };
        client.migrate().await?;

        Ok(client)
    }

    async fn select_user(&self, identity: &str, active_only: bool) -> Res<Option<User>> {
        let filter = if active_only { " AND deleted_at = NONE" } else { "" };
        let query = format!("SELECT {USER_FIELDS} FROM users WHERE identity = $identity{filter} LIMIT 1");

        let mut response = self.db.query(query).bind(("identity", identity.to_string())).await?;
        let rows: Vec<UserRow> = response.take(0)?;

        rows.into_iter().next().map(User::try_from).transpose()
    }

    async fn select_keyword(&self, name: &str) -> Res<Option<Keyword>> {
        let query = format!("SELECT {KEYWORD_FIELDS} FROM keywords WHERE name = $name LIMIT 1");

        let mut response = self.db.query(query).bind(("name", name.to_string())).await?;
        let rows: Vec<KeywordRow> = response.take(0)?;

        rows.into_iter().next().map(Keyword::try_from).transpose()
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn migrate(&self) -> Void {
        self.db.query(SCHEMA).await?.check()?;
        debug!("Schema applied.");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_active_user(&self, identity: &str) -> Res<Option<User>> {
        self.select_user(identity, true).await
    }

    #[instrument(skip(self))]
    async fn find_any_user(&self, identity: &str) -> Res<Option<User>> {
        self.select_user(identity, false).await
    }

    #[instrument(skip(self))]
    async fn create_or_restore_user(&self, identity: &str, display_name: &str) -> Res<User> {
        match self.find_any_user(identity).await? {
            Some(user) if user.is_active() => Err(RelayError::Conflict(identity.to_string()).into()),
            Some(user) => {
                info!("Restoring soft-deleted user `{}`.", identity);

                self.db
                    .query("UPDATE type::thing('users', $id) SET deleted_at = NONE, updated_at = time::now()")
                    .bind(("id", user.id.clone()))
                    .await?
                    .check()?;

                self.find_any_user(identity).await?.ok_or_else(|| anyhow::anyhow!("User `{}` vanished during restore.", identity))
            }
            None => {
                info!("Creating user `{}`.", identity);

                let result = self
                    .db
                    .query("CREATE users SET identity = $identity, display_name = $display_name, created_at = time::now(), updated_at = time::now()")
                    .bind(("identity", identity.to_string()))
                    .bind(("display_name", display_name.to_string()))
                    .await
                    .and_then(|response| response.check());

                match result {
                    Ok(_) => {}
                    Err(e) if violates_index(&e, "users_identity") => return Err(RelayError::Conflict(identity.to_string()).into()),
                    Err(e) if violates_index(&e, "users_display_name") => {
                        return Err(RelayError::DisplayNameTaken(display_name.to_string()).into());
                    }
                    Err(e) => return Err(e.into()),
                }

                self.find_any_user(identity).await?.ok_or_else(|| anyhow::anyhow!("User `{}` missing after create.", identity))
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, identity: &str) -> Void {
        self.db
            .query("UPDATE users SET deleted_at = time::now(), updated_at = time::now() WHERE identity = $identity AND deleted_at = NONE")
            .bind(("identity", identity.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn insert_keyword_if_absent(&self, name: &str) -> Res<bool> {
        if self.select_keyword(name).await?.is_some() {
            return Ok(false);
        }

        let result = self
            .db
            .query("CREATE keywords SET name = $name, created_at = time::now(), updated_at = time::now()")
            .bind(("name", name.to_string()))
            .await
            .and_then(|response| response.check());

        match result {
            Ok(_) => Ok(true),
            // Another writer inserted the same name in between.
            Err(e) if violates_index(&e, "keywords_name") => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn list_keywords(&self) -> Res<Vec<Keyword>> {
        let mut response = self.db.query(format!("SELECT {KEYWORD_FIELDS} FROM keywords ORDER BY name ASC")).await?;
        let rows: Vec<KeywordRow> = response.take(0)?;

        rows.into_iter().map(Keyword::try_from).collect()
    }

    #[instrument(skip_all, fields(user = %user.identity, keywords = keywords.len()))]
    async fn replace_user_keywords(&self, user: &User, keywords: &[Keyword]) -> Void {
        let keyword_ids: Vec<String> = keywords.iter().map(|k| k.id.clone()).collect();

        self.db
            .query(
                r#"
BEGIN TRANSACTION;
LET $subscriber = type::thing('users', $user_id);
DELETE user_keywords WHERE user_id = $subscriber;
FOR $keyword_key IN $keyword_ids {
    CREATE user_keywords SET user_id = $subscriber, keyword_id = type::thing('keywords', $keyword_key);
};
COMMIT TRANSACTION;
"#,
            )
            .bind(("user_id", user.id.clone()))
            .bind(("keyword_ids", keyword_ids))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip_all, fields(keyword = %keyword.name))]
    async fn list_subscribers(&self, keyword: &Keyword) -> Res<Vec<User>> {
        let query = format!(
            "SELECT {USER_FIELDS} FROM users \
             WHERE deleted_at = NONE \
             AND id IN (SELECT VALUE user_id FROM user_keywords WHERE keyword_id = type::thing('keywords', $keyword_id)) \
             ORDER BY identity ASC"
        );

        let mut response = self.db.query(query).bind(("keyword_id", keyword.id.clone())).await?;
        let rows: Vec<UserRow> = response.take(0)?;

        rows.into_iter().map(User::try_from).collect()
    }
}

// Tests.
