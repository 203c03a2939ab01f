//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use crate::base::replies;

use super::types::Res;

/// Default database endpoint.
fn default_db_endpoint() -> String {
    "ws://127.0.0.1:8000".to_string()
}

/// Default database namespace.
fn default_db_namespace() -> String {
    "keyword_relay".to_string()
}

/// Default database name.
fn default_db_database() -> String {
    "relay".to_string()
}

/// Default set of keywords seeded at startup.
fn default_keywords() -> Vec<String> {
    replies::DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// Default prefix that marks a message as a command.
fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_dispatch_workers() -> usize {
    1
}

fn default_event_buffer() -> usize {
    256
}

fn default_greet_reply() -> String {
    replies::GREET_REPLY.to_string()
}

fn default_joined_reply() -> String {
    replies::JOINED_REPLY.to_string()
}

fn default_already_joined_reply() -> String {
    replies::ALREADY_JOINED_REPLY.to_string()
}

fn default_name_taken_reply() -> String {
    replies::NAME_TAKEN_REPLY.to_string()
}

fn default_left_reply() -> String {
    replies::LEFT_REPLY.to_string()
}

/// Configuration for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Shared configuration values.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Inner configuration values.
#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Slack app token (`SLACK_APP_TOKEN`).
    #[serde(default)]
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    #[serde(default)]
    pub slack_bot_token: String,
    /// Database endpoint URL (`DB_ENDPOINT`), e.g. `ws://localhost:8000` or `mem://`.
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Keywords seeded at startup (`KEYWORDS`, comma-separated).
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Prefix marking a command message (`COMMAND_PREFIX`).
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Number of workers handling inbound events (`DISPATCH_WORKERS`).
    /// A value of 1 handles events strictly one at a time.
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,
    /// Capacity of the inbound event channel (`EVENT_BUFFER`).
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Reply to the greet command (`GREET_REPLY`).
    #[serde(default = "default_greet_reply")]
    pub greet_reply: String,
    /// Reply after a successful join (`JOINED_REPLY`).
    #[serde(default = "default_joined_reply")]
    pub joined_reply: String,
    /// Reply when the user had already joined (`ALREADY_JOINED_REPLY`).
    #[serde(default = "default_already_joined_reply")]
    pub already_joined_reply: String,
    /// Reply when the display name is held by another user (`NAME_TAKEN_REPLY`).
    #[serde(default = "default_name_taken_reply")]
    pub name_taken_reply: String,
    /// Reply after leaving (`LEFT_REPLY`).
    #[serde(default = "default_left_reply")]
    pub left_reply: String,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            slack_app_token: String::new(),
            slack_bot_token: String::new(),
            db_endpoint: default_db_endpoint(),
            db_username: None,
            db_password: None,
            db_namespace: default_db_namespace(),
            db_database: default_db_database(),
            keywords: default_keywords(),
            command_prefix: default_command_prefix(),
            dispatch_workers: default_dispatch_workers(),
            event_buffer: default_event_buffer(),
            greet_reply: default_greet_reply(),
            joined_reply: default_joined_reply(),
            already_joined_reply: default_already_joined_reply(),
            name_taken_reply: default_name_taken_reply(),
            left_reply: default_left_reply(),
        }
    }
}

impl Config {
    /// Load from `KEYWORD_RELAY_*` environment variables and an optional TOML file.
    ///
    /// The file is `explicit_path` if given, else `.hidden/config.toml` when it exists.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let env = config::Environment::default()
            .prefix("KEYWORD_RELAY")
            .prefix_separator("_")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("keywords");

        let mut cfg = config::Config::builder().add_source(env);

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the values that `serde` cannot.
    pub fn validate(&self) -> Res<()> {
        if self.command_prefix.trim().is_empty() {
            return Err(anyhow::anyhow!("Command prefix must not be empty."));
        }

        if self.dispatch_workers < 1 || self.dispatch_workers > 64 {
            return Err(anyhow::anyhow!("Dispatch workers must be between 1 and 64."));
        }

        if self.event_buffer < 1 {
            return Err(anyhow::anyhow!("Event buffer must be at least 1."));
        }

        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(anyhow::anyhow!("At least one keyword must be configured."));
        }

        Ok(())
    }
}
