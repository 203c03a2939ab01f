//! Common types shared between services and interactions.

use serde::{Deserialize, Serialize};

/// Error type used across the crate.
pub type Err = anyhow::Error;
/// Result alias over [`Err`].
pub type Res<T> = Result<T, Err>;
/// Result carrying no value.
pub type Void = Res<()>;

/// The kind of chat an inbound event was posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    /// A one-to-one conversation with the bot.
    Private,
    /// A shared channel or multi-party conversation.
    Group,
}

impl ChatKind {
    /// Whether this is a shared chat.
    pub fn is_group(self) -> bool {
        self == ChatKind::Group
    }
}

/// The account that sent an inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Opaque chat-account id (the Slack user id).
    pub identity: String,
    /// Human readable account name.
    pub display_name: String,
}

/// A message as delivered by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The chat the message was posted in.
    pub chat_id: String,
    /// The kind of that chat.
    pub chat_kind: ChatKind,
    /// Transport-specific message id (the Slack `ts`).
    pub message_id: String,
    /// Who posted it.
    pub sender: Sender,
    /// The raw message text.
    pub text: String,
}

/// Severity attached to a report sent to the reporting sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Routine event (e.g., a user joined).
    Info,
    /// Recoverable failure (e.g., one forward failed).
    Warning,
    /// Failure that lost work (e.g., a store query failed).
    Error,
}

/// Result of a join command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The user is now active and subscribed to every keyword.
    Joined {
        /// Whether a soft-deleted row was reactivated rather than created.
        restored: bool,
    },
    /// An active user already existed; nothing changed.
    AlreadyJoined,
    /// Another user holds the sender's display name; nothing changed.
    NameTaken,
}

/// Result of a leave command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The user is soft-deleted (or never existed).
    Left,
}

/// What a single relay pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Names of the keywords found in the message.
    pub matched: Vec<String>,
    /// Recipients that received a forward.
    pub forwarded: Vec<String>,
    /// Recipients whose forward failed.
    pub failed: Vec<String>,
}
