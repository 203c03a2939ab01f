//! Maps inbound messages to the lifecycle manager or the relay engine.

use crate::{
    base::types::{ChatKind, InboundMessage, JoinOutcome, LeaveOutcome, RelaySummary},
    interaction::{keywords::KeywordRegistry, lifecycle::LifecycleManager, relay::RelayEngine},
    prelude::*,
    service::{chat::ChatClient, db::DbClient, report::Reporter},
};

/// A recognised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Greet,
    Join,
    Leave,
}

impl Command {
    /// Parse a command from message text.
    ///
    /// The first word must start with `prefix`; the rest of the word is matched
    /// case-insensitively and any further words are ignored. Unknown words are not commands.
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?.strip_prefix(prefix)?;

        match word.to_lowercase().as_str() {
            "greet" | "hello" => Some(Command::Greet),
            "join" | "start" => Some(Command::Join),
            "leave" | "stop" => Some(Command::Leave),
            _ => None,
        }
    }
}

/// What the router did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Greeted,
    Joined(JoinOutcome),
    Left(LeaveOutcome),
    Relayed(RelaySummary),
    Ignored,
}

/// Dispatches inbound messages.
#[derive(Clone)]
pub struct MessageRouter {
    config: Config,
    chat: ChatClient,
    lifecycle: LifecycleManager,
    relay: RelayEngine,
}

impl MessageRouter {
    pub fn new(config: Config, db: DbClient, chat: ChatClient, reporter: Reporter) -> Self {
        let registry = KeywordRegistry::new(db.clone());
        let lifecycle = LifecycleManager::new(db.clone(), registry.clone(), reporter.clone());
        let relay = RelayEngine::new(db, registry, chat.clone(), reporter);

        Self { config, chat, lifecycle, relay }
    }

    /// Handle one inbound message to completion.
    ///
    /// Join and leave only act in private chats, free text only relays from group chats.
    /// The bot's own messages are ignored. A failed reply is returned as [`RelayError::ReplyDelivery`].
    #[instrument(skip_all, fields(chat = %message.chat_id, sender = %message.sender.identity))]
    pub async fn route(&self, message: &InboundMessage) -> Res<Routed> {
        if message.sender.identity == self.chat.bot_user_id() {
            return Ok(Routed::Ignored);
        }

        let private = message.chat_kind == ChatKind::Private;

        match Command::parse(&message.text, &self.config.command_prefix) {
            Some(Command::Greet) => {
                self.reply(message, &self.config.greet_reply).await?;
                Ok(Routed::Greeted)
            }
            Some(Command::Join) if private => {
                let outcome = self.lifecycle.join(&message.sender.identity, &message.sender.display_name).await?;

                let text = match outcome {
                    JoinOutcome::Joined { .. } => &self.config.joined_reply,
                    JoinOutcome::AlreadyJoined => &self.config.already_joined_reply,
                    JoinOutcome::NameTaken => &self.config.name_taken_reply,
                };
                self.reply(message, text).await?;

                Ok(Routed::Joined(outcome))
            }
            Some(Command::Leave) if private => {
                let outcome = self.lifecycle.leave(&message.sender.identity).await?;
                self.reply(message, &self.config.left_reply).await?;

                Ok(Routed::Left(outcome))
            }
            Some(Command::Join | Command::Leave) => Ok(Routed::Ignored),
            None if message.chat_kind.is_group() => Ok(Routed::Relayed(self.relay.relay(message, true).await)),
            None => Ok(Routed::Ignored),
        }
    }

    async fn reply(&self, message: &InboundMessage, text: &str) -> Void {
        self.chat.send_message(&message.chat_id, text).await.map_err(|e| {
            RelayError::ReplyDelivery {
                chat_id: message.chat_id.clone(),
                reason: format!("{e:#}"),
            }
            .into()
        })
    }
}
