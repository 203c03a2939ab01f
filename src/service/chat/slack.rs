//! Chat service integration for the keyword relay.
//!
//! This module provides the Slack implementation of `GenericChatClient`:
//! - Receiving channel and direct messages over socket mode
//! - Replying in the chat a command came from
//! - Forwarding tagged channel messages into subscribers' direct messages

use crate::base::{
    config::Config,
    replies,
    types::{ChatKind, InboundMessage, Res, Sender, Void},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use std::{
    ops::Deref,
    sync::{Arc, Mutex},
};

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client that pushes inbound messages into `events`.
    pub async fn slack(config: &Config, events: mpsc::Sender<InboundMessage>) -> Res<Self> {
        let client = SlackChatClient::new(config, events).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    bot_token: SlackApiToken,
    events: mpsc::Sender<InboundMessage>,
}

/// Slack client implementation.
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
    /// Handed to the listener on start; dropped with it so the event channel closes.
    pub events: Mutex<Option<mpsc::Sender<InboundMessage>>>,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, events: mpsc::Sender<InboundMessage>) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
            events: Mutex::new(Some(events)),
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        let events = self
            .events
            .lock()
            .map_err(|_| anyhow::anyhow!("Event sender lock poisoned"))?
            .take()
            .ok_or(anyhow::anyhow!("Slack listener already started"))?;

        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new().with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            bot_token: self.bot_token.clone(),
            events,
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events,
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Start WS connections calling Slack API to get WS url for the token,
        // and wait for Ctrl-C to shutdown.
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, chat_id: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(chat_id.to_string()), message).with_as_user(true).with_link_names(true);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self, message), fields(origin = %message.chat_id))]
    async fn forward_message(&self, recipient: &str, message: &InboundMessage) -> Void {
        let content = SlackMessageContent::new().with_text(forward_text(message));

        // Posting to a user id lands in the bot's direct message with that user.
        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(recipient.to_string()), content).with_as_user(true);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to forward message: {}", e))?;

        Ok(())
    }
}

// Helpers.

/// Classify a Slack conversation.
///
/// Direct messages have channel type `im` and ids starting with `D`.
fn chat_kind(channel_id: &str, channel_type: Option<&str>) -> ChatKind {
    match channel_type {
        Some("im") => ChatKind::Private,
        Some(_) => ChatKind::Group,
        None if channel_id.starts_with('D') => ChatKind::Private,
        None => ChatKind::Group,
    }
}

/// Body of a forwarded message: a header naming the origin, then the original text quoted.
fn forward_text(message: &InboundMessage) -> String {
    let quoted = message.text.lines().map(|line| format!("> {line}")).collect::<Vec<_>>().join("\n");
    format!("{}\n{}", replies::forward_header(&message.chat_id, &message.sender.identity), quoted)
}

/// Look up the account name of a user, falling back to the id.
async fn display_name(client: &SlackHyperClient, token: &SlackApiToken, user_id: &SlackUserId) -> String {
    let session = client.open_session(token);

    match session.users_info(&SlackApiUsersInfoRequest::new(user_id.clone())).await {
        Ok(response) => response.user.name.unwrap_or_else(|| user_id.0.clone()),
        Err(e) => {
            warn!("Failed to look up user `{}`: {}", user_id.0, e);
            user_id.0.clone()
        }
    }
}

// Socket mode listener callbacks for Slack.

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    let SlackEventCallbackBody::Message(event) = event_callback.event else {
        debug!("Received unhandled push event.");
        return Ok(());
    };

    // Edits, joins, and other subtypes carry no new text.
    if event.subtype.is_some() {
        debug!("Skipping message event with a subtype.");
        return Ok(());
    }

    // Skip bots, including our own forwards and replies.
    if event.sender.bot_id.is_some() {
        debug!("Skipping message event from a bot.");
        return Ok(());
    }

    let Some(user_id) = event.sender.user.clone() else {
        debug!("Skipping message event without a sender.");
        return Ok(());
    };

    let channel_id = event.origin.channel.as_ref().ok_or(anyhow::anyhow!("Failed to get channel ID"))?.0.to_owned();
    let chat_kind = chat_kind(&channel_id, event.origin.channel_type.as_ref().map(|t| t.0.as_str()));
    let text = event.content.as_ref().and_then(|c| c.text.clone()).unwrap_or_default();

    // Only commands from direct messages need the account name.
    let display_name = match chat_kind {
        ChatKind::Private => display_name(&client, &user_state.bot_token, &user_id).await,
        ChatKind::Group => user_id.0.clone(),
    };

    let message = InboundMessage {
        chat_id: channel_id,
        chat_kind,
        message_id: event.origin.ts.0.clone(),
        sender: Sender { identity: user_id.0, display_name },
        text,
    };

    user_state.events.send(message).await.map_err(|_| anyhow::anyhow!("Event channel closed"))?;

    Ok(())
}

// Tests.
