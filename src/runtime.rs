//! Runtime services and shared state for the keyword relay.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::{
    base::types::InboundMessage,
    interaction::{dispatch::Dispatcher, keywords::KeywordRegistry, router::MessageRouter},
    prelude::*,
    service::{chat::ChatClient, db::DbClient, report::Reporter},
};

/// Runtime service context.
///
/// This struct holds the database client, chat client, reporter, and configuration,
/// plus the receiving side of the inbound event channel the chat client feeds.
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The database client instance.
    pub db: DbClient,
    /// The chat client instance.
    pub chat: ChatClient,
    /// The reporting sink.
    pub reporter: Reporter,
    events: mpsc::Receiver<InboundMessage>,
}

/// Wrap a startup failure; nothing after it can run.
fn startup_fatal(stage: &str, err: Err) -> Err {
    RelayError::StartupFatal(format!("{stage}: {err:#}")).into()
}

impl Runtime {
    /// Create a new runtime instance.
    ///
    /// Connects and migrates the store, seeds the keywords, then connects the chat client.
    /// Any failure here is a [`RelayError::StartupFatal`].
    #[instrument(skip_all)]
    pub async fn new(config: Config, reporter: Reporter) -> Res<Self> {
        // Initialize the database.
        let db = DbClient::surreal(&config).await.map_err(|e| startup_fatal("connecting to the database", e))?;

        // Seed the keywords.
        KeywordRegistry::new(db.clone())
            .ensure_seeded(&config.keywords)
            .await
            .map_err(|e| startup_fatal("seeding keywords", e))?;

        // Initialize the chat client.
        let (sender, events) = mpsc::channel(config.event_buffer);
        let chat = ChatClient::slack(&config, sender).await.map_err(|e| startup_fatal("connecting to slack", e))?;

        Ok(Self { config, db, chat, reporter, events })
    }

    /// Listen for events until the chat listener shuts down.
    pub async fn start(self) -> Void {
        let router = MessageRouter::new(self.config.clone(), self.db.clone(), self.chat.clone(), self.reporter.clone());
        let dispatcher = Dispatcher::new(router, self.reporter.clone(), self.config.dispatch_workers);

        listen(&self.chat, dispatcher, self.events, DRAIN_TIMEOUT).await
    }
}

/// How long queued events may take to finish once the listener has stopped.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the dispatcher for as long as the chat listener is up.
///
/// The listener owns the only event sender, so its return closes the channel and the dispatcher
/// finishes whatever is queued. Work still pending after `drain_timeout` is abandoned.
async fn listen(chat: &ChatClient, dispatcher: Dispatcher, events: mpsc::Receiver<InboundMessage>, drain_timeout: Duration) -> Void {
    let mut dispatch = tokio::spawn(dispatcher.run(events));

    let result = chat.start().await;

    info!("Listener stopped; draining queued events.");

    match tokio::time::timeout(drain_timeout, &mut dispatch).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Dispatcher failed: {}", e),
        Err(_) => {
            warn!("Dispatcher did not drain within {:?}; abandoning queued events.", drain_timeout);
            dispatch.abort();
        }
    }

    result
}
