//! Keyword matching and fan-out.

use std::collections::HashSet;

use crate::{
    base::types::{InboundMessage, RelaySummary},
    interaction::keywords::KeywordRegistry,
    prelude::*,
    service::{chat::ChatClient, db::DbClient, report::Reporter},
};

/// Forwards group messages to the subscribers of every keyword they contain.
#[derive(Clone)]
pub struct RelayEngine {
    db: DbClient,
    registry: KeywordRegistry,
    chat: ChatClient,
    reporter: Reporter,
}

impl RelayEngine {
    pub fn new(db: DbClient, registry: KeywordRegistry, chat: ChatClient, reporter: Reporter) -> Self {
        Self { db, registry, chat, reporter }
    }

    /// Relay `message` to the subscribers of each keyword it contains.
    ///
    /// Matching is plain case-sensitive substring containment. Each recipient gets at most one
    /// forward per message; a subscribed sender is a recipient like any other. Store and delivery
    /// failures are reported and never abort the pass.
    #[instrument(skip_all, fields(chat = %message.chat_id, message = %message.message_id))]
    pub async fn relay(&self, message: &InboundMessage, origin_is_group: bool) -> RelaySummary {
        let mut summary = RelaySummary::default();

        if !origin_is_group {
            return summary;
        }

        let keywords = match self.registry.all().await {
            Ok(keywords) => keywords,
            Err(e) => {
                let err = RelayError::StoreQuery(format!("listing keywords: {e:#}"));
                error!("{}", err);
                self.reporter.error(&err.to_string());
                return summary;
            }
        };

        let mut delivered = HashSet::new();

        for keyword in keywords.iter().filter(|k| !k.name.is_empty() && message.text.contains(k.name.as_str())) {
            summary.matched.push(keyword.name.clone());

            let subscribers = match self.db.list_subscribers(keyword).await {
                Ok(subscribers) => subscribers,
                Err(e) => {
                    let err = RelayError::StoreQuery(format!("listing subscribers of `{}`: {e:#}", keyword.name));
                    error!("{}", err);
                    self.reporter.error(&err.to_string());
                    continue;
                }
            };

            for subscriber in subscribers {
                if !delivered.insert(subscriber.identity.clone()) {
                    continue;
                }

                match self.chat.forward_message(subscriber.recipient(), message).await {
                    Ok(()) => summary.forwarded.push(subscriber.identity),
                    Err(e) => {
                        let err = RelayError::ForwardDelivery {
                            recipient: subscriber.identity.clone(),
                            reason: format!("{e:#}"),
                        };
                        warn!("{}", err);
                        self.reporter.warning(&err.to_string());
                        summary.failed.push(subscriber.identity);
                    }
                }
            }
        }

        debug!("Relay matched {:?}, forwarded {}, failed {}.", summary.matched, summary.forwarded.len(), summary.failed.len());

        summary
    }
}
