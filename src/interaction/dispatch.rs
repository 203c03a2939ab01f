//! Consumes inbound messages from the event channel and routes them.
//!
//! With one worker, messages are handled strictly in arrival order, each to completion before
//! the next. With more, workers share the receiver and handlers run concurrently; the store is
//! the only shared mutable state.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tracing::Instrument;

use crate::{
    base::types::InboundMessage,
    interaction::router::MessageRouter,
    prelude::*,
    service::report::Reporter,
};

/// Worker pool in front of the router.
pub struct Dispatcher {
    router: MessageRouter,
    reporter: Reporter,
    workers: usize,
}

impl Dispatcher {
    pub fn new(router: MessageRouter, reporter: Reporter, workers: usize) -> Self {
        Self {
            router,
            reporter,
            workers: workers.max(1),
        }
    }

    /// Run until the sending side of `events` is dropped and the channel is drained.
    #[instrument(skip_all, fields(workers = self.workers))]
    pub async fn run(self, events: mpsc::Receiver<InboundMessage>) {
        let events = Arc::new(Mutex::new(events));

        let workers = (0..self.workers).map(|worker| {
            let events = events.clone();
            let router = self.router.clone();
            let reporter = self.reporter.clone();

            tokio::spawn(
                async move {
                    loop {
                        // Hold the lock only while waiting for the next message.
                        let next = events.lock().await.recv().await;
                        let Some(message) = next else {
                            break;
                        };

                        handle(&router, &reporter, &message).in_current_span().await;
                    }

                    debug!("Worker {} stopped.", worker);
                }
                .in_current_span(),
            )
        });

        for result in join_all(workers).await {
            if let Err(e) = result {
                error!("Dispatch worker panicked: {}", e);
            }
        }

        info!("Dispatcher stopped.");
    }
}

/// Route one message, logging and reporting any failure.
#[instrument(skip_all)]
async fn handle(router: &MessageRouter, reporter: &Reporter, message: &InboundMessage) {
    match router.route(message).await {
        Ok(routed) => debug!("Routed: {:?}", routed),
        Err(err) => {
            error!("Error while handling: {:#}", err);
            reporter.error(&format!("{err:#}"));
        }
    }
}
