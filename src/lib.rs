//! Library root for `keyword-relay`.
//!
//! Keyword-relay watches shared Slack channels for tagged messages and forwards them
//! privately to subscribers:
//! - Users join (and leave) the relay from a direct message with the bot
//! - A join subscribes the user to every known keyword
//! - A channel message containing a keyword is forwarded once to each active subscriber
//!
//! The bot integrates with Slack for chat, SurrealDB for storage, and `tracing` for
//! reporting. The architecture is built around extensible traits that allow for
//! different implementations of each service.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod prelude;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use service::report::Reporter;
use tracing::{debug, info};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the relay runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with database, chat client, and reporter
/// - Starts the main event loop for processing messages
///
/// Startup failures are reported as crashes before being returned.
pub async fn start(config: Config) -> Void {
    info!("Starting keyword-relay ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        debug!("Crypto provider was already installed.");
    }

    let reporter = Reporter::tracing();

    // Initialize the runtime.
    let runtime = match runtime::Runtime::new(config, reporter.clone()).await {
        Ok(runtime) => runtime,
        Err(err) => {
            reporter.crash(&format!("{err:#}"));
            reporter.flush();
            return Err(err);
        }
    };

    // Start the runtime.
    let result = runtime.start().await;

    reporter.flush();

    result
}
