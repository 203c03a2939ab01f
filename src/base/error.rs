//! Error taxonomy for the relay.
//!
//! Most code paths propagate `anyhow` errors; these variants exist for the cases where a caller
//! has to tell failures apart (e.g., the lifecycle recovering from a [`RelayError::Conflict`]).

use thiserror::Error;

/// Failures the relay distinguishes between.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The store could not be reached, migrated or seeded at startup.
    #[error("startup failed: {0}")]
    StartupFatal(String),

    /// An active user already exists for the identity.
    #[error("an active user already exists for identity `{0}`")]
    Conflict(String),

    /// Another user (active or not) already holds the display name.
    #[error("display name `{0}` is already taken")]
    DisplayNameTaken(String),

    /// A store read failed while relaying.
    #[error("store query failed: {0}")]
    StoreQuery(String),

    /// Forwarding to one recipient failed.
    #[error("failed to forward message to `{recipient}`: {reason}")]
    ForwardDelivery {
        /// Identity of the recipient.
        recipient: String,
        /// Transport error text.
        reason: String,
    },

    /// Answering the triggering message failed.
    #[error("failed to reply in chat `{chat_id}`: {reason}")]
    ReplyDelivery {
        /// Chat the reply was meant for.
        chat_id: String,
        /// Transport error text.
        reason: String,
    },
}

impl RelayError {
    /// Returns `true` if the error (anywhere in the chain) is a [`RelayError::Conflict`].
    pub fn is_conflict(err: &anyhow::Error) -> bool {
        err.chain().any(|e| matches!(e.downcast_ref::<RelayError>(), Some(RelayError::Conflict(_))))
    }

    /// Returns `true` if the error (anywhere in the chain) is a [`RelayError::DisplayNameTaken`].
    pub fn is_display_name_taken(err: &anyhow::Error) -> bool {
        err.chain().any(|e| matches!(e.downcast_ref::<RelayError>(), Some(RelayError::DisplayNameTaken(_))))
    }
}
