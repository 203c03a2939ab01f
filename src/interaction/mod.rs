//! Event handling and user interactions for the keyword relay.
//!
//! This module provides the relay core:
//! - Seeding and reading the keyword registry
//! - Joining and leaving (soft-delete and restore)
//! - Matching group messages against keywords and forwarding them to subscribers
//! - Routing inbound messages and dispatching them from the event channel

pub mod dispatch;
pub mod keywords;
pub mod lifecycle;
pub mod relay;
pub mod router;
