//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the collaborators used by the relay:
//! - Chat services (e.g., Slack)
//! - Database services (e.g., SurrealDB)
//! - Reporting sinks (e.g., tracing / OpenTelemetry)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod db;
pub mod report;
