//! Core components, types, and utilities for the keyword relay.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Default replies and seeded keywords.
//! - Common types, error taxonomy, and result handling.

pub mod config;
pub mod error;
pub mod replies;
pub mod types;
