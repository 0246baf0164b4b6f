//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared,
//! read-only resources every connection needs.

use crate::config::Config;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Session instructions sent to the realtime agent.
    pub instructions: Arc<String>,
}
